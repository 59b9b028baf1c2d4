//! SQLite-backed ledger store.
//!
//! A single database file holds the `user_limits` table and the append-only
//! `ledger_history` table, which is what makes ledger state survive process
//! restart. Every mutation is one statement, so each user-row write is
//! atomic; the partial unique index on `payment_ref` is the durable backstop
//! for idempotent purchase confirmation.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::core::error::GateError;
use crate::core::ledger::{HistoryAction, HistoryRecord, LedgerStats, UserLimit};
use crate::util::serde::UserId;

use super::LedgerStore;

/// Ledger store over a SQLite connection pool.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Open (creating if missing) a database file and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, GateError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.as_ref().display(), "sqlite ledger store opened");
        Ok(store)
    }

    /// Open an in-memory database, for tests and throwaway runs.
    ///
    /// Pinned to a single pooled connection that is never recycled: every
    /// fresh `:memory:` connection would otherwise be a distinct empty
    /// database.
    pub async fn in_memory() -> Result<Self, GateError> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Schema statements, applied in order and individually idempotent.
    pub fn migrations() -> &'static [&'static str] {
        &[
            r#"
CREATE TABLE IF NOT EXISTS user_limits (
    user_id TEXT PRIMARY KEY,
    used INTEGER NOT NULL DEFAULT 0,
    purchased INTEGER NOT NULL DEFAULT 0,
    free_limit INTEGER NOT NULL DEFAULT 0,
    last_free_reset TEXT,
    last_request TEXT,
    last_used TEXT,
    lifetime_used INTEGER NOT NULL DEFAULT 0,
    frozen INTEGER NOT NULL DEFAULT 0
)
"#,
            r#"
CREATE TABLE IF NOT EXISTS ledger_history (
    event_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    amount INTEGER NOT NULL,
    at TEXT NOT NULL,
    comment TEXT,
    payment_ref TEXT
)
"#,
            r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_history_payment_ref
    ON ledger_history (payment_ref) WHERE payment_ref IS NOT NULL
"#,
            r#"
CREATE INDEX IF NOT EXISTS idx_ledger_history_user_at
    ON ledger_history (user_id, at)
"#,
        ]
    }

    async fn init_schema(&self) -> Result<(), GateError> {
        for statement in Self::migrations() {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn column_u32(row: &SqliteRow, name: &str) -> Result<u32, GateError> {
    let value: i64 = row.try_get(name)?;
    u32::try_from(value)
        .map_err(|_| GateError::Persistence(format!("column {name} out of range: {value}")))
}

fn column_u64(row: &SqliteRow, name: &str) -> Result<u64, GateError> {
    let value: i64 = row.try_get(name)?;
    u64::try_from(value)
        .map_err(|_| GateError::Persistence(format!("column {name} out of range: {value}")))
}

fn decode_limit(user: UserId, row: &SqliteRow) -> Result<UserLimit, GateError> {
    Ok(UserLimit {
        user,
        used: column_u32(row, "used")?,
        purchased: column_u32(row, "purchased")?,
        free_limit: column_u32(row, "free_limit")?,
        last_free_reset: row.try_get::<Option<DateTime<Utc>>, _>("last_free_reset")?,
        last_request: row.try_get::<Option<DateTime<Utc>>, _>("last_request")?,
        last_used: row.try_get::<Option<DateTime<Utc>>, _>("last_used")?,
        lifetime_used: column_u64(row, "lifetime_used")?,
        frozen: row.try_get("frozen")?,
    })
}

fn decode_history(row: &SqliteRow) -> Result<HistoryRecord, GateError> {
    let event_id: String = row.try_get("event_id")?;
    let event_id = Uuid::parse_str(&event_id)
        .map_err(|e| GateError::Persistence(format!("bad event_id {event_id}: {e}")))?;
    let action: String = row.try_get("action")?;
    let action = HistoryAction::parse(&action)
        .ok_or_else(|| GateError::Persistence(format!("unknown history action: {action}")))?;
    Ok(HistoryRecord {
        event_id,
        user: UserId::from(row.try_get::<String, _>("user_id")?),
        action,
        amount: column_u32(row, "amount")?,
        at: row.try_get("at")?,
        comment: row.try_get("comment")?,
        payment_ref: row.try_get("payment_ref")?,
    })
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn fetch(&self, user: &UserId) -> Result<Option<UserLimit>, GateError> {
        let row = sqlx::query(
            "SELECT used, purchased, free_limit, last_free_reset, last_request, \
                    last_used, lifetime_used, frozen \
             FROM user_limits WHERE user_id = ?",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode_limit(user.clone(), &r)).transpose()
    }

    async fn upsert(&self, row: &UserLimit) -> Result<(), GateError> {
        let lifetime_used = i64::try_from(row.lifetime_used).map_err(|_| {
            GateError::Persistence(format!("lifetime_used out of range: {}", row.lifetime_used))
        })?;
        sqlx::query(
            "INSERT INTO user_limits \
                (user_id, used, purchased, free_limit, last_free_reset, \
                 last_request, last_used, lifetime_used, frozen) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
                used = excluded.used, \
                purchased = excluded.purchased, \
                free_limit = excluded.free_limit, \
                last_free_reset = excluded.last_free_reset, \
                last_request = excluded.last_request, \
                last_used = excluded.last_used, \
                lifetime_used = excluded.lifetime_used, \
                frozen = excluded.frozen",
        )
        .bind(row.user.as_str())
        .bind(i64::from(row.used))
        .bind(i64::from(row.purchased))
        .bind(i64::from(row.free_limit))
        .bind(row.last_free_reset)
        .bind(row.last_request)
        .bind(row.last_used)
        .bind(lifetime_used)
        .bind(row.frozen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_history(&self, record: &HistoryRecord) -> Result<(), GateError> {
        sqlx::query(
            "INSERT INTO ledger_history \
                (event_id, user_id, action, amount, at, comment, payment_ref) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.event_id.to_string())
        .bind(record.user.as_str())
        .bind(record.action.as_str())
        .bind(i64::from(record.amount))
        .bind(record.at)
        .bind(record.comment.as_deref())
        .bind(record.payment_ref.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purchase_applied(&self, payment_ref: &str) -> Result<bool, GateError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_history WHERE payment_ref = ?")
                .bind(payment_ref)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn history(&self, user: &UserId, limit: usize) -> Result<Vec<HistoryRecord>, GateError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT event_id, user_id, action, amount, at, comment, payment_ref \
             FROM ledger_history WHERE user_id = ? \
             ORDER BY at DESC LIMIT ?",
        )
        .bind(user.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_history).collect()
    }

    async fn stats(&self) -> Result<LedgerStats, GateError> {
        let row = sqlx::query(
            "SELECT \
                (SELECT COUNT(*) FROM user_limits) AS total_users, \
                (SELECT COALESCE(SUM(lifetime_used), 0) FROM user_limits) AS total_used, \
                (SELECT COUNT(*) FROM ledger_history WHERE action = 'purchase') AS purchase_count, \
                (SELECT COALESCE(SUM(purchased), 0) FROM user_limits) AS total_purchased",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(LedgerStats {
            total_users: column_u64(&row, "total_users")?,
            total_used: column_u64(&row, "total_used")?,
            purchase_count: column_u64(&row, "purchase_count")?,
            total_purchased: column_u64(&row, "total_purchased")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_row(user: &str) -> UserLimit {
        UserLimit {
            user: UserId::from(user),
            used: 12,
            purchased: 40,
            free_limit: 30,
            last_free_reset: Some(Utc::now() - Duration::days(2)),
            last_request: Some(Utc::now() - Duration::seconds(30)),
            last_used: None,
            lifetime_used: 112,
            frozen: false,
        }
    }

    fn sample_record(user: &str, payment_ref: Option<&str>) -> HistoryRecord {
        HistoryRecord {
            event_id: Uuid::new_v4(),
            user: UserId::from(user),
            action: HistoryAction::Purchase,
            amount: 10,
            at: Utc::now(),
            comment: Some("pack of 10".to_owned()),
            payment_ref: payment_ref.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn row_roundtrip() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        let row = sample_row("u1");
        store.upsert(&row).await.unwrap();

        let loaded = store.fetch(&UserId::from("u1")).await.unwrap().unwrap();
        assert_eq!(loaded.used, 12);
        assert_eq!(loaded.purchased, 40);
        assert_eq!(loaded.free_limit, 30);
        assert_eq!(loaded.lifetime_used, 112);
        assert!(!loaded.frozen);
        assert!(loaded.last_free_reset.is_some());
        assert!(loaded.last_request.is_some());
        assert!(loaded.last_used.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        let mut row = sample_row("u1");
        store.upsert(&row).await.unwrap();
        row.used = 13;
        row.frozen = true;
        store.upsert(&row).await.unwrap();

        let loaded = store.fetch(&UserId::from("u1")).await.unwrap().unwrap();
        assert_eq!(loaded.used, 13);
        assert!(loaded.frozen);
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        assert!(store.fetch(&UserId::from("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn payment_ref_uniqueness_is_enforced() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store
            .append_history(&sample_record("u1", Some("txn-1")))
            .await
            .unwrap();
        assert!(store.purchase_applied("txn-1").await.unwrap());
        assert!(!store.purchase_applied("txn-2").await.unwrap());
        assert!(store
            .append_history(&sample_record("u1", Some("txn-1")))
            .await
            .is_err());
        // NULL refs never collide with each other.
        store.append_history(&sample_record("u1", None)).await.unwrap();
        store.append_history(&sample_record("u1", None)).await.unwrap();
    }

    #[tokio::test]
    async fn history_and_stats_aggregate() {
        let store = SqliteLedgerStore::in_memory().await.unwrap();
        store.upsert(&sample_row("u1")).await.unwrap();
        store.upsert(&sample_row("u2")).await.unwrap();
        store
            .append_history(&sample_record("u1", Some("a")))
            .await
            .unwrap();
        store
            .append_history(&sample_record("u1", Some("b")))
            .await
            .unwrap();

        let history = store.history(&UserId::from("u1"), 1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Purchase);
        assert_eq!(history[0].comment.as_deref(), Some("pack of 10"));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.total_used, 224);
        assert_eq!(stats.purchase_count, 2);
        assert_eq!(stats.total_purchased, 80);
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let store = SqliteLedgerStore::open(&path).await.unwrap();
            store.upsert(&sample_row("u1")).await.unwrap();
            store
                .append_history(&sample_record("u1", Some("txn-1")))
                .await
                .unwrap();
        }
        let store = SqliteLedgerStore::open(&path).await.unwrap();
        let loaded = store.fetch(&UserId::from("u1")).await.unwrap().unwrap();
        assert_eq!(loaded.lifetime_used, 112);
        assert!(store.purchase_applied("txn-1").await.unwrap());
    }
}
