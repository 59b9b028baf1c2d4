//! Per-user entitlement ledger: allowance counters, lazy weekly resets,
//! flood control, and the append-only history log.
//!
//! Every mutating operation is serialized per user through a row lock so
//! concurrent read-modify-write sequences (the weekly reset check, counter
//! increments) never lose an update, while unrelated users proceed without
//! contention. The ledger owns an injected [`LedgerStore`] and never caches
//! rows across calls — the store is the source of truth.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::infra::store::LedgerStore;
use crate::util::serde::UserId;

use super::error::GateError;

/// One user's entitlement state.
///
/// `used <= free_limit + purchased` is advisory: it is enforced by the
/// admission checks before consumption, not transactionally at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLimit {
    /// Owner of this row.
    pub user: UserId,
    /// Jobs consumed against the current free-allowance window.
    pub used: u32,
    /// Cumulative non-expiring purchased allowance.
    pub purchased: u32,
    /// Size of the recurring free allowance.
    pub free_limit: u32,
    /// When the free-portion window last reset.
    pub last_free_reset: Option<DateTime<Utc>>,
    /// Most recent admitted request, for flood control.
    pub last_request: Option<DateTime<Utc>>,
    /// When allowance was last consumed.
    pub last_used: Option<DateTime<Utc>>,
    /// Lifetime consumption counter; never reset.
    pub lifetime_used: u64,
    /// Administrative kill-switch; denies admission regardless of balance.
    pub frozen: bool,
}

impl UserLimit {
    /// Row for a user seen for the first time.
    pub fn fresh(user: UserId, free_limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            user,
            used: 0,
            purchased: 0,
            free_limit,
            last_free_reset: Some(now),
            last_request: None,
            last_used: None,
            lifetime_used: 0,
            frozen: false,
        }
    }

    /// Remaining allowance, floored at zero.
    pub fn left(&self) -> u32 {
        (self.free_limit + self.purchased).saturating_sub(self.used)
    }

    /// Whether `required` more jobs fit in the current allowance.
    pub fn can_admit(&self, required: u32) -> bool {
        !self.frozen && self.used.saturating_add(required) <= self.free_limit + self.purchased
    }
}

/// Kind of ledger event recorded in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    /// Allowance consumed after a confirmed successful job.
    Use,
    /// Purchased allowance credited.
    Purchase,
    /// Admission denied for insufficient balance.
    LimitExceeded,
    /// Account frozen by an operator.
    Freeze,
    /// Account unfrozen by an operator.
    Unfreeze,
}

impl HistoryAction {
    /// Stable storage name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Use => "use",
            Self::Purchase => "purchase",
            Self::LimitExceeded => "limit_exceeded",
            Self::Freeze => "freeze",
            Self::Unfreeze => "unfreeze",
        }
    }

    /// Inverse of [`HistoryAction::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "use" => Some(Self::Use),
            "purchase" => Some(Self::Purchase),
            "limit_exceeded" => Some(Self::LimitExceeded),
            "freeze" => Some(Self::Freeze),
            "unfreeze" => Some(Self::Unfreeze),
            _ => None,
        }
    }
}

/// Append-only audit record; never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// User the event concerns.
    pub user: UserId,
    /// What happened.
    pub action: HistoryAction,
    /// Allowance amount involved (0 for administrative events).
    pub amount: u32,
    /// When it happened.
    pub at: DateTime<Utc>,
    /// Free-form operator or caller note.
    pub comment: Option<String>,
    /// Payment-provider transaction reference; unique when present, which
    /// is what makes purchase confirmation idempotent.
    pub payment_ref: Option<String>,
}

/// Aggregate counters across the whole ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Distinct users with a ledger row.
    pub total_users: u64,
    /// Sum of lifetime consumption over all users.
    pub total_used: u64,
    /// Number of purchase events recorded.
    pub purchase_count: u64,
    /// Sum of purchased allowance over all users.
    pub total_purchased: u64,
}

/// The entitlement ledger service.
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    free_limit: u32,
    flood_interval: Duration,
    reset_window: Duration,
    row_locks: RwLock<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl Ledger {
    /// Create a ledger over the given store.
    pub fn new(config: &LedgerConfig, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            free_limit: config.free_limit,
            flood_interval: Duration::seconds(config.flood_interval_secs as i64),
            reset_window: Duration::days(config.reset_window_days),
            row_locks: RwLock::new(HashMap::new()),
        }
    }

    /// Per-user lock, created on first reference.
    fn row_lock(&self, user: &UserId) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.row_locks.read().get(user) {
            return Arc::clone(lock);
        }
        let mut locks = self.row_locks.write();
        Arc::clone(locks.entry(user.clone()).or_default())
    }

    /// Load a row, creating it lazily and applying the free-window reset.
    /// Caller must hold the user's row lock.
    async fn load_locked(&self, user: &UserId) -> Result<UserLimit, GateError> {
        let now = Utc::now();
        match self.store.fetch(user).await? {
            None => {
                let row = UserLimit::fresh(user.clone(), self.free_limit, now);
                self.store.upsert(&row).await?;
                debug!(user = %user, "ledger row created");
                Ok(row)
            }
            Some(mut row) => {
                match row.last_free_reset {
                    Some(at) if now - at > self.reset_window => {
                        debug!(user = %user, cleared = row.used, "free allowance window reset");
                        row.used = 0;
                        row.last_free_reset = Some(now);
                        self.store.upsert(&row).await?;
                    }
                    None => {
                        // Row predates the reset column: stamp the window
                        // without clearing consumption.
                        row.last_free_reset = Some(now);
                        self.store.upsert(&row).await?;
                    }
                    Some(_) => {}
                }
                Ok(row)
            }
        }
    }

    async fn record(
        &self,
        user: &UserId,
        action: HistoryAction,
        amount: u32,
        comment: Option<String>,
        payment_ref: Option<String>,
    ) -> Result<(), GateError> {
        let record = HistoryRecord {
            event_id: Uuid::new_v4(),
            user: user.clone(),
            action,
            amount,
            at: Utc::now(),
            comment,
            payment_ref,
        };
        self.store.append_history(&record).await
    }

    /// Current state for `user`, applying the lazy weekly reset.
    pub async fn get_limit(&self, user: &UserId) -> Result<UserLimit, GateError> {
        let lock = self.row_lock(user);
        let _guard = lock.lock().await;
        self.load_locked(user).await
    }

    /// Whether `required` more jobs fit in the user's allowance. Always
    /// `false` for frozen accounts.
    pub async fn can_speak(&self, user: &UserId, required: u32) -> Result<bool, GateError> {
        Ok(self.get_limit(user).await?.can_admit(required))
    }

    /// Remaining allowance, floored at zero.
    pub async fn get_left(&self, user: &UserId) -> Result<u32, GateError> {
        Ok(self.get_limit(user).await?.left())
    }

    /// Consume allowance after a confirmed successful job. Never call
    /// speculatively; failed jobs are not charged.
    pub async fn add_used(&self, user: &UserId, amount: u32) -> Result<(), GateError> {
        let lock = self.row_lock(user);
        let _guard = lock.lock().await;
        let mut row = self.load_locked(user).await?;
        row.used = row.used.saturating_add(amount);
        row.lifetime_used = row.lifetime_used.saturating_add(u64::from(amount));
        row.last_used = Some(Utc::now());
        self.store.upsert(&row).await?;
        self.record(user, HistoryAction::Use, amount, None, None)
            .await?;
        debug!(user = %user, amount, used = row.used, "allowance consumed");
        Ok(())
    }

    /// Credit purchased allowance after confirmed payment settlement.
    ///
    /// When `payment_ref` is supplied and a purchase with the same
    /// reference was already applied, the call is a visible no-op and
    /// returns `false`. Returns `true` when the credit was applied.
    pub async fn add_purchased(
        &self,
        user: &UserId,
        amount: u32,
        payment_ref: Option<&str>,
    ) -> Result<bool, GateError> {
        let lock = self.row_lock(user);
        let _guard = lock.lock().await;
        if let Some(reference) = payment_ref {
            if self.store.purchase_applied(reference).await? {
                info!(user = %user, payment_ref = reference, "duplicate purchase confirmation ignored");
                return Ok(false);
            }
        }
        let mut row = self.load_locked(user).await?;
        row.purchased = row.purchased.saturating_add(amount);
        self.store.upsert(&row).await?;
        self.record(
            user,
            HistoryAction::Purchase,
            amount,
            None,
            payment_ref.map(str::to_owned),
        )
        .await?;
        info!(user = %user, amount, purchased = row.purchased, "purchase credited");
        Ok(true)
    }

    /// Administrative kill-switch. Applies fully or fails visibly.
    pub async fn set_frozen(&self, user: &UserId, frozen: bool) -> Result<(), GateError> {
        let lock = self.row_lock(user);
        let _guard = lock.lock().await;
        let mut row = self.load_locked(user).await?;
        row.frozen = frozen;
        self.store.upsert(&row).await?;
        let action = if frozen {
            HistoryAction::Freeze
        } else {
            HistoryAction::Unfreeze
        };
        self.record(user, action, 0, None, None).await?;
        info!(user = %user, frozen, "account freeze state changed");
        Ok(())
    }

    /// Override the recurring free allowance for one user.
    pub async fn set_free_limit(&self, user: &UserId, amount: u32) -> Result<(), GateError> {
        let lock = self.row_lock(user);
        let _guard = lock.lock().await;
        let mut row = self.load_locked(user).await?;
        row.free_limit = amount;
        self.store.upsert(&row).await?;
        info!(user = %user, free_limit = amount, "free limit overridden");
        Ok(())
    }

    /// Whether the flood-control interval has elapsed since the user's
    /// last admitted request.
    pub async fn can_request(&self, user: &UserId) -> Result<bool, GateError> {
        let row = self.get_limit(user).await?;
        Ok(match row.last_request {
            None => true,
            Some(at) => Utc::now() - at >= self.flood_interval,
        })
    }

    /// Whole seconds until the next request is admissible; 0 when the gate
    /// is open. Non-increasing over elapsed wall-clock time.
    pub async fn seconds_to_wait(&self, user: &UserId) -> Result<u64, GateError> {
        let row = self.get_limit(user).await?;
        Ok(match row.last_request {
            None => 0,
            Some(at) => {
                let remaining = self.flood_interval - (Utc::now() - at);
                remaining.num_seconds().max(0) as u64
            }
        })
    }

    /// Stamp the flood gate. Called exactly once per admitted request,
    /// before synthesis starts, so a slow job cannot be exploited to
    /// bypass the interval.
    pub async fn set_last_request(&self, user: &UserId) -> Result<(), GateError> {
        let lock = self.row_lock(user);
        let _guard = lock.lock().await;
        let mut row = self.load_locked(user).await?;
        row.last_request = Some(Utc::now());
        self.store.upsert(&row).await
    }

    /// Record a balance denial in the history log. Advisory; the caller
    /// decides whether a failure here matters.
    pub async fn record_limit_exceeded(
        &self,
        user: &UserId,
        required: u32,
    ) -> Result<(), GateError> {
        self.record(user, HistoryAction::LimitExceeded, required, None, None)
            .await
    }

    /// Most recent history records for one user, newest first.
    pub async fn history(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, GateError> {
        self.store.history(user, limit).await
    }

    /// Aggregate counters across the whole ledger.
    pub async fn stats(&self) -> Result<LedgerStats, GateError> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::store::memory::MemoryLedgerStore;

    fn ledger(free_limit: u32) -> Ledger {
        let config = LedgerConfig {
            free_limit,
            flood_interval_secs: 5,
            reset_window_days: 7,
        };
        Ledger::new(&config, Arc::new(MemoryLedgerStore::new()))
    }

    #[tokio::test]
    async fn fresh_user_gets_the_free_allowance() {
        let ledger = ledger(30);
        let user = UserId::from("alice");
        assert_eq!(ledger.get_left(&user).await.unwrap(), 30);
        assert!(ledger.can_speak(&user, 1).await.unwrap());
        let row = ledger.get_limit(&user).await.unwrap();
        assert_eq!(row.used, 0);
        assert_eq!(row.purchased, 0);
        assert!(row.last_free_reset.is_some());
    }

    #[tokio::test]
    async fn exhausted_allowance_denies_until_purchase() {
        let ledger = ledger(30);
        let user = UserId::from("bob");
        ledger.add_used(&user, 30).await.unwrap();

        assert!(!ledger.can_speak(&user, 1).await.unwrap());
        assert_eq!(ledger.get_left(&user).await.unwrap(), 0);

        assert!(ledger.add_purchased(&user, 10, None).await.unwrap());
        assert_eq!(ledger.get_left(&user).await.unwrap(), 10);
        assert!(ledger.can_speak(&user, 1).await.unwrap());
        // The purchase must not touch consumption.
        assert_eq!(ledger.get_limit(&user).await.unwrap().used, 30);
    }

    #[tokio::test]
    async fn frozen_account_is_denied_regardless_of_balance() {
        let ledger = ledger(30);
        let user = UserId::from("mallory");
        ledger.set_frozen(&user, true).await.unwrap();
        assert!(!ledger.can_speak(&user, 1).await.unwrap());
        ledger.set_frozen(&user, false).await.unwrap();
        assert!(ledger.can_speak(&user, 1).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_consumption_loses_no_updates() {
        let ledger = Arc::new(ledger(100));
        let user = UserId::from("carol");
        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let user = user.clone();
                tokio::spawn(async move { ledger.add_used(&user, 1).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let row = ledger.get_limit(&user).await.unwrap();
        assert_eq!(row.used, 20);
        assert_eq!(row.lifetime_used, 20);
    }

    #[tokio::test]
    async fn duplicate_payment_reference_credits_once() {
        let ledger = ledger(30);
        let user = UserId::from("dave");
        assert!(ledger
            .add_purchased(&user, 10, Some("txn-001"))
            .await
            .unwrap());
        assert!(!ledger
            .add_purchased(&user, 10, Some("txn-001"))
            .await
            .unwrap());
        assert_eq!(ledger.get_limit(&user).await.unwrap().purchased, 10);
    }

    #[tokio::test]
    async fn stale_reset_window_clears_used_but_not_purchased() {
        let store = Arc::new(MemoryLedgerStore::new());
        let config = LedgerConfig {
            free_limit: 30,
            flood_interval_secs: 5,
            reset_window_days: 7,
        };
        let ledger = Ledger::new(&config, store.clone() as Arc<dyn LedgerStore>);
        let user = UserId::from("erin");

        let mut row = UserLimit::fresh(user.clone(), 30, Utc::now() - Duration::days(8));
        row.used = 12;
        row.purchased = 5;
        store.upsert(&row).await.unwrap();

        let reloaded = ledger.get_limit(&user).await.unwrap();
        assert_eq!(reloaded.used, 0);
        assert_eq!(reloaded.purchased, 5);
        let reset_at = reloaded.last_free_reset.unwrap();
        assert!(Utc::now() - reset_at < Duration::minutes(1));
    }

    #[tokio::test]
    async fn free_limit_override_applies_to_one_user() {
        let ledger = ledger(30);
        let vip = UserId::from("vip");
        let other = UserId::from("other");
        ledger.set_free_limit(&vip, 100).await.unwrap();
        assert_eq!(ledger.get_left(&vip).await.unwrap(), 100);
        assert_eq!(ledger.get_left(&other).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn flood_gate_closes_on_stamp_and_reports_wait() {
        let ledger = ledger(30);
        let user = UserId::from("frank");

        assert!(ledger.can_request(&user).await.unwrap());
        assert_eq!(ledger.seconds_to_wait(&user).await.unwrap(), 0);

        ledger.set_last_request(&user).await.unwrap();
        assert!(!ledger.can_request(&user).await.unwrap());
        let wait = ledger.seconds_to_wait(&user).await.unwrap();
        assert!(wait <= 5, "wait {wait} exceeds the interval");
    }

    #[tokio::test]
    async fn history_records_uses_and_purchases() {
        let ledger = ledger(30);
        let user = UserId::from("grace");
        ledger.add_used(&user, 1).await.unwrap();
        ledger
            .add_purchased(&user, 20, Some("txn-9"))
            .await
            .unwrap();
        ledger.record_limit_exceeded(&user, 1).await.unwrap();

        let history = ledger.history(&user, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        let actions: Vec<_> = history.iter().map(|r| r.action).collect();
        assert!(actions.contains(&HistoryAction::Use));
        assert!(actions.contains(&HistoryAction::Purchase));
        assert!(actions.contains(&HistoryAction::LimitExceeded));

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.total_used, 1);
        assert_eq!(stats.purchase_count, 1);
        assert_eq!(stats.total_purchased, 20);
    }
}
