//! Ledger persistence boundary.
//!
//! The ledger service is storage-agnostic; backends implement this trait.
//! Reads and writes are transactionally scoped per user-row mutation, and
//! the history table is append-only with a uniqueness guarantee on
//! `payment_ref` — the backstop behind idempotent purchase confirmation.

use async_trait::async_trait;

use crate::core::error::GateError;
use crate::core::ledger::{HistoryRecord, LedgerStats, UserLimit};
use crate::util::serde::UserId;

pub mod memory;
pub mod sqlite;

/// Storage backend for ledger rows and the history log.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch one user's row, if it exists.
    async fn fetch(&self, user: &UserId) -> Result<Option<UserLimit>, GateError>;

    /// Insert or replace one user's row, atomically per row.
    async fn upsert(&self, row: &UserLimit) -> Result<(), GateError>;

    /// Append a history record. Fails if `payment_ref` is present and a
    /// record with the same reference already exists.
    async fn append_history(&self, record: &HistoryRecord) -> Result<(), GateError>;

    /// Whether a purchase with this payment reference was already applied.
    async fn purchase_applied(&self, payment_ref: &str) -> Result<bool, GateError>;

    /// Most recent history records for one user, newest first.
    async fn history(&self, user: &UserId, limit: usize) -> Result<Vec<HistoryRecord>, GateError>;

    /// Aggregate counters across the whole store.
    async fn stats(&self) -> Result<LedgerStats, GateError>;
}
