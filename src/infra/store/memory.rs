//! In-memory ledger store for development and testing.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::GateError;
use crate::core::ledger::{HistoryAction, HistoryRecord, LedgerStats, UserLimit};
use crate::util::serde::UserId;

use super::LedgerStore;

#[derive(Default)]
struct MemoryState {
    rows: HashMap<UserId, UserLimit>,
    history: Vec<HistoryRecord>,
    payment_refs: HashSet<String>,
}

/// HashMap-backed store. State dies with the process; use
/// [`super::sqlite::SqliteLedgerStore`] when durability matters.
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn fetch(&self, user: &UserId) -> Result<Option<UserLimit>, GateError> {
        Ok(self.state.lock().rows.get(user).cloned())
    }

    async fn upsert(&self, row: &UserLimit) -> Result<(), GateError> {
        self.state.lock().rows.insert(row.user.clone(), row.clone());
        Ok(())
    }

    async fn append_history(&self, record: &HistoryRecord) -> Result<(), GateError> {
        let mut state = self.state.lock();
        if let Some(reference) = &record.payment_ref {
            if !state.payment_refs.insert(reference.clone()) {
                return Err(GateError::Persistence(format!(
                    "duplicate payment_ref: {reference}"
                )));
            }
        }
        state.history.push(record.clone());
        Ok(())
    }

    async fn purchase_applied(&self, payment_ref: &str) -> Result<bool, GateError> {
        Ok(self.state.lock().payment_refs.contains(payment_ref))
    }

    async fn history(&self, user: &UserId, limit: usize) -> Result<Vec<HistoryRecord>, GateError> {
        let state = self.state.lock();
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|r| &r.user == user)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<LedgerStats, GateError> {
        let state = self.state.lock();
        Ok(LedgerStats {
            total_users: state.rows.len() as u64,
            total_used: state.rows.values().map(|r| r.lifetime_used).sum(),
            purchase_count: state
                .history
                .iter()
                .filter(|r| r.action == HistoryAction::Purchase)
                .count() as u64,
            total_purchased: state.rows.values().map(|r| u64::from(r.purchased)).sum(),
        })
    }
}
