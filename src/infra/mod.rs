//! Infrastructure adapters for ledger persistence backends.

pub mod store;

pub use store::memory::MemoryLedgerStore;
pub use store::sqlite::SqliteLedgerStore;
pub use store::LedgerStore;
