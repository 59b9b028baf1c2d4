//! Configuration models for the queue, ledger, and store backends.

pub mod gate;

pub use gate::{GateConfig, LedgerConfig, QueueConfig, StoreBackendConfig};
