//! # Voxgate
//!
//! Admission control and bounded-concurrency scheduling for speech-synthesis
//! workloads.
//!
//! Synthesis is expensive: a request can hold a model for seconds, and the
//! engine only tolerates a handful of concurrent invocations. Voxgate puts
//! two cooperating pieces in front of it:
//!
//! - **Job queue + slot limiter**: submissions land in a FIFO queue and are
//!   drained into a fixed number of execution slots by a single coordinator
//!   task. Every submission gets a handle that resolves exactly once, with
//!   the audio or with the failure; a failing job releases its slot like any
//!   other.
//! - **Entitlement ledger**: per-user free/purchased allowances with a lazy
//!   weekly reset, a minimum-interval flood gate, idempotent purchase
//!   crediting, and an append-only history log — persisted behind a store
//!   trait (in-memory or SQLite).
//!
//! The synthesis engine itself stays outside the crate, behind
//! [`core::SynthesisAdapter`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voxgate::config::GateConfig;
//! use voxgate::core::{Ledger, VoiceId};
//! use voxgate::infra::MemoryLedgerStore;
//! use voxgate::runtime::{SynthesisGate, TokioSpawner};
//! use voxgate::util::serde::UserId;
//!
//! let config = GateConfig::default();
//! let ledger = Arc::new(Ledger::new(&config.ledger, Arc::new(MemoryLedgerStore::new())));
//! let gate = SynthesisGate::new(&config, ledger, my_engine, TokioSpawner::current());
//!
//! let clip = gate
//!     .request(&UserId::from("42"), "hello world", &VoiceId::from("baya"), None)
//!     .await?;
//! ```
//!
//! For complete flows, see `tests/admission_flow_test.rs` and
//! `tests/queue_concurrency_test.rs`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

/// Core admission and scheduling abstractions.
pub mod core;
/// Configuration models for the queue, ledger, and store backends.
pub mod config;
/// Infrastructure adapters for ledger persistence backends.
pub mod infra;
/// Runtime adapters and the caller-facing gate surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
