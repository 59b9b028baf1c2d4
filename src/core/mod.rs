//! Core admission and scheduling abstractions.

pub mod error;
pub mod ledger;
pub mod notify;
pub mod queue;
pub mod slots;
pub mod synth;

pub use error::{AppResult, GateError, SynthesisError};
pub use ledger::{HistoryAction, HistoryRecord, Ledger, LedgerStats, UserLimit};
pub use notify::{NoopNotifier, NotificationHook};
pub use queue::{JobHandle, QueueStats, Spawn, SynthesisQueue};
pub use slots::{SlotLimiter, SlotPermit};
pub use synth::{AudioClip, AudioFormat, SynthesisAdapter, VoiceId, CANONICAL_SAMPLE_RATE};
