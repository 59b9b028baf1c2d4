//! Runtime adapters and the caller-facing gate surface.

pub mod api;
pub mod tokio_spawner;

pub use api::SynthesisGate;
pub use tokio_spawner::TokioSpawner;
