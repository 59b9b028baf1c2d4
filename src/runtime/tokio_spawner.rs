//! Tokio runtime spawner implementation.

use std::future::Future;

use crate::core::Spawn;

/// Tokio-based spawner that executes queue tasks on a tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Create a spawner from an explicit tokio runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Create a spawner bound to the ambient runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, like
    /// `tokio::runtime::Handle::current` does.
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
