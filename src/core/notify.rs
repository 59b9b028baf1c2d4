//! Queued-job notification side channel.
//!
//! The messaging front-end supplies the implementation; the queue fires it
//! best-effort when a job is accepted into the pending sequence. A hook
//! failure must never affect the job itself, so the trait returns nothing —
//! implementations handle and log their own errors.

use async_trait::async_trait;

use crate::util::serde::UserId;

/// Best-effort callback informing a caller that their job was queued.
#[async_trait]
pub trait NotificationHook: Send + Sync + 'static {
    /// Deliver `message` to `user`. Fire-and-forget from the queue's side.
    async fn notify(&self, user: &UserId, message: &str);
}

/// Hook that discards every notification. Useful in tests and for callers
/// that do not want queue-position chatter.
pub struct NoopNotifier;

#[async_trait]
impl NotificationHook for NoopNotifier {
    async fn notify(&self, _user: &UserId, _message: &str) {}
}
