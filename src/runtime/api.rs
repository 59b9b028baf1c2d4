//! Caller-facing admission surface.
//!
//! `SynthesisGate` composes the ledger and the queue into the full request
//! flow: length precheck, flood gate, balance gate, flood stamp, submit,
//! await, charge-on-success. The ledger and queue stay independently usable;
//! the gate is only the glue a front-end would otherwise write itself.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::core::{
    AudioClip, GateError, Ledger, NotificationHook, QueueStats, Spawn, SynthesisAdapter,
    SynthesisQueue, VoiceId,
};
use crate::util::serde::UserId;

/// Admission gate in front of the synthesis queue.
pub struct SynthesisGate<A, S>
where
    A: SynthesisAdapter,
    S: Spawn + Clone + Send + Sync + 'static,
{
    ledger: Arc<Ledger>,
    queue: SynthesisQueue<AudioClip, S>,
    adapter: Arc<A>,
    max_text_len: usize,
}

impl<A, S> SynthesisGate<A, S>
where
    A: SynthesisAdapter,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Build a gate over an existing ledger and adapter; starts the queue's
    /// drain coordinator on `spawner`.
    pub fn new(config: &GateConfig, ledger: Arc<Ledger>, adapter: Arc<A>, spawner: S) -> Self {
        Self {
            ledger,
            queue: SynthesisQueue::new(&config.queue, spawner),
            adapter,
            max_text_len: config.max_text_len,
        }
    }

    /// Run one synthesis request end to end.
    ///
    /// Checks are ordered so the cheapest rejection wins: text length, then
    /// the flood gate, then the balance gate. The flood stamp lands on
    /// admission — before the job runs — so neither a slow job nor a failed
    /// one reopens the gate early. Allowance is consumed only after the
    /// queue confirms success.
    pub async fn request(
        &self,
        user: &UserId,
        text: &str,
        voice: &VoiceId,
        notify: Option<Arc<dyn NotificationHook>>,
    ) -> Result<AudioClip, GateError> {
        let len = text.chars().count();
        if len > self.max_text_len {
            return Err(GateError::TextTooLong {
                len,
                max: self.max_text_len,
            });
        }

        if !self.ledger.can_request(user).await? {
            let wait_secs = self.ledger.seconds_to_wait(user).await?;
            debug!(user = %user, wait_secs, "request rate limited");
            return Err(GateError::RateLimited { wait_secs });
        }

        let limit = self.ledger.get_limit(user).await?;
        if !limit.can_admit(1) {
            if let Err(e) = self.ledger.record_limit_exceeded(user, 1).await {
                warn!(user = %user, error = %e, "failed to record limit denial");
            }
            info!(user = %user, left = limit.left(), frozen = limit.frozen, "admission denied");
            return Err(GateError::AdmissionDenied {
                left: limit.left(),
                frozen: limit.frozen,
            });
        }

        self.ledger.set_last_request(user).await?;

        let adapter = Arc::clone(&self.adapter);
        let text = text.to_owned();
        let voice = voice.clone();
        let handle = self.queue.submit(
            user.clone(),
            async move { adapter.synthesize(&text, &voice).await },
            notify,
        )?;
        let clip = handle.outcome().await?;

        self.ledger.add_used(user, 1).await?;
        Ok(clip)
    }

    /// The ledger behind this gate, for balance queries and administration.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Snapshot of the underlying queue.
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Shut the queue down; see [`SynthesisQueue::close`].
    pub fn close(&self) {
        self.queue.close();
    }
}
