//! FIFO admission queue with bounded-concurrency drain.
//!
//! Submission pairs every job with a single-resolution result handle and
//! appends it to a pending deque. A single drain-coordinator task consumes
//! wake signals — one per submission, one per job completion — and promotes
//! head entries into free execution slots. Because the coordinator is the
//! only promoter, start order is strictly FIFO; because permits travel with
//! the spawned job and are dropped on any exit path, a failing job can
//! never leak a slot.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::util::clock::now_ms;
use crate::util::serde::{JobId, UserId};

use super::error::{GateError, SynthesisError};
use super::notify::NotificationHook;
use super::slots::{SlotLimiter, SlotPermit};

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Boxed job body: the work a queue entry performs once promoted.
type JobFuture<R> = Pin<Box<dyn Future<Output = Result<R, SynthesisError>> + Send + 'static>>;

/// A queued unit of work, owned by the pending deque until promotion.
struct QueueEntry<R> {
    id: JobId,
    user: UserId,
    job: JobFuture<R>,
    tx: oneshot::Sender<Result<R, GateError>>,
    submitted_at_ms: u128,
}

/// Awaitable handle to a submitted job's eventual outcome.
///
/// Resolved exactly once: with the job's result, with the failure the job
/// raised, or with [`GateError::QueueClosed`] / [`GateError::JobAbandoned`]
/// when the queue shut down or the job task died without reporting.
pub struct JobHandle<R> {
    id: JobId,
    rx: oneshot::Receiver<Result<R, GateError>>,
}

impl<R> JobHandle<R> {
    /// Queue-assigned identifier of the job this handle tracks.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Suspend until the job is resolved and return its outcome.
    pub async fn outcome(self) -> Result<R, GateError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(GateError::JobAbandoned),
        }
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    submitted: AtomicU64,
    queued: AtomicU64,
    running: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of queue utilization.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    /// Configured slot capacity.
    pub capacity: usize,
    /// Slots currently free.
    pub available_slots: usize,
    /// Total jobs accepted since startup.
    pub submitted: u64,
    /// Jobs waiting in the pending deque.
    pub queued: u64,
    /// Jobs currently executing.
    pub running: u64,
    /// Jobs resolved successfully.
    pub completed: u64,
    /// Jobs resolved with a failure (including shutdown drops).
    pub failed: u64,
}

struct Pending<R> {
    entries: VecDeque<QueueEntry<R>>,
    closed: bool,
}

struct Inner<R> {
    pending: Mutex<Pending<R>>,
    slots: SlotLimiter,
    wake_tx: mpsc::UnboundedSender<()>,
    counters: QueueCounters,
    next_id: AtomicU64,
}

/// FIFO job queue draining into a bounded set of execution slots.
pub struct SynthesisQueue<R, S>
where
    R: Send + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<R>>,
    spawner: S,
}

impl<R, S> Clone for SynthesisQueue<R, S>
where
    R: Send + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            spawner: self.spawner.clone(),
        }
    }
}

impl<R, S> SynthesisQueue<R, S>
where
    R: Send + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a queue and start its drain coordinator on `spawner`.
    pub fn new(config: &QueueConfig, spawner: S) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            pending: Mutex::new(Pending {
                entries: VecDeque::new(),
                closed: false,
            }),
            slots: SlotLimiter::new(config.max_concurrent),
            wake_tx,
            counters: QueueCounters::default(),
            next_id: AtomicU64::new(0),
        });
        spawner.spawn(drain_loop(Arc::clone(&inner), spawner.clone(), wake_rx));
        info!(capacity = config.max_concurrent, "synthesis queue started");
        Self { inner, spawner }
    }

    /// Append a job to the tail of the pending sequence.
    ///
    /// Returns immediately with a handle the caller can await; the
    /// submitter is never blocked on execution. When a `notify` hook is
    /// supplied it is fired after the queue lock is released, best-effort.
    pub fn submit<F>(
        &self,
        user: UserId,
        job: F,
        notify: Option<Arc<dyn NotificationHook>>,
    ) -> Result<JobHandle<R>, GateError>
    where
        F: Future<Output = Result<R, SynthesisError>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let entry = QueueEntry {
            id,
            user: user.clone(),
            job: Box::pin(job),
            tx,
            submitted_at_ms: now_ms(),
        };

        let position = {
            let mut pending = self.inner.pending.lock();
            if pending.closed {
                return Err(GateError::QueueClosed);
            }
            pending.entries.push_back(entry);
            // Counted under the lock so the gauge can never go negative:
            // the coordinator pops (and later decrements) under this same
            // lock, strictly after the increment.
            self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
            self.inner.counters.queued.fetch_add(1, Ordering::Relaxed);
            pending.entries.len()
        };
        debug!(job = id, user = %user, position, "job queued");

        // A send failure means the coordinator exited, which only happens
        // after close(); the closed flag above already handles that race.
        let _ = self.inner.wake_tx.send(());

        if let Some(hook) = notify {
            let message = format!("Queued at position {position}; please wait.");
            self.spawner.spawn(async move {
                hook.notify(&user, &message).await;
                debug!(job = id, "queued notification delivered");
            });
        }

        Ok(JobHandle { id, rx })
    }

    /// Snapshot current queue statistics.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.inner.slots.capacity(),
            available_slots: self.inner.slots.available(),
            submitted: self.inner.counters.submitted.load(Ordering::Relaxed),
            queued: self.inner.counters.queued.load(Ordering::Relaxed),
            running: self.inner.counters.running.load(Ordering::Relaxed),
            completed: self.inner.counters.completed.load(Ordering::Relaxed),
            failed: self.inner.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Shut the queue down.
    ///
    /// Pending entries are resolved with [`GateError::QueueClosed`] (never
    /// leaked), subsequent submits fail fast, and the drain coordinator
    /// exits. Jobs already running finish normally.
    pub fn close(&self) {
        let drained: Vec<QueueEntry<R>> = {
            let mut pending = self.inner.pending.lock();
            if pending.closed {
                return;
            }
            pending.closed = true;
            pending.entries.drain(..).collect()
        };
        let dropped = drained.len();
        for entry in drained {
            self.inner.counters.queued.fetch_sub(1, Ordering::Relaxed);
            self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            let _ = entry.tx.send(Err(GateError::QueueClosed));
        }
        // Wake the coordinator so it observes the flag and exits.
        let _ = self.inner.wake_tx.send(());
        info!(dropped, "synthesis queue closed");
    }
}

/// Drain coordinator: the single consumer of wake signals and the only
/// place entries are promoted, which is what makes start order FIFO.
async fn drain_loop<R, S>(
    inner: Arc<Inner<R>>,
    spawner: S,
    mut wake_rx: mpsc::UnboundedReceiver<()>,
) where
    R: Send + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    while wake_rx.recv().await.is_some() {
        if drain_once(&inner, &spawner) {
            break;
        }
    }
    debug!("drain coordinator stopped");
}

/// Promote head entries while both a slot and an entry are available.
/// Returns `true` once the queue is closed.
fn drain_once<R, S>(inner: &Arc<Inner<R>>, spawner: &S) -> bool
where
    R: Send + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    loop {
        let Some(permit) = inner.slots.try_acquire() else {
            return inner.pending.lock().closed;
        };
        let entry = {
            let mut pending = inner.pending.lock();
            if pending.closed {
                return true;
            }
            pending.entries.pop_front()
        };
        let Some(entry) = entry else {
            drop(permit);
            return false;
        };
        promote(inner, spawner, entry, permit);
    }
}

fn promote<R, S>(inner: &Arc<Inner<R>>, spawner: &S, entry: QueueEntry<R>, permit: SlotPermit)
where
    R: Send + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    inner.counters.queued.fetch_sub(1, Ordering::Relaxed);
    inner.counters.running.fetch_add(1, Ordering::Relaxed);

    let QueueEntry {
        id,
        user,
        job,
        tx,
        submitted_at_ms,
    } = entry;
    let waited_ms = now_ms().saturating_sub(submitted_at_ms) as u64;
    debug!(job = id, user = %user, waited_ms, "job promoted to running");

    let inner = Arc::clone(inner);
    spawner.spawn(async move {
        let result = job.await;
        inner.counters.running.fetch_sub(1, Ordering::Relaxed);
        match &result {
            Ok(_) => {
                inner.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(job = id, "job completed");
            }
            Err(e) => {
                inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(job = id, user = %user, error = %e, "synthesis job failed");
            }
        }
        if tx.send(result.map_err(GateError::from)).is_err() {
            debug!(job = id, "result receiver dropped before resolution");
        }
        // Free the slot before waking the coordinator so the wake can
        // actually promote the next entry.
        drop(permit);
        let _ = inner.wake_tx.send(());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Clone)]
    struct TestSpawner;

    impl Spawn for TestSpawner {
        fn spawn<F>(&self, fut: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            tokio::spawn(fut);
        }
    }

    fn queue(capacity: usize) -> SynthesisQueue<u32, TestSpawner> {
        SynthesisQueue::new(
            &QueueConfig {
                max_concurrent: capacity,
            },
            TestSpawner,
        )
    }

    #[tokio::test]
    async fn submit_resolves_with_job_result() {
        let q = queue(2);
        let handle = q
            .submit(UserId::from("u1"), async { Ok(7u32) }, None)
            .unwrap();
        assert_eq!(handle.outcome().await.unwrap(), 7);

        let stats = q.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn failure_is_delivered_through_the_handle() {
        let q = queue(1);
        let handle = q
            .submit(
                UserId::from("u1"),
                async { Err::<u32, _>(SynthesisError::Timeout) },
                None,
            )
            .unwrap();
        match handle.outcome().await {
            Err(GateError::Synthesis(SynthesisError::Timeout)) => {}
            other => panic!("expected synthesis timeout, got {other:?}"),
        }
        // The failure must not wedge the queue.
        let next = q
            .submit(UserId::from("u2"), async { Ok(1u32) }, None)
            .unwrap();
        assert_eq!(next.outcome().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn close_fails_pending_and_rejects_new_submits() {
        let q = queue(1);
        // Occupy the only slot so the next submits stay pending.
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let blocker = q
            .submit(
                UserId::from("u1"),
                async move {
                    let _ = release_rx.await;
                    Ok(0u32)
                },
                None,
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let stuck = q
            .submit(UserId::from("u2"), async { Ok(1u32) }, None)
            .unwrap();
        q.close();

        match stuck.outcome().await {
            Err(GateError::QueueClosed) => {}
            other => panic!("expected QueueClosed, got {other:?}"),
        }
        assert!(matches!(
            q.submit(UserId::from("u3"), async { Ok(2u32) }, None),
            Err(GateError::QueueClosed)
        ));

        // The already-running job still finishes normally.
        let _ = release_tx.send(());
        assert_eq!(blocker.outcome().await.unwrap(), 0);
    }
}
