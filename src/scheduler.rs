//! Deferred action scheduler
//!
//! A single timer task owns a min-heap of actions keyed by fire time. Due
//! actions are handed to worker tasks (bounded by a semaphore) so a slow
//! callback never delays the timers behind it. Actions live in memory only;
//! after a restart they are rebuilt with [`Scheduler::recover`].

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::{ERROR_TARGET, Error, SCHEDULER_TARGET};

/// Future returned by a deferred callback.
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<(), Error>> + Send>>;

type Job = Box<dyn FnOnce() -> ActionFuture + Send>;

/// Errors returned by the scheduler handle
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The timer loop has shut down
    #[error("Scheduler is not running")]
    Stopped,
}

/// Something whose pending deferred actions can be re-derived from durable state.
#[async_trait::async_trait]
pub trait Recoverable: Clone + Send + Sync + 'static {
    /// Arguments handed to [`Recoverable::fire`]
    type Args: fmt::Debug + Send + 'static;

    /// Every action that should be armed, with its fire time.
    async fn pending_actions(&self) -> Result<Vec<(DateTime<Utc>, Self::Args)>, Error>;

    /// Run one action.
    async fn fire(self, args: Self::Args) -> Result<(), Error>;
}

struct DeferredAction {
    fire_at: Instant,
    seq: u64,
    label: String,
    job: Job,
}

impl PartialEq for DeferredAction {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DeferredAction {}

impl PartialOrd for DeferredAction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeferredAction {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.fire_at, self.seq).cmp(&(other.fire_at, other.seq))
    }
}

enum SchedulerRequest {
    Schedule(DeferredAction),
    Shutdown,
}

/// Handle to the timer task. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<SchedulerRequest>,
    pending: Arc<AtomicUsize>,
    seq: Arc<AtomicU64>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("running", &!self.tx.is_closed())
            .finish()
    }
}

impl Scheduler {
    /// Spawn the timer task on the current tokio runtime.
    #[must_use]
    pub fn start(config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));

        info!(target: SCHEDULER_TARGET, workers = config.workers, "Starting deferred action scheduler");
        tokio::spawn(run(rx, Arc::clone(&pending), workers));

        Self {
            tx,
            pending,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `callback(args)` once, at or after `fire_at`.
    ///
    /// A `fire_at` in the past fires as soon as the timer task gets to it.
    ///
    /// # Errors
    /// Returns `SchedulerError::Stopped` if the timer task is gone.
    pub fn schedule<A, F, Fut>(
        &self,
        fire_at: DateTime<Utc>,
        callback: F,
        args: A,
    ) -> Result<(), SchedulerError>
    where
        A: fmt::Debug + Send + 'static,
        F: FnOnce(A) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        let label = format!("{args:?}");
        let job: Job = Box::new(move || -> ActionFuture { Box::pin(callback(args)) });
        let action = DeferredAction {
            fire_at: deadline(fire_at),
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            label,
            job,
        };

        debug!(target: SCHEDULER_TARGET, action = %action.label, %fire_at, "Scheduling deferred action");
        self.pending.fetch_add(1, AtomicOrdering::SeqCst);
        self.tx
            .send(SchedulerRequest::Schedule(action))
            .map_err(|_| {
                self.pending.fetch_sub(1, AtomicOrdering::SeqCst);
                SchedulerError::Stopped
            })
    }

    /// Re-arm every action `source` reports as pending. Returns how many were armed.
    ///
    /// # Errors
    /// Returns the source's error, or `SchedulerError::Stopped`.
    pub async fn recover<R: Recoverable>(&self, source: &R) -> Result<usize, Error> {
        let actions = source.pending_actions().await?;
        let count = actions.len();
        for (fire_at, args) in actions {
            let source = source.clone();
            self.schedule(fire_at, move |args| source.fire(args), args)?;
        }
        info!(target: SCHEDULER_TARGET, count, "Recovered deferred actions");
        Ok(count)
    }

    /// Actions armed but not yet handed to a worker.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(AtomicOrdering::SeqCst)
    }

    /// Stop the timer task. Actions that have not fired are dropped.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SchedulerRequest::Shutdown);
    }
}

/// Convert a wall-clock fire time into a timer deadline. Past times are due now.
fn deadline(fire_at: DateTime<Utc>) -> Instant {
    let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
    Instant::now() + delay
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<SchedulerRequest>,
    pending: Arc<AtomicUsize>,
    workers: Arc<Semaphore>,
) {
    let mut queue: BinaryHeap<Reverse<DeferredAction>> = BinaryHeap::new();

    loop {
        let next = queue.peek().map(|Reverse(action)| action.fire_at);

        tokio::select! {
            request = rx.recv() => match request {
                Some(SchedulerRequest::Schedule(action)) => queue.push(Reverse(action)),
                Some(SchedulerRequest::Shutdown) | None => break,
            },
            () = wait_for(next) => {
                let now = Instant::now();
                while queue.peek().is_some_and(|Reverse(action)| action.fire_at <= now) {
                    if let Some(Reverse(action)) = queue.pop() {
                        pending.fetch_sub(1, AtomicOrdering::SeqCst);
                        dispatch(action, Arc::clone(&workers));
                    }
                }
            }
        }
    }

    // Refuse new work, then count what was sent behind the shutdown request
    rx.close();
    let mut dropped = queue.len();
    while let Ok(request) = rx.try_recv() {
        if matches!(request, SchedulerRequest::Schedule(_)) {
            dropped += 1;
        }
    }
    pending.fetch_sub(dropped, AtomicOrdering::SeqCst);
    info!(target: SCHEDULER_TARGET, dropped, "Deferred action scheduler shut down");
}

/// Run one action on a worker. Errors and panics stay inside the worker.
fn dispatch(action: DeferredAction, workers: Arc<Semaphore>) {
    tokio::spawn(async move {
        let Ok(_permit) = workers.acquire_owned().await else {
            return;
        };
        let DeferredAction { label, job, .. } = action;

        match tokio::spawn(job()).await {
            Ok(Ok(())) => {
                debug!(target: SCHEDULER_TARGET, action = %label, "Deferred action completed");
            }
            Ok(Err(e)) => {
                error!(
                    target: ERROR_TARGET,
                    action = %label,
                    error = %e,
                    "Deferred action failed"
                );
            }
            Err(e) => {
                error!(
                    target: ERROR_TARGET,
                    action = %label,
                    error = %e,
                    "Deferred action panicked"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;
    use std::time::Duration;

    fn counter_callback(
        counter: Arc<AtomicUsize>,
    ) -> impl FnOnce(usize) -> ActionFuture + Send + 'static {
        move |amount| -> ActionFuture {
            Box::pin(async move {
                counter.fetch_add(amount, AtomicOrdering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_action_fires_promptly() {
        let scheduler = Scheduler::start(SchedulerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule(
                Utc::now() - ChronoDuration::seconds(30),
                counter_callback(Arc::clone(&counter)),
                1,
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_waits_for_fire_time() {
        let scheduler = Scheduler::start(SchedulerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule(
                Utc::now() + ChronoDuration::seconds(60),
                counter_callback(Arc::clone(&counter)),
                1,
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_fire_time_fires_each_once() {
        let scheduler = Scheduler::start(SchedulerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let fire_at = Utc::now() + ChronoDuration::seconds(5);

        scheduler
            .schedule(fire_at, counter_callback(Arc::clone(&counter)), 1)
            .unwrap();
        scheduler
            .schedule(fire_at, counter_callback(Arc::clone(&counter)), 10)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_fire_in_time_order() {
        let scheduler = Scheduler::start(SchedulerConfig { workers: 1 });
        let order = Arc::new(Mutex::new(Vec::new()));
        let now = Utc::now();

        for (offset, name) in [(30, "third"), (10, "first"), (20, "second")] {
            let order = Arc::clone(&order);
            scheduler
                .schedule(
                    now + ChronoDuration::seconds(offset),
                    move |name: &'static str| async move {
                        order.lock().unwrap().push(name);
                        Ok::<(), Error>(())
                    },
                    name,
                )
                .unwrap();
        }

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_isolated() {
        let scheduler = Scheduler::start(SchedulerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let fire_at = Utc::now() + ChronoDuration::seconds(1);

        scheduler
            .schedule(
                fire_at,
                |()| async { Err::<(), Error>("reversal failed".into()) },
                (),
            )
            .unwrap();
        scheduler
            .schedule(
                fire_at,
                |should_panic: bool| async move {
                    assert!(!should_panic, "callback panicked");
                    Ok::<(), Error>(())
                },
                true,
            )
            .unwrap();
        scheduler
            .schedule(fire_at, counter_callback(Arc::clone(&counter)), 1)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);

        // The loop is still alive after the failures.
        scheduler
            .schedule(
                Utc::now() + ChronoDuration::seconds(1),
                counter_callback(Arc::clone(&counter)),
                1,
            )
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_callback_does_not_delay_other_timers() {
        let scheduler = Scheduler::start(SchedulerConfig { workers: 2 });
        let counter = Arc::new(AtomicUsize::new(0));
        let now = Utc::now();

        scheduler
            .schedule(
                now + ChronoDuration::seconds(1),
                |()| async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<(), Error>(())
                },
                (),
            )
            .unwrap();
        scheduler
            .schedule(
                now + ChronoDuration::seconds(2),
                counter_callback(Arc::clone(&counter)),
                1,
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending_actions() {
        let scheduler = Scheduler::start(SchedulerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule(
                Utc::now() + ChronoDuration::seconds(10),
                counter_callback(Arc::clone(&counter)),
                1,
            )
            .unwrap();
        scheduler.shutdown();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
        assert!(matches!(
            scheduler.schedule(Utc::now(), counter_callback(counter), 1),
            Err(SchedulerError::Stopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_queued_behind_shutdown_are_not_counted() {
        let scheduler = Scheduler::start(SchedulerConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));

        // Both requests are sent before the timer task gets to run
        scheduler.shutdown();
        scheduler
            .schedule(
                Utc::now() + ChronoDuration::seconds(10),
                counter_callback(Arc::clone(&counter)),
                1,
            )
            .unwrap();
        assert_eq!(scheduler.pending(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(counter.load(AtomicOrdering::SeqCst), 0);
    }

    #[derive(Clone)]
    struct FixedSource {
        offsets: Vec<i64>,
        fired: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Recoverable for FixedSource {
        type Args = i64;

        async fn pending_actions(&self) -> Result<Vec<(DateTime<Utc>, i64)>, Error> {
            let now = Utc::now();
            Ok(self
                .offsets
                .iter()
                .map(|offset| (now + ChronoDuration::seconds(*offset), *offset))
                .collect())
        }

        async fn fire(self, _args: i64) -> Result<(), Error> {
            self.fired.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_arms_every_pending_action() {
        let scheduler = Scheduler::start(SchedulerConfig::default());
        let source = FixedSource {
            offsets: vec![10, 20, 30],
            fired: Arc::new(AtomicUsize::new(0)),
        };

        let armed = scheduler.recover(&source).await.unwrap();
        assert_eq!(armed, 3);
        assert_eq!(scheduler.pending(), 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.fired.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(scheduler.pending(), 0);
    }
}
