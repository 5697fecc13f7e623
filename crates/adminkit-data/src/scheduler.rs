//! Deferred task execution.
//!
//! Tick coalescing, debouncing and lookup batching all need "run this later".
//! The [`Scheduler`] trait makes that explicit so tests can drive time by hand
//! with [`ManualScheduler`] while applications use [`TokioScheduler`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

// =============================================================================
// TASK HANDLE
// =============================================================================

/// Handle to a scheduled task.
///
/// Cancelling after the task started has no effect.
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    state: Arc<AtomicU8>,
}

impl TaskHandle {
    /// Create a handle for a task that has not run yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prevent the task from running.
    pub fn cancel(&self) {
        let _ = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Whether the task still waits to run.
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    /// Whether the task was cancelled before it ran.
    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Claim the task for execution. Returns `false` if it was cancelled or
    /// already started. Scheduler implementations call this right before
    /// running the task.
    pub fn try_start(&self) -> bool {
        self.state
            .compare_exchange(PENDING, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

// =============================================================================
// SCHEDULER TRAIT
// =============================================================================

/// Runs tasks after a delay. A zero delay means "on the next tick", never
/// synchronously inside `schedule`.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Schedule `task` to run after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;
}

// =============================================================================
// TOKIO SCHEDULER
// =============================================================================

/// Scheduler backed by a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    /// Scheduler spawning onto the given runtime.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Scheduler spawning onto the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let claim = handle.clone();
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if claim.try_start() {
                task();
            }
        });
        handle
    }
}

// =============================================================================
// MANUAL SCHEDULER
// =============================================================================

struct Scheduled {
    due: Duration,
    seq: u64,
    handle: TaskHandle,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    queue: Vec<Scheduled>,
}

/// Deterministic scheduler driven by a virtual clock.
///
/// Tasks run only when the test calls [`run_due`](Self::run_due),
/// [`advance`](Self::advance) or [`run_until_idle`](Self::run_until_idle).
/// Tasks due at the same instant run in scheduling order.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl ManualScheduler {
    /// Upper bound on tasks run by one call, to stop self-rescheduling loops.
    const MAX_RUNS: usize = 10_000;

    /// Create a scheduler at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of tasks that are neither cancelled nor started.
    pub fn pending_count(&self) -> usize {
        self.lock()
            .queue
            .iter()
            .filter(|scheduled| scheduled.handle.is_pending())
            .count()
    }

    /// Run every task due at the current time, including tasks they schedule
    /// with zero delay. Returns the number of tasks run.
    pub fn run_due(&self) -> usize {
        let now = self.now();
        self.run_until(now)
    }

    /// Move the clock forward by `by`, running tasks as they fall due.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let runs = self.run_until(target);
        let mut state = self.lock();
        if state.now < target {
            state.now = target;
        }
        runs
    }

    /// Run tasks until none are left, moving the clock as needed.
    pub fn run_until_idle(&self) -> usize {
        self.run_until(Duration::MAX)
    }

    fn run_until(&self, limit: Duration) -> usize {
        let mut runs = 0;
        while runs < Self::MAX_RUNS {
            let Some(next) = self.pop_next(limit) else {
                break;
            };
            if next.handle.try_start() {
                (next.task)();
                runs += 1;
            }
        }
        if runs == Self::MAX_RUNS {
            tracing::warn!(runs, "Manual scheduler stopped after too many tasks");
        }
        runs
    }

    fn pop_next(&self, limit: Duration) -> Option<Scheduled> {
        let mut state = self.lock();
        state.queue.retain(|scheduled| scheduled.handle.is_pending());
        let index = state
            .queue
            .iter()
            .enumerate()
            .filter(|(_, scheduled)| scheduled.due <= limit)
            .min_by_key(|(_, scheduled)| (scheduled.due, scheduled.seq))
            .map(|(index, _)| index)?;
        let next = state.queue.swap_remove(index);
        if next.due > state.now {
            state.now = next.due;
        }
        Some(next)
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now.saturating_add(delay);
        state.queue.push(Scheduled {
            due,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |label: &'static str| -> Task {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().unwrap().push(label))
        };
        (log, make)
    }

    #[test]
    fn zero_delay_runs_on_next_tick_in_order() {
        let scheduler = ManualScheduler::new();
        let (log, make) = recorder();
        scheduler.schedule(Duration::ZERO, make("a"));
        scheduler.schedule(Duration::ZERO, make("b"));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(scheduler.pending_count(), 2);
        assert_eq!(scheduler.run_due(), 2);
        assert_eq!(*log.lock().unwrap(), ["a", "b"]);
    }

    #[test]
    fn advance_runs_due_tasks_only() {
        let scheduler = ManualScheduler::new();
        let (log, make) = recorder();
        scheduler.schedule(Duration::from_millis(500), make("late"));
        scheduler.schedule(Duration::from_millis(100), make("early"));
        scheduler.advance(Duration::from_millis(200));
        assert_eq!(*log.lock().unwrap(), ["early"]);
        assert_eq!(scheduler.now(), Duration::from_millis(200));
        scheduler.advance(Duration::from_millis(300));
        assert_eq!(*log.lock().unwrap(), ["early", "late"]);
    }

    #[test]
    fn cancelled_tasks_never_run() {
        let scheduler = ManualScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = scheduler.schedule(
            Duration::ZERO,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(scheduler.run_until_idle(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancel_after_start_is_ignored() {
        let handle = TaskHandle::new();
        assert!(handle.try_start());
        handle.cancel();
        assert!(!handle.is_cancelled());
        assert!(!handle.try_start());
    }

    #[tokio::test]
    async fn tokio_scheduler_defers_zero_delay() {
        let scheduler = TokioScheduler::current();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        scheduler.schedule(
            Duration::ZERO,
            Box::new(move || {
                flag.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(());
            }),
        );
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        rx.await.expect("task ran");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
