//! Trailing-edge debouncing on top of a [`Scheduler`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::scheduler::{Scheduler, Task, TaskHandle};

/// Runs only the last of a burst of calls, once `delay` has passed without a
/// newer call.
#[derive(Debug)]
pub struct Debouncer {
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    pending: Mutex<Option<TaskHandle>>,
}

impl Debouncer {
    /// Create a debouncer with the given quiet period.
    pub fn new(scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        Self {
            scheduler,
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Quiet period.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending call with `task`.
    pub fn call(&self, task: Task) {
        let mut pending = self.lock();
        if let Some(previous) = pending.take() {
            previous.cancel();
        }
        *pending = Some(self.scheduler.schedule(self.delay, task));
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        if let Some(previous) = self.lock().take() {
            previous.cancel();
        }
    }

    /// Whether a call is waiting for its quiet period to end.
    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(TaskHandle::is_pending)
    }

    fn lock(&self) -> MutexGuard<'_, Option<TaskHandle>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
