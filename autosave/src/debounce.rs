//! Cancelable delayed task used for the autosave debounce.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A future scheduled to run after a delay.
///
/// Dropping the task or calling [`DebounceTask::cancel`] aborts it if it has
/// not completed yet. Work that must outlive cancellation should be spawned
/// separately from inside the scheduled future.
#[derive(Debug)]
pub struct DebounceTask {
    handle: JoinHandle<()>,
}

impl DebounceTask {
    pub fn schedule<F>(delay: Duration, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fut.await;
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DebounceTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Holds at most one pending [`DebounceTask`]; scheduling replaces it.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<DebounceTask>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any pending task and schedule `fut` after `delay`.
    pub fn reschedule<F>(&mut self, delay: Duration, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.clear();
        self.pending = Some(DebounceTask::schedule(delay, fut));
    }

    pub fn clear(&mut self) {
        if let Some(task) = self.pending.take() {
            task.cancel();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|task| !task.is_finished())
    }
}
