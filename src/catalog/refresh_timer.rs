//! A cancelable, deferred task slot for the automatic refresh.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Holds at most one scheduled task.
///
/// Scheduling always cancels what was pending before. A task that fires
/// calls [`release`](Self::release) with its generation first, which detaches
/// it from the slot so a later [`cancel`](Self::cancel) cannot abort the
/// task while it is running.
#[derive(Default)]
pub struct RefreshTimer {
    pending: Option<Pending>,
    generation: u64,
}

impl RefreshTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the future built by `on_fire` after `delay`, replacing any
    /// pending task. `on_fire` receives the generation of the new task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&mut self, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let fire = on_fire(generation);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        });
        self.pending = Some(Pending { generation, handle });
        generation
    }

    /// Aborts the pending task. Returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Detaches the task of `generation` from the slot without aborting it.
    ///
    /// Returns `false` when that task has since been replaced or canceled.
    pub fn release(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| !pending.handle.is_finished())
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
