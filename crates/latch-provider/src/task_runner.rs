//! Delayed-task contract.

use std::time::Duration;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Fire-and-forget delayed execution.
///
/// There is no cancellation: a posted task may run after the state it refers
/// to is gone, so tasks must re-check by stable identifier (session id, key)
/// rather than holding live handles.
pub trait TaskRunner: Send + Sync {
    /// Run `task` once, no sooner than `delay` from now.
    fn post_delayed(&self, delay: Duration, task: Task);
}

/// Task runner backed by a tokio runtime.
pub struct TokioTaskRunner {
    handle: tokio::runtime::Handle,
}

impl TokioTaskRunner {
    /// Wrap an existing runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Wrap the runtime the caller is currently inside.
    ///
    /// Panics outside a tokio runtime, same as [`tokio::runtime::Handle::current`].
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskRunner for TokioTaskRunner {
    fn post_delayed(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn posted_task_runs_after_delay() {
        let runner = TokioTaskRunner::current();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();

        runner.post_delayed(
            Duration::from_secs(300),
            Box::new(move || fired_clone.store(true, Ordering::SeqCst)),
        );

        tokio::time::sleep(Duration::from_secs(299)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst));
    }
}
