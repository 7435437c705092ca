//! Microtask-style batching.
//!
//! Many synchronous notifications inside one turn of the runtime collapse
//! into a single deferred flush. The flush runs in a task spawned on the
//! ambient tokio runtime, which starts as soon as the current task yields.
//! The batch re-opens once the flush has run.
//!
//! Without a runtime there is no later turn to defer to, so the flush runs
//! inline and no coalescing happens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;

#[derive(Debug, Default)]
pub(crate) struct Batch {
    scheduled: Arc<AtomicBool>,
}

impl Batch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Schedule `flush` unless a flush is already scheduled.
    pub(crate) fn schedule<F>(&self, flush: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }

        let scheduled = Arc::clone(&self.scheduled);
        let run = move || {
            flush();
            scheduled.store(false, Ordering::Release);
        };

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { run() });
            }
            Err(_) => {
                tracing::trace!("no runtime, flushing batch inline");
                run();
            }
        }
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn coalesces_calls_within_one_turn() {
        let batch = Batch::new();
        let flushes = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let flushes = flushes.clone();
            batch.schedule(move || {
                flushes.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(batch.is_scheduled());
        assert_eq!(flushes.load(Ordering::SeqCst), 0);

        tokio::task::yield_now().await;
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
        assert!(!batch.is_scheduled());
    }

    #[tokio::test]
    async fn reopens_after_flush() {
        let batch = Batch::new();
        let flushes = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let flushes_clone = flushes.clone();
            batch.schedule(move || {
                flushes_clone.fetch_add(1, Ordering::SeqCst);
            });
            tokio::task::yield_now().await;
        }

        assert_eq!(flushes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn flushes_inline_without_runtime() {
        let batch = Batch::new();
        let flushes = Arc::new(AtomicUsize::new(0));
        let flushes_clone = flushes.clone();

        batch.schedule(move || {
            flushes_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
        assert!(!batch.is_scheduled());
    }
}
