//! Cancellable one-shot timer.
//!
//! At most one callback is armed at a time: arming again aborts the previous
//! task. The callback runs on the ambient tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{Result, RippleError};

#[derive(Default)]
struct Slot {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub(crate) struct Timer {
    slot: Arc<Mutex<Slot>>,
}

impl Timer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `callback` after `delay`, replacing any armed callback.
    pub(crate) fn arm<F>(&self, delay: Duration, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| RippleError::NoRuntime)?;

        let mut slot = self.slot.lock();
        slot.generation += 1;
        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);

        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                // Disarm before running so the callback may re-arm.
                let mut slot = shared.lock();
                if slot.generation != generation {
                    return;
                }
                slot.task = None;
            }
            callback();
        });

        if let Some(previous) = slot.task.replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Abort the armed callback, if any.
    pub(crate) fn clear(&self) {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        if let Some(task) = slot.task.take() {
            task.abort();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.slot.lock().task.is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let timer = Timer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        timer
            .arm(Duration::from_millis(50), move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(timer.is_armed());

        tokio::time::sleep(Duration::from_millis(49)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_previous_callback() {
        let timer = Timer::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let fired = fired.clone();
            timer
                .arm(Duration::from_millis(10), move || fired.lock().push(tag))
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*fired.lock(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_prevents_firing() {
        let timer = Timer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        timer
            .arm(Duration::from_millis(5), move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        timer.clear();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn clear_wins_over_a_task_already_awake() {
        let timer = Timer::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        timer
            .arm(Duration::from_millis(10), move || {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        {
            // The task wakes up while the slot is held and waits on it.
            let mut slot = timer.slot.lock();
            std::thread::sleep(Duration::from_millis(100));
            slot.generation += 1;
            if let Some(task) = slot.task.take() {
                task.abort();
            }
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!timer.is_armed());
    }

    #[test]
    fn arming_without_a_runtime_fails() {
        let timer = Timer::new();
        let error = timer.arm(Duration::from_millis(1), || {}).unwrap_err();
        assert!(matches!(error, RippleError::NoRuntime));
    }
}
