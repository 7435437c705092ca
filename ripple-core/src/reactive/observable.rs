//! Observable Implementation
//!
//! The observable is the publish/subscribe primitive every entity is built
//! on. It owns an ordered set of listeners and delivers payloads to them.
//!
//! # Re-entrancy
//!
//! Listeners frequently react to a notification by dispatching events or
//! setting state, which may add or remove listeners on this very observable.
//! `notify` therefore copies the listener list before invoking anything and
//! never holds the lock while user code runs.
//!
//! # Failure Isolation
//!
//! A listener that panics does not stop delivery to the remaining listeners.
//! The panic is caught, logged, and swallowed.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::subscriber::{SubscriberId, Subscription};

/// A listener callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type ListenerMap<T> = IndexMap<SubscriberId, Listener<T>>;

/// An ordered set of listeners.
///
/// Clones share the same listener set.
pub struct Observable<T> {
    listeners: Arc<Mutex<ListenerMap<T>>>,
}

impl<T: 'static> Observable<T> {
    /// Create an observable with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    /// Register a listener and return its unsubscribe handle.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_listener(Arc::new(listener))
    }

    /// Register an already shared listener.
    pub fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        let id = SubscriberId::new();
        self.listeners.lock().insert(id, listener);

        let listeners: Weak<Mutex<ListenerMap<T>>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.lock().shift_remove(&id);
            }
        })
    }

    /// Deliver `payload` to every listener registered before this call.
    pub fn notify(&self, payload: &T) {
        let snapshot: SmallVec<[Listener<T>; 4]> =
            self.listeners.lock().values().cloned().collect();

        tracing::trace!(listeners = snapshot.len(), "notify");

        for listener in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(payload)));
            if let Err(panic) = outcome {
                tracing::error!(reason = panic_message(&panic), "listener panicked");
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Whether anyone is listening.
    pub fn has_listeners(&self) -> bool {
        !self.listeners.lock().is_empty()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl<T: 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("listener_count", &self.listeners.lock().len())
            .finish()
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn notifies_every_listener_in_order() {
        let observable = Observable::<i32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let seen = seen.clone();
            observable.subscribe(move |value| seen.lock().push((tag, *value)));
        }

        observable.notify(&7);
        assert_eq!(*seen.lock(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let observable = Observable::<()>::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let subscription = observable.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _other = observable.subscribe(|_| {});

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(observable.listener_count(), 1);

        observable.notify(&());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_stop_delivery() {
        let observable = Observable::<i32>::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        observable.subscribe(|_| panic!("boom"));
        observable.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        observable.notify(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_added_during_notify_wait_for_the_next_one() {
        let observable = Observable::<i32>::new();
        let late_calls = Arc::new(AtomicI32::new(0));

        let handle = observable.clone();
        let late = late_calls.clone();
        observable.subscribe(move |_| {
            let late = late.clone();
            handle.subscribe(move |_| {
                late.fetch_add(1, Ordering::SeqCst);
            });
        });

        observable.notify(&1);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        observable.notify(&2);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_removes_everyone() {
        let observable = Observable::<i32>::new();
        observable.subscribe(|_| {});
        observable.subscribe(|_| {});

        assert!(observable.has_listeners());
        observable.clear();
        assert!(!observable.has_listeners());
    }
}
