//! Reactions.
//!
//! A Reaction watches a group of sources and, after any of them notifies,
//! delivers the current value of every source to its own subscribers. All
//! notifications raised in one synchronous turn collapse into one delivery
//! in the next turn. With no subscribers nothing is scheduled or read.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::batch::Batch;
use super::entity::{Entity, EntityCore, ReadGroup, Source};
use super::observable::Listener;
use super::subscriber::{EntityId, Subscription};

struct ReactionInner<G: ReadGroup> {
    core: EntityCore<G::Values>,
    sources: G,
    batch: Batch,
    watching: Mutex<Vec<Subscription>>,
}

impl<G: ReadGroup> ReactionInner<G> {
    fn source_changed(self: &Arc<Self>) {
        if !self.core.has_listeners() {
            return;
        }

        let inner: Weak<Self> = Arc::downgrade(self);
        self.batch.schedule(move || {
            if let Some(inner) = inner.upgrade() {
                inner.flush();
            }
        });
    }

    fn flush(&self) {
        if !self.core.has_listeners() {
            return;
        }
        let values = self.sources.read_all();
        self.core.notify(&values);
    }
}

/// Batched observer of a group of sources.
///
/// ```rust,ignore
/// let first = State::new("Ada".to_string());
/// let last = State::new("Lovelace".to_string());
/// let names = Reaction::new((first.clone(), last.clone()));
/// names.subscribe(|(first, last)| println!("{first} {last}"));
/// ```
pub struct Reaction<G: ReadGroup> {
    inner: Arc<ReactionInner<G>>,
}

impl<G: ReadGroup> Reaction<G> {
    pub fn new(sources: G) -> Self {
        let inner = Arc::new(ReactionInner {
            core: EntityCore::new(),
            sources: sources.clone(),
            batch: Batch::new(),
            watching: Mutex::new(Vec::new()),
        });

        let weak: Weak<ReactionInner<G>> = Arc::downgrade(&inner);
        let watching = sources.watch_all(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.source_changed();
            }
        }));
        *inner.watching.lock() = watching;

        Self { inner }
    }

    /// Read every source now, outside the batch.
    pub fn values(&self) -> G::Values {
        self.inner.sources.read_all()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.core.listener_count()
    }
}

impl<G: ReadGroup> Entity for Reaction<G> {
    fn id(&self) -> EntityId {
        self.inner.core.id()
    }

    fn release(&self) {
        let watching = std::mem::take(&mut *self.inner.watching.lock());
        for subscription in watching {
            subscription.unsubscribe();
        }
        self.inner.core.release();
    }
}

impl<G: ReadGroup> Source for Reaction<G> {
    type Payload = G::Values;

    fn subscribe_listener(&self, listener: Listener<G::Values>) -> Subscription {
        self.inner.core.subscribe_listener(listener)
    }
}

impl<G: ReadGroup> Clone for Reaction<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: ReadGroup> fmt::Debug for Reaction<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("core", &self.inner.core)
            .field("scheduled", &self.inner.batch.is_scheduled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::State;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn collapses_synchronous_changes_into_one_delivery() {
        let a = State::new(1);
        let b = State::new("x");
        let reaction = Reaction::new((a.clone(), b.clone()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        reaction.subscribe(move |values: &(i32, &str)| seen_clone.lock().push(*values));

        a.set(2);
        a.set(3);
        b.set("y");
        assert!(seen.lock().is_empty());

        tokio::task::yield_now().await;
        assert_eq!(*seen.lock(), vec![(3, "y")]);

        b.set("z");
        tokio::task::yield_now().await;
        assert_eq!(*seen.lock(), vec![(3, "y"), (3, "z")]);
    }

    #[tokio::test]
    async fn does_nothing_without_subscribers() {
        let a = State::new(1);
        let reaction = Reaction::new((a.clone(),));

        a.set(2);
        assert!(!reaction.inner.batch.is_scheduled());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        reaction.subscribe(move |values: &(i32,)| seen_clone.lock().push(values.0));
        tokio::task::yield_now().await;
        assert!(seen.lock().is_empty());

        a.set(3);
        tokio::task::yield_now().await;
        assert_eq!(*seen.lock(), vec![3]);
    }

    #[tokio::test]
    async fn release_stops_watching() {
        let a = State::new(1);
        let reaction = Reaction::new(vec![a.clone()]);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        reaction.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        reaction.release();
        a.set(5);
        tokio::task::yield_now().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(a.subscriber_count(), 0);
    }
}
