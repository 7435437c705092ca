//! Computed State Implementation
//!
//! A ComputedState is a read-only state whose value is a pure function of a
//! group of source states.
//!
//! # How Computed States Work
//!
//! 1. The selector runs once at construction to seed the value.
//!
//! 2. When a source notifies and the computed state has subscribers, the
//!    selector runs immediately and the result is committed, so chains of
//!    computed states stay live.
//!
//! 3. When a source notifies and nobody is subscribed, the computed state is
//!    only marked dirty. The selector does not run.
//!
//! 4. `get()` on a dirty computed state recomputes before returning, so reads
//!    are always consistent with the latest source values.
//!
//! Writes are rejected with [`RippleError::ReadOnlyState`]; change the
//! sources instead.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::entity::{Entity, ReadGroup, Readable, Source};
use super::observable::Listener;
use super::state::{State, StateValue};
use super::subscriber::{EntityId, Subscription};
use crate::error::{Result, RippleError};

/// Freshness of the cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The cached value matches the sources.
    Clean,

    /// A source changed while nobody was subscribed.
    Dirty,
}

struct ComputedInner<T> {
    state: State<T>,
    selector: Box<dyn Fn() -> T + Send + Sync>,
    freshness: Mutex<Freshness>,
    sources: Mutex<Vec<Subscription>>,
}

impl<T: StateValue> ComputedInner<T> {
    fn recompute(&self) {
        *self.freshness.lock() = Freshness::Clean;
        let value = (self.selector)();
        self.state.set(value);
    }

    fn invalidate(&self) {
        if self.state.has_listeners() {
            self.recompute();
        } else {
            *self.freshness.lock() = Freshness::Dirty;
        }
    }

    fn refresh(&self) {
        let dirty = *self.freshness.lock() == Freshness::Dirty;
        if dirty {
            self.recompute();
        }
    }
}

/// A read-only state derived from other states.
///
/// ```rust,ignore
/// let price = State::new(10);
/// let quantity = State::new(3);
/// let total = ComputedState::new((price.clone(), quantity.clone()), |(p, q)| p * q);
/// assert_eq!(total.get(), 30);
/// ```
pub struct ComputedState<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T: StateValue> ComputedState<T> {
    /// Derive a state from `sources` through `selector`.
    pub fn new<G, F>(sources: G, selector: F) -> Self
    where
        G: ReadGroup,
        F: Fn(G::Values) -> T + Send + Sync + 'static,
    {
        let reader = sources.clone();
        let selector: Box<dyn Fn() -> T + Send + Sync> =
            Box::new(move || selector(reader.read_all()));

        let inner = Arc::new(ComputedInner {
            state: State::new(selector()),
            selector,
            freshness: Mutex::new(Freshness::Clean),
            sources: Mutex::new(Vec::new()),
        });

        let weak: Weak<ComputedInner<T>> = Arc::downgrade(&inner);
        let subscriptions = sources.watch_all(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.invalidate();
            }
        }));
        *inner.sources.lock() = subscriptions;

        Self { inner }
    }

    /// Derive from a single readable source.
    pub fn map<S, F>(source: &S, f: F) -> Self
    where
        S: Readable,
        F: Fn(&S::Payload) -> T + Send + Sync + 'static,
    {
        Self::new((source.clone(),), move |(value,)| f(&value))
    }

    /// The current value, recomputed first if a source changed unobserved.
    pub fn get(&self) -> T {
        self.inner.refresh();
        self.inner.state.get()
    }

    /// The value replaced by the last real change.
    pub fn get_previous(&self) -> T {
        self.inner.state.get_previous()
    }

    /// Always fails: computed states are read-only.
    pub fn set(&self, _value: T) -> Result<()> {
        Err(self.read_only())
    }

    /// Always fails: computed states are read-only.
    pub fn reset(&self) -> Result<()> {
        Err(self.read_only())
    }

    /// Current freshness of the cached value.
    pub fn freshness(&self) -> Freshness {
        *self.inner.freshness.lock()
    }

    /// Number of listeners.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.subscriber_count()
    }

    /// Drop downstream listeners while still following the sources.
    pub(crate) fn clear_listeners(&self) {
        self.inner.state.clear_listeners();
    }

    fn read_only(&self) -> RippleError {
        tracing::warn!(state = %self.id(), "rejected write to computed state");
        RippleError::ReadOnlyState { id: self.id() }
    }
}

impl<T: StateValue> Entity for ComputedState<T> {
    fn id(&self) -> EntityId {
        self.inner.state.id()
    }

    fn release(&self) {
        let sources = std::mem::take(&mut *self.inner.sources.lock());
        for subscription in sources {
            subscription.unsubscribe();
        }
        self.inner.state.release();
    }
}

impl<T: StateValue> Source for ComputedState<T> {
    type Payload = T;

    fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        self.inner.refresh();
        self.inner.state.subscribe_listener(listener)
    }
}

impl<T: StateValue> Readable for ComputedState<T> {
    fn read(&self) -> T {
        self.get()
    }
}

impl<T> Clone for ComputedState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for ComputedState<T>
where
    T: StateValue + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedState")
            .field("id", &self.id())
            .field("freshness", &self.freshness())
            .field("value", &self.inner.state.get())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
