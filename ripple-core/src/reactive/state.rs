//! State Implementation
//!
//! A State holds a current value and the value it replaced. Writing a value
//! equal to the current one is a no-op: nothing is stored and nobody is
//! notified. Every real change notifies listeners with the new value.
//!
//! # Wiring
//!
//! Instead of subscribing to events and calling `set` by hand, a state can
//! be wired to derive its next value from any [`Source`]:
//!
//! ```rust,ignore
//! let submitted = Event::<String>::new();
//! let name = State::new(String::new());
//! name.change_on(&submitted);
//! ```
//!
//! Wiring is deduplicated by the upstream's identity, so wiring the same
//! event twice still produces one update per dispatch.

use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::computed::ComputedState;
use super::entity::{Entity, EntityCore, Readable, Source};
use super::observable::Listener;
use super::subscriber::{EntityId, Subscription};

/// Values a state can hold.
pub trait StateValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> StateValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

struct Values<T> {
    current: T,
    previous: T,
}

struct StateInner<T> {
    core: EntityCore<T>,
    initial: T,
    values: Mutex<Values<T>>,
}

impl<T: StateValue> StateInner<T> {
    fn commit(&self, value: T) -> bool {
        let snapshot = {
            let mut values = self.values.lock();
            if values.current == value {
                return false;
            }
            values.previous = std::mem::replace(&mut values.current, value);
            values.current.clone()
        };

        self.core.notify(&snapshot);
        true
    }

    fn current(&self) -> T {
        self.values.lock().current.clone()
    }
}

/// A mutable reactive value.
///
/// Clones share the same value, listeners and identity.
///
/// ```rust,ignore
/// let count = State::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// assert_eq!(count.get_previous(), 0);
/// ```
pub struct State<T> {
    inner: Arc<StateInner<T>>,
}

impl<T: StateValue> State<T> {
    /// Create a state. Current and previous both start at `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(StateInner {
                core: EntityCore::new(),
                initial: value.clone(),
                values: Mutex::new(Values {
                    current: value.clone(),
                    previous: value,
                }),
            }),
        }
    }

    /// The current value.
    pub fn get(&self) -> T {
        self.inner.current()
    }

    /// The value replaced by the last real change.
    pub fn get_previous(&self) -> T {
        self.inner.values.lock().previous.clone()
    }

    /// The value this state was constructed with.
    pub fn initial(&self) -> &T {
        &self.inner.initial
    }

    /// Store `value` and notify, unless it equals the current value.
    pub fn set(&self, value: T) {
        self.inner.commit(value);
    }

    /// Commit `f(current)` through [`State::set`].
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get();
        self.set(f(&current));
    }

    /// Commit the construction value through [`State::set`].
    pub fn reset(&self) {
        self.inner.commit(self.inner.initial.clone());
    }

    /// Take the payload of `source` as the next value.
    pub fn change_on<S>(&self, source: &S) -> &Self
    where
        S: Source<Payload = T>,
    {
        self.change_on_with(source, |payload: &T, _current: &T| payload.clone())
    }

    /// Derive the next value from the payload of `source` and the current
    /// value.
    pub fn change_on_with<S, F>(&self, source: &S, map: F) -> &Self
    where
        S: Source,
        F: Fn(&S::Payload, &T) -> T + Send + Sync + 'static,
    {
        let state = Arc::downgrade(&self.inner);
        self.wire(source, move |payload: &S::Payload| {
            if let Some(state) = state.upgrade() {
                let next = map(payload, &state.current());
                state.commit(next);
            }
        })
    }

    /// Reset to the construction value whenever `source` notifies.
    pub fn reset_on<S>(&self, source: &S) -> &Self
    where
        S: Source,
    {
        let state: Weak<StateInner<T>> = Arc::downgrade(&self.inner);
        self.wire(source, move |_: &S::Payload| {
            if let Some(state) = state.upgrade() {
                state.commit(state.initial.clone());
            }
        })
    }

    /// A read-only state derived from this one through a pure function.
    pub fn map<U, F>(&self, f: F) -> ComputedState<U>
    where
        U: StateValue,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        ComputedState::new((self.clone(),), move |(value,)| f(&value))
    }

    /// A fresh, independent state seeded with this state's initial value.
    pub fn fork(&self) -> Self {
        Self::new(self.inner.initial.clone())
    }

    /// Number of listeners.
    pub fn subscriber_count(&self) -> usize {
        self.inner.core.listener_count()
    }

    pub(crate) fn clear_listeners(&self) {
        self.inner.core.clear_listeners();
    }

    pub(crate) fn has_listeners(&self) -> bool {
        self.inner.core.has_listeners()
    }

    fn wire<S, F>(&self, source: &S, listener: F) -> &Self
    where
        S: Source,
        F: Fn(&S::Payload) + Send + Sync + 'static,
    {
        let listener: Listener<S::Payload> = Arc::new(listener);
        self.inner.core.depend_on(source, listener);
        self
    }
}

impl<T: StateValue> Entity for State<T> {
    fn id(&self) -> EntityId {
        self.inner.core.id()
    }

    fn release(&self) {
        self.inner.core.release();
    }
}

impl<T: StateValue> Source for State<T> {
    type Payload = T;

    fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        self.inner.core.subscribe_listener(listener)
    }
}

impl<T: StateValue> Readable for State<T> {
    fn read(&self) -> T {
        self.get()
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for State<T>
where
    T: StateValue + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id())
            .field("value", &self.get())
            .field("previous", &self.get_previous())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
