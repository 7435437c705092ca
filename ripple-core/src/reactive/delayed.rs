//! Delayed events: debounce and throttle.
//!
//! Both wrap an [`Event`] and defer or coalesce dispatches with a timer.
//! Each exposes a `pending` state that is `true` while a payload is waiting
//! for delivery. Releasing either one clears its timer and resets `pending`.
//!
//! Timers run on the ambient tokio runtime; dispatching outside one fails
//! with [`RippleError::NoRuntime`](crate::RippleError::NoRuntime).

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::entity::{Entity, Source};
use super::event::Event;
use super::middleware::{MiddlewareContext, Next};
use super::observable::Listener;
use super::state::State;
use super::subscriber::{EntityId, Subscription};
use super::timer::Timer;
use crate::error::{BoxError, Result};

// ----------------------------------------------------------------------------
// Debounce
// ----------------------------------------------------------------------------

struct DebouncedInner<T> {
    event: Event<T>,
    timeout: Duration,
    timer: Timer,
    pending: State<bool>,
}

/// Delivers only the last payload of a burst, `timeout` after it arrived.
pub struct DebouncedEvent<T> {
    inner: Arc<DebouncedInner<T>>,
}

impl<T: Send + Sync + 'static> DebouncedEvent<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(DebouncedInner {
                event: Event::new(),
                timeout,
                timer: Timer::new(),
                pending: State::new(false),
            }),
        }
    }

    /// Restart the timer with `payload` as the payload to deliver.
    pub fn dispatch(&self, payload: T) -> Result<()> {
        let inner: Weak<DebouncedInner<T>> = Arc::downgrade(&self.inner);
        self.inner.timer.arm(self.inner.timeout, move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Err(error) = inner.event.dispatch(payload) {
                tracing::warn!(event = %inner.event.id(), %error, "debounced dispatch failed");
            }
            // A listener may have dispatched again and re-armed the timer.
            if !inner.timer.is_armed() {
                inner.pending.set(false);
            }
        })?;
        self.inner.pending.set(true);
        Ok(())
    }

    /// `true` while a payload is waiting for the timer.
    pub fn pending(&self) -> State<bool> {
        self.inner.pending.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.get()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Number of delivered payloads.
    pub fn call_count(&self) -> u64 {
        self.inner.event.call_count()
    }

    pub fn apply_middleware<F>(&self, middleware: F) -> &Self
    where
        F: Fn(MiddlewareContext<T>, Next<T>) -> std::result::Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.inner.event.apply_middleware(middleware);
        self
    }
}

impl<T: Send + Sync + 'static> Entity for DebouncedEvent<T> {
    fn id(&self) -> EntityId {
        self.inner.event.id()
    }

    fn release(&self) {
        self.inner.timer.clear();
        self.inner.pending.set(false);
        self.inner.pending.release();
        self.inner.event.release();
    }
}

impl<T: Send + Sync + 'static> Source for DebouncedEvent<T> {
    type Payload = T;

    fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        self.inner.event.subscribe_listener(listener)
    }
}

impl<T> Clone for DebouncedEvent<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for DebouncedEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebouncedEvent")
            .field("event", &self.inner.event)
            .field("timeout", &self.inner.timeout)
            .field("armed", &self.inner.timer.is_armed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Throttle
// ----------------------------------------------------------------------------

struct Window<T> {
    cooling: bool,
    saved: Option<T>,
}

struct ThrottledInner<T> {
    event: Event<T>,
    timeout: Duration,
    timer: Timer,
    window: Mutex<Window<T>>,
    pending: State<bool>,
}

impl<T: Send + Sync + 'static> ThrottledInner<T> {
    fn dispatch(self: &Arc<Self>, payload: T) -> Result<()> {
        {
            let mut window = self.window.lock();
            if window.cooling {
                window.saved = Some(payload);
                drop(window);
                self.pending.set(true);
                return Ok(());
            }
            window.cooling = true;
        }

        if let Err(error) = self.event.dispatch(payload) {
            self.window.lock().cooling = false;
            return Err(error);
        }

        let inner: Weak<ThrottledInner<T>> = Arc::downgrade(self);
        let armed = self.timer.arm(self.timeout, move || {
            if let Some(inner) = inner.upgrade() {
                inner.cooldown_elapsed();
            }
        });
        if armed.is_err() {
            self.window.lock().cooling = false;
        }
        armed
    }

    fn cooldown_elapsed(self: &Arc<Self>) {
        let saved = {
            let mut window = self.window.lock();
            window.cooling = false;
            window.saved.take()
        };

        if let Some(payload) = saved {
            if let Err(error) = self.dispatch(payload) {
                tracing::warn!(event = %self.event.id(), %error, "throttled dispatch failed");
            }
        }
        if self.window.lock().saved.is_none() {
            self.pending.set(false);
        }
    }
}

/// Delivers the first payload of a window immediately and the last payload
/// received during the cooldown once it elapses.
pub struct ThrottledEvent<T> {
    inner: Arc<ThrottledInner<T>>,
}

impl<T: Send + Sync + 'static> ThrottledEvent<T> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ThrottledInner {
                event: Event::new(),
                timeout,
                timer: Timer::new(),
                window: Mutex::new(Window {
                    cooling: false,
                    saved: None,
                }),
                pending: State::new(false),
            }),
        }
    }

    /// Deliver now, or save `payload` for the end of the cooldown.
    pub fn dispatch(&self, payload: T) -> Result<()> {
        self.inner.dispatch(payload)
    }

    /// `true` while a saved payload is waiting for the cooldown to end.
    pub fn pending(&self) -> State<bool> {
        self.inner.pending.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.get()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Number of delivered payloads.
    pub fn call_count(&self) -> u64 {
        self.inner.event.call_count()
    }

    pub fn apply_middleware<F>(&self, middleware: F) -> &Self
    where
        F: Fn(MiddlewareContext<T>, Next<T>) -> std::result::Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.inner.event.apply_middleware(middleware);
        self
    }
}

impl<T: Send + Sync + 'static> Entity for ThrottledEvent<T> {
    fn id(&self) -> EntityId {
        self.inner.event.id()
    }

    fn release(&self) {
        self.inner.timer.clear();
        {
            let mut window = self.inner.window.lock();
            window.cooling = false;
            window.saved = None;
        }
        self.inner.pending.set(false);
        self.inner.pending.release();
        self.inner.event.release();
    }
}

impl<T: Send + Sync + 'static> Source for ThrottledEvent<T> {
    type Payload = T;

    fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        self.inner.event.subscribe_listener(listener)
    }
}

impl<T> Clone for ThrottledEvent<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for ThrottledEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottledEvent")
            .field("event", &self.inner.event)
            .field("timeout", &self.inner.timeout)
            .field("cooling", &self.inner.window.lock().cooling)
            .finish()
    }
}
