//! Event Implementation
//!
//! An Event represents a discrete occurrence carrying a payload. Dispatching
//! runs the middleware chain in registration order and then notifies
//! listeners with whatever payload came out of the chain.
//!
//! The call count increments once per successful dispatch, after the chain
//! and before listeners run. A payload vetoed or rejected by middleware is
//! not counted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::entity::{Entity, EntityCore, Source};
use super::middleware::{run_chain, Chain, Middleware, MiddlewareContext, Next, Terminal};
use super::observable::Listener;
use super::subscriber::{EntityId, Subscription};
use crate::error::{BoxError, Result, SharedError};

struct EventInner<T> {
    core: EntityCore<T>,
    calls: AtomicU64,
    middlewares: Mutex<Chain<T>>,
}

impl<T: Send + Sync + 'static> EventInner<T> {
    fn dispatch(self: &Arc<Self>, payload: T) -> Result<()> {
        let chain = Arc::clone(&*self.middlewares.lock());
        let event = Arc::downgrade(self);
        let terminal: Terminal<T> = Arc::new(move |value: T| {
            if let Some(event) = event.upgrade() {
                event.calls.fetch_add(1, Ordering::SeqCst);
                event.core.notify(&value);
            }
        });

        run_chain(chain, 0, terminal, MiddlewareContext::new(payload))?;
        Ok(())
    }
}

/// A discrete occurrence with a payload.
///
/// Clones share listeners, middleware and the call counter.
///
/// ```rust,ignore
/// let clicked = Event::<u32>::new();
/// clicked.subscribe(|x| println!("clicked at {x}"));
/// clicked.dispatch(12)?;
/// ```
pub struct Event<T> {
    inner: Arc<EventInner<T>>,
}

impl<T: Send + Sync + 'static> Event<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                core: EntityCore::new(),
                calls: AtomicU64::new(0),
                middlewares: Mutex::new(Arc::new(Vec::new())),
            }),
        }
    }

    /// Run the middleware chain and notify listeners.
    ///
    /// Fails only when a middleware fails without a registered error event.
    pub fn dispatch(&self, payload: T) -> Result<()> {
        self.inner.dispatch(payload)
    }

    /// Append a middleware. Failures propagate to `dispatch` callers.
    pub fn apply_middleware<F>(&self, middleware: F) -> &Self
    where
        F: Fn(MiddlewareContext<T>, Next<T>) -> std::result::Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.push_middleware(Middleware::new(Arc::new(middleware), None))
    }

    /// Append a middleware whose failures are dispatched to `error_event`
    /// instead of the caller.
    pub fn apply_middleware_with<F>(&self, middleware: F, error_event: &Event<SharedError>) -> &Self
    where
        F: Fn(MiddlewareContext<T>, Next<T>) -> std::result::Result<(), BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.push_middleware(Middleware::new(
            Arc::new(middleware),
            Some(error_event.clone()),
        ))
    }

    /// Number of successful dispatches.
    pub fn call_count(&self) -> u64 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Number of listeners.
    pub fn subscriber_count(&self) -> usize {
        self.inner.core.listener_count()
    }

    /// Re-dispatch every payload of `upstream`.
    pub fn on<S>(&self, upstream: &S) -> &Self
    where
        S: Source<Payload = T>,
        T: Clone,
    {
        self.on_with(upstream, T::clone)
    }

    /// Re-dispatch `map(payload)` for every payload of `upstream`.
    pub fn on_with<S, F>(&self, upstream: &S, map: F) -> &Self
    where
        S: Source,
        F: Fn(&S::Payload) -> T + Send + Sync + 'static,
    {
        let event: Weak<EventInner<T>> = Arc::downgrade(&self.inner);
        let listener: Listener<S::Payload> = Arc::new(move |payload: &S::Payload| {
            if let Some(event) = event.upgrade() {
                if let Err(error) = event.dispatch(map(payload)) {
                    tracing::warn!(event = %event.core.id(), %error, "forwarded dispatch failed");
                }
            }
        });
        self.inner.core.depend_on(upstream, listener);
        self
    }

    fn push_middleware(&self, middleware: Middleware<T>) -> &Self {
        let mut chain = self.inner.middlewares.lock();
        let mut next = Vec::clone(&chain);
        next.push(middleware);
        *chain = Arc::new(next);
        self
    }
}

impl<T: Send + Sync + 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Entity for Event<T> {
    fn id(&self) -> EntityId {
        self.inner.core.id()
    }

    fn release(&self) {
        self.inner.core.release();
    }
}

impl<T: Send + Sync + 'static> Source for Event<T> {
    type Payload = T;

    fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        self.inner.core.subscribe_listener(listener)
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.inner.core.id())
            .field("calls", &self.inner.calls.load(Ordering::SeqCst))
            .field("middlewares", &self.inner.middlewares.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RippleError;
    use std::sync::atomic::AtomicUsize;

    fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        (seen, move |value: &T| seen_clone.lock().push(value.clone()))
    }

    #[test]
    fn dispatch_notifies_and_counts() {
        let event = Event::<i32>::new();
        let (seen, listener) = recorder::<i32>();
        event.subscribe(listener);

        event.dispatch(1).unwrap();
        event.dispatch(2).unwrap();

        assert_eq!(*seen.lock(), vec![1, 2]);
        assert_eq!(event.call_count(), 2);
    }

    #[test]
    fn middleware_runs_in_order_and_sees_previous_changes() {
        let event = Event::<String>::new();
        event
            .apply_middleware(|mut ctx, next| {
                ctx.value.push('a');
                next.run(ctx)
            })
            .apply_middleware(|mut ctx, next| {
                ctx.value.push('b');
                next.run(ctx)
            });
        let (seen, listener) = recorder::<String>();
        event.subscribe(listener);

        event.dispatch(String::from(">")).unwrap();
        assert_eq!(*seen.lock(), vec![String::from(">ab")]);
    }

    #[test]
    fn middleware_that_skips_next_vetoes_silently() {
        let event = Event::<i32>::new();
        event.apply_middleware(|ctx, next| {
            if ctx.value < 0 {
                return Ok(());
            }
            next.run(ctx)
        });
        let (seen, listener) = recorder::<i32>();
        event.subscribe(listener);

        event.dispatch(-1).unwrap();
        event.dispatch(3).unwrap();

        assert_eq!(*seen.lock(), vec![3]);
        assert_eq!(event.call_count(), 1);
    }

    #[test]
    fn unrouted_middleware_error_reaches_the_caller() {
        let event = Event::<i32>::new();
        event.apply_middleware(|_, _| Err("invalid payload".into()));
        let (seen, listener) = recorder::<i32>();
        event.subscribe(listener);

        let error = event.dispatch(1).unwrap_err();
        assert!(matches!(error, RippleError::Middleware(_)));
        assert!(seen.lock().is_empty());
        assert_eq!(event.call_count(), 0);
    }

    #[test]
    fn routed_middleware_error_goes_to_error_event() {
        let errors = Event::<SharedError>::new();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let messages_clone = messages.clone();
        errors.subscribe(move |error: &SharedError| messages_clone.lock().push(error.to_string()));

        let event = Event::<i32>::new();
        event.apply_middleware_with(
            |ctx, next| {
                if ctx.value == 0 {
                    return Err("zero is not allowed".into());
                }
                next.run(ctx)
            },
            &errors,
        );
        let (seen, listener) = recorder::<i32>();
        event.subscribe(listener);

        event.dispatch(0).unwrap();
        event.dispatch(2).unwrap();

        assert_eq!(*messages.lock(), vec![String::from("zero is not allowed")]);
        assert_eq!(*seen.lock(), vec![2]);
        assert_eq!(event.call_count(), 1);
    }

    #[test]
    fn downstream_error_bubbles_to_upstream_error_event() {
        let errors = Event::<SharedError>::new();
        let routed = Arc::new(AtomicUsize::new(0));
        let routed_clone = routed.clone();
        errors.subscribe(move |_| {
            routed_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        let event = Event::<i32>::new();
        event
            .apply_middleware_with(|ctx, next| next.run(ctx), &errors)
            .apply_middleware(|_, _| Err("late failure".into()));

        event.dispatch(1).unwrap();
        assert_eq!(routed.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(event.call_count(), 0);
    }

    #[test]
    fn on_forwards_upstream_payloads_once() {
        let source = Event::<i32>::new();
        let target = Event::<String>::new();
        target
            .on_with(&source, |value| value.to_string())
            .on_with(&source, |value| format!("dup {value}"));
        let (seen, listener) = recorder::<String>();
        target.subscribe(listener);

        source.dispatch(7).unwrap();
        assert_eq!(*seen.lock(), vec![String::from("7")]);
    }

    #[test]
    fn listeners_may_dispatch_reentrantly() {
        let event = Event::<u32>::new();
        let handle = event.clone();
        let (seen, listener) = recorder::<u32>();
        event.subscribe(move |value: &u32| {
            if *value < 3 {
                handle.dispatch(value + 1).unwrap();
            }
        });
        event.subscribe(listener);

        event.dispatch(0).unwrap();
        assert_eq!(*seen.lock(), vec![3, 2, 1, 0]);
        assert_eq!(event.call_count(), 4);
    }

    #[test]
    fn release_drops_listeners_and_upstream_links() {
        let source = Event::<i32>::new();
        let target = Event::<i32>::new();
        target.on(&source);
        target.subscribe(|_| {});

        target.release();
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(target.subscriber_count(), 0);
    }
}
