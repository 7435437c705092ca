//! Event middleware.
//!
//! A middleware sees the payload before any listener does. It receives an
//! owned [`MiddlewareContext`] and a [`Next`] continuation, and may:
//!
//! - rewrite `context.value` and pass it on with `next.run(context)`,
//! - drop it by returning `Ok(())` without calling `next`,
//! - fail by returning an error.
//!
//! A failure is routed to the error event registered with the failing
//! middleware, if any, and the chain stops. Without an error event the
//! failure propagates to whoever called `dispatch`. Because each middleware
//! wraps everything downstream of it, an error that a later middleware did
//! not route bubbles up through earlier ones and may be routed by them.

use std::fmt;
use std::sync::Arc;

use super::event::Event;
use crate::error::{BoxError, SharedError};

/// Mutable view of a payload travelling through the middleware chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareContext<T> {
    pub value: T,
}

impl<T> MiddlewareContext<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

/// Signature of a middleware function.
pub type MiddlewareFn<T> =
    Arc<dyn Fn(MiddlewareContext<T>, Next<T>) -> Result<(), BoxError> + Send + Sync>;

pub(crate) type Terminal<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A middleware and its optional error sink.
pub(crate) struct Middleware<T> {
    handler: MiddlewareFn<T>,
    error_event: Option<Event<SharedError>>,
}

impl<T> Middleware<T> {
    pub(crate) fn new(handler: MiddlewareFn<T>, error_event: Option<Event<SharedError>>) -> Self {
        Self {
            handler,
            error_event,
        }
    }
}

impl<T> Clone for Middleware<T> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            error_event: self.error_event.clone(),
        }
    }
}

pub(crate) type Chain<T> = Arc<Vec<Middleware<T>>>;

/// Continuation handed to each middleware.
pub struct Next<T> {
    chain: Chain<T>,
    index: usize,
    terminal: Terminal<T>,
}

impl<T: 'static> Next<T> {
    /// Hand the context to the rest of the chain.
    pub fn run(self, context: MiddlewareContext<T>) -> Result<(), BoxError> {
        run_chain(self.chain, self.index, self.terminal, context)
    }
}

impl<T> fmt::Debug for Next<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.chain.len().saturating_sub(self.index))
            .finish()
    }
}

/// Run middleware `index..` and finally `terminal`.
pub(crate) fn run_chain<T: 'static>(
    chain: Chain<T>,
    index: usize,
    terminal: Terminal<T>,
    context: MiddlewareContext<T>,
) -> Result<(), BoxError> {
    let Some(middleware) = chain.get(index).cloned() else {
        terminal(context.value);
        return Ok(());
    };

    let next = Next {
        chain,
        index: index + 1,
        terminal,
    };

    let error = match (middleware.handler)(context, next) {
        Ok(()) => return Ok(()),
        Err(error) => error,
    };

    match middleware.error_event {
        Some(error_event) => {
            tracing::warn!(middleware = index, %error, "middleware failed, routing to error event");
            let shared: SharedError = Arc::from(error);
            if let Err(nested) = error_event.dispatch(shared) {
                tracing::error!(%nested, "error event rejected a middleware failure");
            }
            Ok(())
        }
        None => Err(error),
    }
}
