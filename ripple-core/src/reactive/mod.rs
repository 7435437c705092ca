//! Reactive Primitives
//!
//! This module implements the synchronous core of Ripple: observables,
//! states, computed states, events and reactions.
//!
//! # Concepts
//!
//! ## Observables
//!
//! An [`Observable`] keeps an ordered set of listeners and notifies them in
//! subscription order. A panicking listener is logged and skipped; the rest
//! still run.
//!
//! ## Entities
//!
//! Every primitive is an [`Entity`]: it has an identity, it can depend on
//! other entities, and releasing it tears down its listeners and upstream
//! links. Handles are cheap clones of one shared entity.
//!
//! ## States
//!
//! A [`State`] holds a value and notifies only on real changes. A
//! [`ComputedState`] derives its value from other readable sources and
//! cannot be written to.
//!
//! ## Events
//!
//! An [`Event`] carries payloads through a middleware chain to its
//! subscribers. [`DebouncedEvent`] and [`ThrottledEvent`] defer delivery
//! with a timer.
//!
//! ## Reactions
//!
//! A [`Reaction`] batches changes of several sources into one delivery per
//! turn of the runtime.
//!
//! # Implementation Notes
//!
//! Dependencies are explicit. There is no ambient tracking context: an
//! entity depends on exactly the sources it was wired to, and every wire is
//! deduplicated by the upstream's [`EntityId`].

mod batch;
mod computed;
mod delayed;
mod entity;
mod event;
mod middleware;
mod observable;
mod reaction;
mod state;
mod subscriber;
mod timer;

pub(crate) use batch::Batch;
pub(crate) use timer::Timer;

pub use computed::{ComputedState, Freshness};
pub use delayed::{DebouncedEvent, ThrottledEvent};
pub use entity::{Dependencies, Entity, EntityCore, ReadGroup, Readable, Source};
pub use event::Event;
pub use middleware::{MiddlewareContext, MiddlewareFn, Next};
pub use observable::{Listener, Observable};
pub use reaction::Reaction;
pub use state::{State, StateValue};
pub use subscriber::{EntityId, SubscriberId, Subscription};
