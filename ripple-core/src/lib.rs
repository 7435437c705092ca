//! Ripple Core
//!
//! This crate provides the core runtime for the Ripple reactive state
//! library. It implements:
//!
//! - Reactive primitives (states, computed states, events, reactions)
//! - Event middleware, debouncing and throttling
//! - Asynchronous effects with cancellation, and effect runners
//! - Persisted states and module registries
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Observables, entities and the synchronous primitives
//! - `effect`: Async effects, abort signals and retrying runners
//! - `persist`: States mirrored into a key-value storage
//! - `module`: Named groups of entities with bulk reset and release
//! - `error`: The crate error type
//!
//! Every entity is a cheap `Clone` handle; clones share identity, value and
//! listeners. Everything is `Send + Sync`. The asynchronous parts run on the
//! ambient tokio runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! use ripple_core::{ComputedState, Event, Source, State};
//!
//! let count = State::new(0);
//! let increment = Event::<i32>::new();
//! count.change_on_with(&increment, |step, current| current + step);
//!
//! let doubled = count.map(|count| count * 2);
//! doubled.subscribe(|value| println!("doubled: {value}"));
//!
//! increment.dispatch(5)?;
//! // prints "doubled: 10"
//! ```

pub mod effect;
pub mod error;
pub mod module;
pub mod persist;
pub mod reactive;

pub use effect::{
    AbortController, AbortSignal, Effect, EffectFailure, EffectOptions, EffectOutcome,
    EffectRunner, EffectStatus, Limits, Rejected, Resolved, RetryPolicy, RunReport, RunnerNotice,
};
pub use error::{BoxError, Result, RippleError, SharedError};
pub use module::{Module, Pending};
pub use persist::{MemoryStorage, PersistOptions, PersistState, Storage};
pub use reactive::{
    ComputedState, DebouncedEvent, Entity, EntityId, Event, MiddlewareContext, Next, Reaction,
    ReadGroup, Readable, Source, State, StateValue, Subscription, ThrottledEvent,
};
