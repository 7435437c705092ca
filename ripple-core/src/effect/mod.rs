//! Asynchronous Effects
//!
//! This module wraps asynchronous work in reactive entities.
//!
//! # Concepts
//!
//! ## Effects
//!
//! An [`Effect`] runs a user-supplied async function and exposes its
//! lifecycle as reactive values: a status, a pending flag, a running count,
//! and sub-events for start, success, failure, abort and completion. With
//! auto-cancel enabled a new run aborts the previous one and the late result
//! of a superseded run is discarded.
//!
//! ## Cancellation
//!
//! Every run receives an [`AbortSignal`]. Cancellation is cooperative: the
//! wrapped function observes the signal and returns
//! [`EffectFailure::Aborted`].
//!
//! ## Runners
//!
//! An [`EffectRunner`] re-runs an effect under a [`RetryPolicy`] until the
//! policy says stop, then notifies a single [`RunnerNotice`].

mod abort;
#[allow(clippy::module_inception)]
mod effect;
mod runner;

pub use abort::{AbortController, AbortSignal};
pub use effect::{
    Effect, EffectFailure, EffectFn, EffectFuture, EffectOptions, EffectOutcome, EffectStatus,
    EffectValue, Rejected, Resolved,
};
pub use runner::{until, EffectRunner, Limits, RetryPolicy, RunReport, RunnerNotice, Until};
