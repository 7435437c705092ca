//! Effect Implementation
//!
//! An Effect wraps an asynchronous unit of work and tracks its lifecycle.
//!
//! # How Effects Work
//!
//! 1. `run(params)` does its bookkeeping synchronously: with auto-cancel it
//!    aborts the run in flight, then it creates a fresh [`AbortSignal`],
//!    marks the effect pending, fires `started`, and calls the wrapped
//!    function.
//!
//! 2. The returned future awaits the wrapped function and settles the run:
//!
//!    - success: status becomes `Resolved`, `resolved` fires, subscribers
//!      are notified with [`EffectOutcome::Resolved`];
//!    - failure: status becomes `Rejected`, `rejected` fires, subscribers
//!      are notified with [`EffectOutcome::Rejected`], and the error is
//!      returned to the caller;
//!    - abort: only `aborted` fires. Status does not become `Rejected` and
//!      subscribers are not notified.
//!
//!    `finished` fires exactly once per run, whatever the outcome.
//!
//! 3. A run whose signal was aborted is settled as aborted even if the
//!    wrapped function later returns a value. Late results of superseded runs
//!    never reach subscribers.
//!
//! Dropping the future returned by `run` before it settles aborts that run.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::abort::{AbortController, AbortSignal};
use crate::error::{Result, RippleError};
use crate::reactive::{
    ComputedState, Entity, EntityCore, EntityId, Event, Listener, Source, State, Subscription,
};

/// Values that flow through an effect: parameters, results and errors.
pub trait EffectValue: Clone + Send + Sync + 'static {}

impl<T> EffectValue for T where T: Clone + Send + Sync + 'static {}

/// How a run failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectFailure<E> {
    /// The run was cancelled or superseded.
    #[error("effect run was aborted")]
    Aborted,

    /// The wrapped function failed.
    #[error("effect run failed: {0}")]
    Failed(E),
}

impl<E> EffectFailure<E> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// The error of a failed run.
    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Aborted => None,
            Self::Failed(error) => Some(error),
        }
    }
}

/// Lifecycle status of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    #[default]
    Idle,
    Pending,
    Resolved,
    Rejected,
}

/// Effect configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectOptions {
    /// Abort the run in flight whenever a new run starts.
    pub auto_cancel: bool,
}

impl EffectOptions {
    pub fn auto_cancel() -> Self {
        Self { auto_cancel: true }
    }
}

/// Payload of the `resolved` sub-event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<P, R> {
    pub params: P,
    pub result: R,
}

/// Payload of the `rejected` sub-event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected<P, E> {
    pub params: P,
    pub error: E,
}

/// Notification sent to an effect's own subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectOutcome<P, R, E> {
    Resolved(Resolved<P, R>),
    Rejected(Rejected<P, E>),
}

impl<P, R, E> EffectOutcome<P, R, E> {
    pub fn params(&self) -> &P {
        match self {
            Self::Resolved(resolved) => &resolved.params,
            Self::Rejected(rejected) => &rejected.params,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Future produced by the wrapped function.
pub type EffectFuture<R, E> = BoxFuture<'static, std::result::Result<R, EffectFailure<E>>>;

/// The wrapped function.
pub type EffectFn<P, R, E> = Arc<dyn Fn(P, AbortSignal) -> EffectFuture<R, E> + Send + Sync>;

fn boxed<P, R, E, F, Fut>(function: F) -> EffectFn<P, R, E>
where
    F: Fn(P, AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, EffectFailure<E>>> + Send + 'static,
{
    Arc::new(move |params, signal| -> EffectFuture<R, E> { Box::pin(function(params, signal)) })
}

#[derive(Default)]
struct Runs {
    next_id: u64,
    live: IndexMap<u64, AbortController>,
}

struct EffectInner<P, R, E> {
    core: EntityCore<EffectOutcome<P, R, E>>,
    function: Mutex<EffectFn<P, R, E>>,
    options: EffectOptions,
    runs: Mutex<Runs>,
    status: State<EffectStatus>,
    running_count: State<usize>,
    pending: ComputedState<bool>,
    started: Event<P>,
    resolved: Event<Resolved<P, R>>,
    rejected: Event<Rejected<P, E>>,
    aborted: Event<P>,
    finished: Event<P>,
}

impl<P, R, E> EffectInner<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    /// Register a new run, returning its id, its signal and the runs it
    /// supersedes.
    fn begin(&self) -> (u64, AbortSignal, Vec<AbortController>, usize) {
        let mut runs = self.runs.lock();
        let superseded: Vec<AbortController> = if self.options.auto_cancel {
            runs.live.drain(..).map(|(_, controller)| controller).collect()
        } else {
            Vec::new()
        };

        runs.next_id += 1;
        let id = runs.next_id;
        let controller = AbortController::new();
        let signal = controller.signal();
        runs.live.insert(id, controller);
        (id, signal, superseded, runs.live.len())
    }

    /// Remove a run from the live set. Returns whether it was still live and
    /// how many runs remain.
    fn end(&self, id: u64) -> (bool, usize) {
        let mut runs = self.runs.lock();
        let was_live = runs.live.shift_remove(&id).is_some();
        (was_live, runs.live.len())
    }

    fn emit<T: Send + Sync + 'static>(&self, event: &Event<T>, payload: T) {
        if let Err(error) = event.dispatch(payload) {
            tracing::warn!(effect = %self.core.id(), %error, "effect sub-event dispatch failed");
        }
    }

    fn settle(
        &self,
        id: u64,
        params: P,
        outcome: std::result::Result<R, EffectFailure<E>>,
    ) -> std::result::Result<R, EffectFailure<E>> {
        let (was_live, remaining) = self.end(id);
        if was_live {
            self.running_count.set(remaining);
        }

        let settled = match outcome {
            Ok(result) if was_live => {
                if remaining == 0 {
                    self.status.set(EffectStatus::Resolved);
                }
                tracing::debug!(effect = %self.core.id(), run = id, "effect resolved");
                self.emit(
                    &self.resolved,
                    Resolved {
                        params: params.clone(),
                        result: result.clone(),
                    },
                );
                self.core.notify(&EffectOutcome::Resolved(Resolved {
                    params: params.clone(),
                    result: result.clone(),
                }));
                Ok(result)
            }
            Err(EffectFailure::Failed(error)) if was_live => {
                if remaining == 0 {
                    self.status.set(EffectStatus::Rejected);
                }
                tracing::debug!(effect = %self.core.id(), run = id, "effect rejected");
                self.emit(
                    &self.rejected,
                    Rejected {
                        params: params.clone(),
                        error: error.clone(),
                    },
                );
                self.core.notify(&EffectOutcome::Rejected(Rejected {
                    params: params.clone(),
                    error: error.clone(),
                }));
                Err(EffectFailure::Failed(error))
            }
            _ => {
                if was_live && remaining == 0 {
                    self.status.set(EffectStatus::Idle);
                }
                tracing::debug!(effect = %self.core.id(), run = id, "effect aborted");
                self.emit(&self.aborted, params.clone());
                Err(EffectFailure::Aborted)
            }
        };

        self.emit(&self.finished, params);
        settled
    }

    fn cancel(&self) {
        let controllers: Vec<AbortController> = {
            let mut runs = self.runs.lock();
            runs.live.drain(..).map(|(_, controller)| controller).collect()
        };
        for controller in &controllers {
            controller.abort();
        }

        self.running_count.set(0);
        if self.status.get() == EffectStatus::Pending {
            self.status.set(EffectStatus::Idle);
        }
        if !controllers.is_empty() {
            tracing::debug!(effect = %self.core.id(), runs = controllers.len(), "effect cancelled");
        }
    }
}

/// Settles a run exactly once, even if its future is dropped early.
struct RunGuard<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    inner: Arc<EffectInner<P, R, E>>,
    id: u64,
    params: Option<P>,
}

impl<P, R, E> RunGuard<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    fn settle(
        mut self,
        outcome: std::result::Result<R, EffectFailure<E>>,
    ) -> std::result::Result<R, EffectFailure<E>> {
        match self.params.take() {
            Some(params) => self.inner.settle(self.id, params, outcome),
            None => Err(EffectFailure::Aborted),
        }
    }
}

impl<P, R, E> Drop for RunGuard<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    fn drop(&mut self) {
        let Some(params) = self.params.take() else {
            return;
        };

        tracing::debug!(effect = %self.inner.core.id(), run = self.id, "run dropped before settling");
        let controller = self.inner.runs.lock().live.get(&self.id).cloned();
        if let Some(controller) = controller {
            controller.abort();
        }
        let _ = self.inner.settle(self.id, params, Err(EffectFailure::Aborted));
    }
}

/// An asynchronous unit of work with lifecycle tracking.
///
/// ```rust,ignore
/// let fetch_user = Effect::new(|id: u64, signal: AbortSignal| async move {
///     api::user(id, signal).await.map_err(EffectFailure::Failed)
/// });
/// fetch_user.resolved().subscribe(|done| println!("{:?}", done.result));
/// fetch_user.run(7).await?;
/// ```
pub struct Effect<P, R, E> {
    inner: Arc<EffectInner<P, R, E>>,
}

impl<P, R, E> Effect<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    pub fn new<F, Fut>(function: F) -> Self
    where
        F: Fn(P, AbortSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, EffectFailure<E>>> + Send + 'static,
    {
        Self::with_options(function, EffectOptions::default())
    }

    pub fn with_options<F, Fut>(function: F, options: EffectOptions) -> Self
    where
        F: Fn(P, AbortSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, EffectFailure<E>>> + Send + 'static,
    {
        let running_count = State::new(0usize);
        let pending = running_count.map(|count| *count > 0);

        Self {
            inner: Arc::new(EffectInner {
                core: EntityCore::new(),
                function: Mutex::new(boxed(function)),
                options,
                runs: Mutex::new(Runs::default()),
                status: State::new(EffectStatus::Idle),
                running_count,
                pending,
                started: Event::new(),
                resolved: Event::new(),
                rejected: Event::new(),
                aborted: Event::new(),
                finished: Event::new(),
            }),
        }
    }

    /// Swap the wrapped function. Subscribers and runs in flight are kept.
    pub fn implement<F, Fut>(&self, function: F)
    where
        F: Fn(P, AbortSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, EffectFailure<E>>> + Send + 'static,
    {
        *self.inner.function.lock() = boxed(function);
    }

    /// Start a run.
    ///
    /// The bookkeeping described in the module docs happens before this
    /// returns; the returned future settles the run.
    pub fn run(
        &self,
        params: P,
    ) -> impl Future<Output = std::result::Result<R, EffectFailure<E>>> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        let (id, signal, superseded, live) = inner.begin();

        for controller in &superseded {
            controller.abort();
        }
        if !superseded.is_empty() {
            tracing::debug!(effect = %inner.core.id(), runs = superseded.len(), "superseded runs aborted");
        }

        inner.running_count.set(live);
        inner.status.set(EffectStatus::Pending);
        inner.emit(&inner.started, params.clone());

        let function = Arc::clone(&*inner.function.lock());
        let work = function(params.clone(), signal);
        let guard = RunGuard {
            inner,
            id,
            params: Some(params),
        };

        async move {
            let outcome = work.await;
            guard.settle(outcome)
        }
    }

    /// Start a run on the ambient tokio runtime.
    pub fn spawn(
        &self,
        params: P,
    ) -> Result<JoinHandle<std::result::Result<R, EffectFailure<E>>>> {
        let runtime = Handle::try_current().map_err(|_| RippleError::NoRuntime)?;
        Ok(runtime.spawn(self.run(params)))
    }

    /// Abort every run in flight and return to idle.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Start a run whenever `trigger` notifies, with its payload as params.
    pub fn on<S>(&self, trigger: &S) -> &Self
    where
        S: Source<Payload = P>,
    {
        self.on_with(trigger, P::clone)
    }

    /// Start a run whenever `trigger` notifies, with `map(payload)` as params.
    pub fn on_with<S, F>(&self, trigger: &S, map: F) -> &Self
    where
        S: Source,
        F: Fn(&S::Payload) -> P + Send + Sync + 'static,
    {
        let effect: Weak<EffectInner<P, R, E>> = Arc::downgrade(&self.inner);
        let listener: Listener<S::Payload> = Arc::new(move |payload: &S::Payload| {
            let Some(inner) = effect.upgrade() else {
                return;
            };
            if let Err(error) = (Effect { inner }).spawn(map(payload)) {
                tracing::warn!(%error, "triggered effect run could not start");
            }
        });
        self.inner.core.depend_on(trigger, listener);
        self
    }

    pub fn status(&self) -> EffectStatus {
        self.inner.status.get()
    }

    /// Status as a state, for wiring.
    pub fn status_state(&self) -> State<EffectStatus> {
        self.inner.status.clone()
    }

    /// `true` while at least one run is in flight.
    pub fn pending(&self) -> ComputedState<bool> {
        self.inner.pending.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.get()
    }

    pub fn running_count(&self) -> usize {
        self.inner.running_count.get()
    }

    pub fn options(&self) -> EffectOptions {
        self.inner.options
    }

    pub fn started(&self) -> &Event<P> {
        &self.inner.started
    }

    pub fn resolved(&self) -> &Event<Resolved<P, R>> {
        &self.inner.resolved
    }

    pub fn rejected(&self) -> &Event<Rejected<P, E>> {
        &self.inner.rejected
    }

    pub fn aborted(&self) -> &Event<P> {
        &self.inner.aborted
    }

    pub fn finished(&self) -> &Event<P> {
        &self.inner.finished
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.core.listener_count()
    }
}

impl<P, R, E> Entity for Effect<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    fn id(&self) -> EntityId {
        self.inner.core.id()
    }

    fn release(&self) {
        self.inner.cancel();
        self.inner.started.release();
        self.inner.resolved.release();
        self.inner.rejected.release();
        self.inner.aborted.release();
        self.inner.finished.release();
        // `pending` keeps following the run count so later runs still show.
        self.inner.pending.clear_listeners();
        self.inner.status.clear_listeners();
        self.inner.core.release();
    }
}

impl<P, R, E> Source for Effect<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    type Payload = EffectOutcome<P, R, E>;

    fn subscribe_listener(&self, listener: Listener<EffectOutcome<P, R, E>>) -> Subscription {
        self.inner.core.subscribe_listener(listener)
    }
}

impl<P, R, E> Clone for Effect<P, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R, E> fmt::Debug for Effect<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("status", &self.status())
            .field("running_count", &self.running_count())
            .field("options", &self.inner.options)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Failure = EffectFailure<String>;

    fn record<S>(source: &S) -> Arc<Mutex<Vec<S::Payload>>>
    where
        S: Source,
        S::Payload: Clone + Send,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        source.subscribe(move |payload: &S::Payload| seen_clone.lock().push(payload.clone()));
        seen
    }

    fn doubling() -> Effect<u32, u32, String> {
        Effect::new(|value: u32, _signal| async move { Ok::<_, Failure>(value * 2) })
    }

    #[tokio::test]
    async fn resolves_and_fires_lifecycle_events() {
        let effect = doubling();
        let started = record(effect.started());
        let resolved = record(effect.resolved());
        let finished = record(effect.finished());
        let outcomes = record(&effect);

        let run = effect.run(4);
        assert_eq!(effect.status(), EffectStatus::Pending);
        assert!(effect.is_pending());

        assert_eq!(run.await, Ok(8));
        assert_eq!(effect.status(), EffectStatus::Resolved);
        assert!(!effect.is_pending());
        assert_eq!(*started.lock(), vec![4]);
        assert_eq!(
            *resolved.lock(),
            vec![Resolved {
                params: 4,
                result: 8
            }]
        );
        assert_eq!(*finished.lock(), vec![4]);
        assert_eq!(outcomes.lock().len(), 1);
        assert!(outcomes.lock()[0].is_resolved());
    }

    #[tokio::test]
    async fn rejection_is_returned_and_notified() {
        let effect: Effect<(), (), String> =
            Effect::new(|_, _| async { Err::<(), _>(Failure::Failed("offline".into())) });
        let rejected = record(effect.rejected());
        let finished = record(effect.finished());
        let outcomes = record(&effect);

        let result = effect.run(()).await;
        assert_eq!(result, Err(Failure::Failed("offline".into())));
        assert_eq!(effect.status(), EffectStatus::Rejected);
        assert_eq!(rejected.lock()[0].error, "offline");
        assert_eq!(finished.lock().len(), 1);
        assert!(matches!(outcomes.lock()[0], EffectOutcome::Rejected(_)));
    }

    #[tokio::test]
    async fn auto_cancel_aborts_the_previous_run() {
        let signals = Arc::new(Mutex::new(Vec::new()));
        let signals_clone = signals.clone();
        let effect = Effect::with_options(
            move |value: u32, signal: AbortSignal| {
                signals_clone.lock().push(signal.clone());
                async move {
                    tokio::select! {
                        _ = signal.aborted() => Err(Failure::Aborted),
                        _ = tokio::time::sleep(Duration::from_millis(5)) => Ok(value),
                    }
                }
            },
            EffectOptions::auto_cancel(),
        );
        let resolved = record(effect.resolved());
        let aborted = record(effect.aborted());
        let finished = record(effect.finished());

        let first = effect.run(1);
        let second = effect.run(2);
        assert!(signals.lock()[0].is_aborted());
        assert!(!signals.lock()[1].is_aborted());
        assert_eq!(effect.running_count(), 1);

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first, Err(Failure::Aborted));
        assert_eq!(second, Ok(2));
        assert_eq!(resolved.lock().len(), 1);
        assert_eq!(resolved.lock()[0].params, 2);
        assert_eq!(*aborted.lock(), vec![1]);
        assert_eq!(finished.lock().len(), 2);
        assert_eq!(effect.status(), EffectStatus::Resolved);
    }

    #[tokio::test]
    async fn late_result_of_a_superseded_run_is_discarded() {
        let effect = Effect::with_options(
            |value: u32, _signal| async move {
                tokio::time::sleep(Duration::from_millis(u64::from(10 - value))).await;
                Ok::<_, Failure>(value)
            },
            EffectOptions::auto_cancel(),
        );
        let outcomes = record(&effect);

        let first = effect.run(1);
        let second = effect.run(9);
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, Err(Failure::Aborted));
        assert_eq!(second, Ok(9));
        assert_eq!(outcomes.lock().len(), 1);
        assert_eq!(*outcomes.lock()[0].params(), 9);
    }

    #[tokio::test]
    async fn cancel_aborts_and_returns_to_idle() {
        let effect: Effect<(), (), String> = Effect::new(|_, signal: AbortSignal| async move {
            signal.aborted().await;
            Err(Failure::Aborted)
        });
        let rejected = record(effect.rejected());
        let outcomes = record(&effect);

        let run = effect.run(());
        assert!(effect.is_pending());

        effect.cancel();
        assert!(!effect.is_pending());
        assert_eq!(effect.status(), EffectStatus::Idle);

        assert_eq!(run.await, Err(Failure::Aborted));
        assert!(rejected.lock().is_empty());
        assert!(outcomes.lock().is_empty());
        assert_eq!(effect.status(), EffectStatus::Idle);
    }

    #[tokio::test]
    async fn concurrent_runs_without_auto_cancel_all_settle() {
        let effect = doubling();
        let resolved = record(effect.resolved());

        let a = effect.run(1);
        let b = effect.run(2);
        assert_eq!(effect.running_count(), 2);

        let (a, b) = tokio::join!(a, b);
        assert_eq!((a, b), (Ok(2), Ok(4)));
        assert_eq!(resolved.lock().len(), 2);
        assert_eq!(effect.running_count(), 0);
    }

    #[tokio::test]
    async fn dropping_a_run_aborts_it() {
        let effect: Effect<u8, u8, String> = Effect::new(|value, _signal| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(value)
        });
        let aborted = record(effect.aborted());
        let finished = record(effect.finished());

        let run = effect.run(3);
        assert!(effect.is_pending());
        drop(run);

        assert!(!effect.is_pending());
        assert_eq!(*aborted.lock(), vec![3]);
        assert_eq!(*finished.lock(), vec![3]);
    }

    #[tokio::test]
    async fn implement_swaps_the_function() {
        let effect = doubling();
        let outcomes = record(&effect);

        effect.implement(|value: u32, _signal| async move { Ok::<_, Failure>(value + 1) });
        assert_eq!(effect.run(1).await, Ok(2));
        assert_eq!(outcomes.lock().len(), 1);
    }

    #[tokio::test]
    async fn on_runs_for_every_trigger() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let effect: Effect<u32, (), String> = Effect::new(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
        let trigger = Event::<&'static str>::new();
        effect.on_with(&trigger, |text| text.len() as u32);
        let finished = record(effect.finished());

        trigger.dispatch("four").unwrap();
        trigger.dispatch("fives").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(*finished.lock(), vec![4, 5]);
    }

    #[tokio::test]
    async fn release_cancels_and_detaches() {
        let effect: Effect<(), (), String> = Effect::new(|_, signal: AbortSignal| async move {
            signal.aborted().await;
            Err(Failure::Aborted)
        });
        let outcomes = record(&effect);
        let pending = record(&effect.pending());

        let run = effect.run(());
        effect.release();

        assert_eq!(run.await, Err(Failure::Aborted));
        assert_eq!(effect.subscriber_count(), 0);
        assert!(outcomes.lock().is_empty());
        assert_eq!(*pending.lock(), vec![true, false]);
        assert_eq!(effect.status(), EffectStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn released_effect_still_reports_pending() {
        let effect: Effect<(), (), String> = Effect::new(|_, _signal| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, Failure>(())
        });
        let pending = record(&effect.pending());
        effect.release();

        let run = effect.spawn(()).unwrap();
        assert!(effect.is_pending());
        assert_eq!(effect.status(), EffectStatus::Pending);

        run.await.unwrap().unwrap();
        assert!(!effect.is_pending());
        assert_eq!(effect.status(), EffectStatus::Resolved);
        assert!(pending.lock().is_empty());
    }
}

