//! Repeated effect execution.
//!
//! An [`EffectRunner`] runs an effect, counts its successes and failures,
//! and after every outcome asks a [`RetryPolicy`] whether to run again and
//! after how long. The runner notifies its subscribers once per start with a
//! [`RunnerNotice`] saying why it ended.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use super::effect::{Effect, EffectOutcome, EffectValue};
use crate::error::{Result, RippleError};
use crate::reactive::{
    Entity, EntityCore, EntityId, Listener, Source, State, Subscription, Timer,
};

/// Counters and the latest outcome, handed to a [`RetryPolicy`].
#[derive(Debug)]
pub struct RunReport<'a, P, R, E> {
    pub successes: u32,
    pub failures: u32,
    pub params: &'a P,
    pub result: Option<&'a R>,
    pub error: Option<&'a E>,
}

/// Why a runner stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerNotice {
    /// The policy asked to stop.
    Finished,
    /// The success ceiling was reached.
    SuccessLimit,
    /// The failure ceiling was reached.
    FailureLimit,
    /// [`EffectRunner::stop`] ended an active runner.
    Stopped,
}

/// Decides whether and when to run again.
pub trait RetryPolicy<P, R, E>: Send + Sync {
    /// Delay before the next run.
    fn delay(&self, report: &RunReport<'_, P, R, E>) -> Duration;

    /// `Continue` to run again, `Break(notice)` to end.
    fn check(&self, report: &RunReport<'_, P, R, E>) -> ControlFlow<RunnerNotice>;
}

/// Policy built from two closures. See [`until`].
pub struct Until<D, U> {
    delay: D,
    until: U,
}

/// Run again after `delay(report)` for as long as `keep_going(report)`
/// holds; end with [`RunnerNotice::Finished`] otherwise.
pub fn until<P, R, E, D, U>(delay: D, keep_going: U) -> Until<D, U>
where
    D: Fn(&RunReport<'_, P, R, E>) -> Duration + Send + Sync,
    U: Fn(&RunReport<'_, P, R, E>) -> bool + Send + Sync,
{
    Until {
        delay,
        until: keep_going,
    }
}

impl<P, R, E, D, U> RetryPolicy<P, R, E> for Until<D, U>
where
    D: Fn(&RunReport<'_, P, R, E>) -> Duration + Send + Sync,
    U: Fn(&RunReport<'_, P, R, E>) -> bool + Send + Sync,
{
    fn delay(&self, report: &RunReport<'_, P, R, E>) -> Duration {
        (self.delay)(report)
    }

    fn check(&self, report: &RunReport<'_, P, R, E>) -> ControlFlow<RunnerNotice> {
        if (self.until)(report) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(RunnerNotice::Finished)
        }
    }
}

/// Policy with success and failure ceilings and a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// End after this many successes.
    pub successes: Option<u32>,
    /// End after this many failures.
    pub failures: Option<u32>,
    pub delay: Duration,
}

impl<P, R, E> RetryPolicy<P, R, E> for Limits {
    fn delay(&self, _report: &RunReport<'_, P, R, E>) -> Duration {
        self.delay
    }

    fn check(&self, report: &RunReport<'_, P, R, E>) -> ControlFlow<RunnerNotice> {
        if self.successes.is_some_and(|limit| report.successes >= limit) {
            return ControlFlow::Break(RunnerNotice::SuccessLimit);
        }
        if self.failures.is_some_and(|limit| report.failures >= limit) {
            return ControlFlow::Break(RunnerNotice::FailureLimit);
        }
        ControlFlow::Continue(())
    }
}

struct Counters<P> {
    successes: u32,
    failures: u32,
    /// Params given to `start`; every rerun uses them.
    params: Option<P>,
    watching: Option<Subscription>,
}

impl<P> Default for Counters<P> {
    fn default() -> Self {
        Self {
            successes: 0,
            failures: 0,
            params: None,
            watching: None,
        }
    }
}

struct RunnerInner<P, R, E> {
    core: EntityCore<RunnerNotice>,
    effect: Effect<P, R, E>,
    policy: Box<dyn RetryPolicy<P, R, E>>,
    timer: Timer,
    counters: Mutex<Counters<P>>,
    pending: State<bool>,
}

impl<P, R, E> RunnerInner<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    /// Drop the timer and the outcome subscription, and zero the counters.
    fn reset(&self) {
        self.timer.clear();
        let watching = {
            let mut counters = self.counters.lock();
            counters.successes = 0;
            counters.failures = 0;
            counters.params = None;
            counters.watching.take()
        };
        if let Some(subscription) = watching {
            subscription.unsubscribe();
        }
    }

    fn outcome(self: &Arc<Self>, outcome: &EffectOutcome<P, R, E>) {
        let (successes, failures, started_with) = {
            let mut counters = self.counters.lock();
            match outcome {
                EffectOutcome::Resolved(_) => counters.successes += 1,
                EffectOutcome::Rejected(_) => counters.failures += 1,
            }
            (counters.successes, counters.failures, counters.params.clone())
        };

        let (result, error) = match outcome {
            EffectOutcome::Resolved(resolved) => (Some(&resolved.result), None),
            EffectOutcome::Rejected(rejected) => (None, Some(&rejected.error)),
        };
        let report = RunReport {
            successes,
            failures,
            params: outcome.params(),
            result,
            error,
        };

        match self.policy.check(&report) {
            ControlFlow::Break(notice) => self.end(notice),
            ControlFlow::Continue(()) => {
                let delay = self.policy.delay(&report);
                let params = started_with.unwrap_or_else(|| outcome.params().clone());
                let runner: Weak<Self> = Arc::downgrade(self);
                let armed = self.timer.arm(delay, move || {
                    let Some(runner) = runner.upgrade() else {
                        return;
                    };
                    if let Err(error) = runner.effect.spawn(params) {
                        tracing::warn!(runner = %runner.core.id(), %error, "rerun failed to start");
                        runner.end(RunnerNotice::Finished);
                    }
                });
                match armed {
                    Ok(()) => {
                        tracing::debug!(runner = %self.core.id(), ?delay, successes, failures, "rerun scheduled");
                    }
                    Err(error) => {
                        tracing::warn!(runner = %self.core.id(), %error, "rerun could not be scheduled");
                        self.end(RunnerNotice::Finished);
                    }
                }
            }
        }
    }

    fn end(&self, notice: RunnerNotice) {
        self.timer.clear();
        let watching = self.counters.lock().watching.take();
        if let Some(subscription) = watching {
            subscription.unsubscribe();
        }

        tracing::debug!(runner = %self.core.id(), ?notice, "runner ended");
        self.core.notify(&notice);
        self.pending.set(false);
    }
}

/// Runs an effect repeatedly under a [`RetryPolicy`].
///
/// ```rust,ignore
/// let poll = EffectRunner::new(fetch_status.clone(), Limits {
///     successes: Some(5),
///     failures: Some(3),
///     delay: Duration::from_secs(1),
/// });
/// poll.subscribe(|notice| println!("polling ended: {notice:?}"));
/// poll.start(job_id)?;
/// ```
pub struct EffectRunner<P, R, E> {
    inner: Arc<RunnerInner<P, R, E>>,
}

impl<P, R, E> EffectRunner<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    pub fn new<Policy>(effect: Effect<P, R, E>, policy: Policy) -> Self
    where
        Policy: RetryPolicy<P, R, E> + 'static,
    {
        Self {
            inner: Arc::new(RunnerInner {
                core: EntityCore::new(),
                effect,
                policy: Box::new(policy),
                timer: Timer::new(),
                counters: Mutex::new(Counters::default()),
                pending: State::new(false),
            }),
        }
    }

    /// Reset the counters and run the effect with `params` now.
    ///
    /// Starting an active runner restarts it.
    pub fn start(&self, params: P) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| RippleError::NoRuntime)?;
        self.inner.reset();
        self.inner.counters.lock().params = Some(params.clone());
        self.inner.pending.set(true);

        let runner: Weak<RunnerInner<P, R, E>> = Arc::downgrade(&self.inner);
        let watching = self.inner.effect.subscribe(move |outcome: &EffectOutcome<P, R, E>| {
            if let Some(runner) = runner.upgrade() {
                runner.outcome(outcome);
            }
        });
        self.inner.counters.lock().watching = Some(watching);

        tracing::debug!(runner = %self.inner.core.id(), "runner started");
        runtime.spawn(self.inner.effect.run(params));
        Ok(())
    }

    /// End an active runner with [`RunnerNotice::Stopped`], cancelling the
    /// effect. Stopping an idle runner does nothing.
    pub fn stop(&self) {
        self.inner.reset();
        if !self.inner.pending.get() {
            return;
        }
        self.inner.effect.cancel();
        self.inner.end(RunnerNotice::Stopped);
    }

    /// Start whenever `trigger` notifies, with its payload as params.
    pub fn on<S>(&self, trigger: &S) -> &Self
    where
        S: Source<Payload = P>,
    {
        self.on_with(trigger, P::clone)
    }

    /// Start whenever `trigger` notifies, with `map(payload)` as params.
    pub fn on_with<S, F>(&self, trigger: &S, map: F) -> &Self
    where
        S: Source,
        F: Fn(&S::Payload) -> P + Send + Sync + 'static,
    {
        let runner: Weak<RunnerInner<P, R, E>> = Arc::downgrade(&self.inner);
        let listener: Listener<S::Payload> = Arc::new(move |payload: &S::Payload| {
            let Some(inner) = runner.upgrade() else {
                return;
            };
            if let Err(error) = (EffectRunner { inner }).start(map(payload)) {
                tracing::warn!(%error, "triggered runner could not start");
            }
        });
        self.inner.core.depend_on(trigger, listener);
        self
    }

    /// `true` between a start and its terminal notice.
    pub fn pending(&self) -> State<bool> {
        self.inner.pending.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.get()
    }

    pub fn success_count(&self) -> u32 {
        self.inner.counters.lock().successes
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.counters.lock().failures
    }

    pub fn effect(&self) -> &Effect<P, R, E> {
        &self.inner.effect
    }
}

impl<P, R, E> Entity for EffectRunner<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    fn id(&self) -> EntityId {
        self.inner.core.id()
    }

    fn release(&self) {
        self.stop();
        self.inner.pending.release();
        self.inner.core.release();
    }
}

impl<P, R, E> Source for EffectRunner<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    type Payload = RunnerNotice;

    fn subscribe_listener(&self, listener: Listener<RunnerNotice>) -> Subscription {
        self.inner.core.subscribe_listener(listener)
    }
}

impl<P, R, E> Clone for EffectRunner<P, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, R, E> fmt::Debug for EffectRunner<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRunner")
            .field("id", &self.id())
            .field("pending", &self.is_pending())
            .field("successes", &self.success_count())
            .field("failures", &self.failure_count())
            .finish()
    }
}
