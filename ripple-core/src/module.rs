//! Modules: named groups of entities.
//!
//! A [`Module`] creates entities through factory methods and remembers them,
//! so a whole feature can be reset or released at once. States created by a
//! module reset together with it; derived entities follow their sources.
//! Nested modules are named `parent:child` and are reset and released
//! before their parent's own entities.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Notify;

use crate::effect::{
    AbortSignal, Effect, EffectFailure, EffectOptions, EffectRunner, EffectValue, RetryPolicy,
};
use crate::persist::{PersistOptions, PersistState, Storage};
use crate::reactive::{
    ComputedState, DebouncedEvent, Entity, Event, Listener, ReadGroup, Reaction, Source, State,
    StateValue, Subscription, ThrottledEvent,
};

/// Something that can be waited on until it is no longer busy.
pub trait Pending: Send + Sync {
    fn is_pending(&self) -> bool;

    /// Call `listener` with every change of the pending flag.
    fn watch_pending(&self, listener: Listener<bool>) -> Subscription;
}

impl<P, R, E> Pending for Effect<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    fn is_pending(&self) -> bool {
        Effect::is_pending(self)
    }

    fn watch_pending(&self, listener: Listener<bool>) -> Subscription {
        self.pending().subscribe_listener(listener)
    }
}

impl<P, R, E> Pending for EffectRunner<P, R, E>
where
    P: EffectValue,
    R: EffectValue,
    E: EffectValue,
{
    fn is_pending(&self) -> bool {
        EffectRunner::is_pending(self)
    }

    fn watch_pending(&self, listener: Listener<bool>) -> Subscription {
        self.pending().subscribe_listener(listener)
    }
}

impl<T: Send + Sync + 'static> Pending for DebouncedEvent<T> {
    fn is_pending(&self) -> bool {
        DebouncedEvent::is_pending(self)
    }

    fn watch_pending(&self, listener: Listener<bool>) -> Subscription {
        self.pending().subscribe_listener(listener)
    }
}

impl<T: Send + Sync + 'static> Pending for ThrottledEvent<T> {
    fn is_pending(&self) -> bool {
        ThrottledEvent::is_pending(self)
    }

    fn watch_pending(&self, listener: Listener<bool>) -> Subscription {
        self.pending().subscribe_listener(listener)
    }
}

struct ModuleInner {
    name: String,
    reset_event: Event<()>,
    entities: Mutex<Vec<Arc<dyn Entity>>>,
    pending: Mutex<Vec<Arc<dyn Pending>>>,
    modules: Mutex<Vec<Module>>,
}

/// A named registry of entities.
///
/// ```rust,ignore
/// let cart = Module::new("cart");
/// let items = cart.state(Vec::<Item>::new());
/// let total = cart.computed((items.clone(),), |(items,)| sum(&items));
/// cart.reset();
/// ```
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ModuleInner {
                name: name.into(),
                reset_event: Event::new(),
                entities: Mutex::new(Vec::new()),
                pending: Mutex::new(Vec::new()),
                modules: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Create a nested module named `parent:child`.
    pub fn module(&self, name: &str) -> Module {
        let child = Module::new(format!("{}:{}", self.inner.name, name));
        self.inner.modules.lock().push(child.clone());
        child
    }

    /// Track an entity created elsewhere.
    pub fn register<X>(&self, entity: X) -> X
    where
        X: Entity + Clone + 'static,
    {
        self.inner.entities.lock().push(Arc::new(entity.clone()));
        entity
    }

    fn register_pending<X>(&self, entity: X) -> X
    where
        X: Entity + Pending + Clone + 'static,
    {
        self.inner.pending.lock().push(Arc::new(entity.clone()));
        self.register(entity)
    }

    pub fn state<T: StateValue>(&self, value: T) -> State<T> {
        let state = State::new(value);
        state.reset_on(&self.inner.reset_event);
        self.register(state)
    }

    pub fn persist_state<T>(&self, value: T, key: &str, storage: Arc<dyn Storage>) -> PersistState<T>
    where
        T: StateValue + Serialize + DeserializeOwned,
    {
        self.persist_state_with(value, key, storage, &PersistOptions::default())
    }

    pub fn persist_state_with<T>(
        &self,
        value: T,
        key: &str,
        storage: Arc<dyn Storage>,
        options: &PersistOptions,
    ) -> PersistState<T>
    where
        T: StateValue + Serialize + DeserializeOwned,
    {
        let state = PersistState::with_options(value, key, storage, options);
        state.reset_on(&self.inner.reset_event);
        self.register(state)
    }

    pub fn computed<T, G, F>(&self, sources: G, selector: F) -> ComputedState<T>
    where
        T: StateValue,
        G: ReadGroup,
        F: Fn(G::Values) -> T + Send + Sync + 'static,
    {
        self.register(ComputedState::new(sources, selector))
    }

    pub fn event<T: Send + Sync + 'static>(&self) -> Event<T> {
        self.register(Event::new())
    }

    pub fn debounced_event<T: Send + Sync + 'static>(&self, timeout: Duration) -> DebouncedEvent<T> {
        self.register_pending(DebouncedEvent::new(timeout))
    }

    pub fn throttled_event<T: Send + Sync + 'static>(&self, timeout: Duration) -> ThrottledEvent<T> {
        self.register_pending(ThrottledEvent::new(timeout))
    }

    pub fn effect<P, R, E, F, Fut>(&self, function: F) -> Effect<P, R, E>
    where
        P: EffectValue,
        R: EffectValue,
        E: EffectValue,
        F: Fn(P, AbortSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, EffectFailure<E>>> + Send + 'static,
    {
        self.effect_with_options(function, EffectOptions::default())
    }

    pub fn effect_with_options<P, R, E, F, Fut>(
        &self,
        function: F,
        options: EffectOptions,
    ) -> Effect<P, R, E>
    where
        P: EffectValue,
        R: EffectValue,
        E: EffectValue,
        F: Fn(P, AbortSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, EffectFailure<E>>> + Send + 'static,
    {
        self.register_pending(Effect::with_options(function, options))
    }

    pub fn effect_runner<P, R, E, Policy>(
        &self,
        effect: Effect<P, R, E>,
        policy: Policy,
    ) -> EffectRunner<P, R, E>
    where
        P: EffectValue,
        R: EffectValue,
        E: EffectValue,
        Policy: RetryPolicy<P, R, E> + 'static,
    {
        self.register_pending(EffectRunner::new(effect, policy))
    }

    pub fn reaction<G: ReadGroup>(&self, sources: G) -> Reaction<G> {
        self.register(Reaction::new(sources))
    }

    /// Reset nested modules, then every state this module created.
    pub fn reset(&self) {
        for module in self.children() {
            module.reset();
        }
        if let Err(error) = self.inner.reset_event.dispatch(()) {
            tracing::warn!(module = %self.inner.name, %error, "module reset failed");
        }
    }

    /// Release nested modules, then every entity this module created.
    pub fn release(&self) {
        for module in self.children() {
            module.release();
        }
        let entities = std::mem::take(&mut *self.inner.entities.lock());
        self.inner.pending.lock().clear();
        for entity in &entities {
            entity.release();
        }
        tracing::debug!(module = %self.inner.name, entities = entities.len(), "module released");
    }

    /// Resolves once no effect, runner or delayed event created by this
    /// module or a nested one is pending.
    pub async fn settled(&self) {
        loop {
            let watched = self.pending_entities();
            let wake = Arc::new(Notify::new());
            let subscriptions: Vec<Subscription> = watched
                .iter()
                .map(|entity| {
                    let wake = Arc::clone(&wake);
                    entity.watch_pending(Arc::new(move |pending: &bool| {
                        if !*pending {
                            wake.notify_one();
                        }
                    }))
                })
                .collect();

            let busy = watched.iter().any(|entity| entity.is_pending());
            if busy {
                wake.notified().await;
            }
            for subscription in &subscriptions {
                subscription.unsubscribe();
            }
            if !busy {
                return;
            }
        }
    }

    /// Number of entities registered directly in this module.
    pub fn entity_count(&self) -> usize {
        self.inner.entities.lock().len()
    }

    fn children(&self) -> Vec<Module> {
        self.inner.modules.lock().clone()
    }

    fn pending_entities(&self) -> Vec<Arc<dyn Pending>> {
        let mut entities = self.inner.pending.lock().clone();
        for module in self.children() {
            entities.extend(module.pending_entities());
        }
        entities
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.inner.name)
            .field("entities", &self.entity_count())
            .field("modules", &self.inner.modules.lock().len())
            .finish()
    }
}
