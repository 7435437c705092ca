//! Entities and dependency wiring.
//!
//! An entity is an observable with an identity that can also *depend* on
//! other entities: it can be told to run a callback whenever an upstream
//! entity notifies. Each (entity, upstream) pair is linked at most once,
//! keyed by the upstream's [`EntityId`], so wiring the same upstream twice
//! never doubles the notification fan-out.
//!
//! Listeners that refer back to the downstream entity hold a `Weak`
//! reference, so an upstream never keeps a downstream alive.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::observable::{Listener, Observable};
use super::subscriber::{EntityId, Subscription};

/// Common surface of every reactive entity.
pub trait Entity: Send + Sync {
    /// Identity of this entity, shared by all clones of the handle.
    fn id(&self) -> EntityId;

    /// Tear down every dependency link and drop every listener.
    ///
    /// Safe to call more than once.
    fn release(&self);
}

/// An entity that notifies listeners with a payload.
pub trait Source: Entity {
    /// Payload delivered to listeners.
    type Payload: 'static;

    /// Register a shared listener.
    fn subscribe_listener(&self, listener: Listener<Self::Payload>) -> Subscription;

    /// Register a listener closure.
    fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Self::Payload) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_listener(Arc::new(listener))
    }
}

/// A source whose current value can be read at any time.
pub trait Readable: Source + Clone + 'static {
    /// Read the current value.
    fn read(&self) -> Self::Payload;
}

/// A fixed group of readable sources, read and watched together.
///
/// Implemented for tuples of up to six [`Readable`]s and for `Vec<S>`.
pub trait ReadGroup: Clone + Send + Sync + 'static {
    /// The values of every member, in order.
    type Values: 'static;

    /// Read every member.
    fn read_all(&self) -> Self::Values;

    /// Call `callback` whenever any member notifies.
    fn watch_all(&self, callback: Arc<dyn Fn() + Send + Sync>) -> Vec<Subscription>;
}

fn watcher<T: 'static>(callback: &Arc<dyn Fn() + Send + Sync>) -> Listener<T> {
    let callback = Arc::clone(callback);
    Arc::new(move |_: &T| callback())
}

macro_rules! impl_read_group {
    ($($name:ident . $idx:tt),+) => {
        impl<$($name: Readable),+> ReadGroup for ($($name,)+) {
            type Values = ($($name::Payload,)+);

            fn read_all(&self) -> Self::Values {
                ($(self.$idx.read(),)+)
            }

            fn watch_all(&self, callback: Arc<dyn Fn() + Send + Sync>) -> Vec<Subscription> {
                vec![$(self.$idx.subscribe_listener(watcher(&callback)),)+]
            }
        }
    };
}

impl_read_group!(A.0);
impl_read_group!(A.0, B.1);
impl_read_group!(A.0, B.1, C.2);
impl_read_group!(A.0, B.1, C.2, D.3);
impl_read_group!(A.0, B.1, C.2, D.3, E.4);
impl_read_group!(A.0, B.1, C.2, D.3, E.4, F.5);

impl<S: Readable> ReadGroup for Vec<S> {
    type Values = Vec<S::Payload>;

    fn read_all(&self) -> Self::Values {
        self.iter().map(Readable::read).collect()
    }

    fn watch_all(&self, callback: Arc<dyn Fn() + Send + Sync>) -> Vec<Subscription> {
        self.iter()
            .map(|source| source.subscribe_listener(watcher(&callback)))
            .collect()
    }
}

/// Upstream links owned by an entity, keyed by upstream identity.
#[derive(Default)]
pub struct Dependencies {
    links: Mutex<IndexMap<EntityId, Subscription>>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to `upstream` unless it is already linked.
    ///
    /// Returns `false` when the link already existed.
    pub fn link<S>(&self, upstream: &S, listener: Listener<S::Payload>) -> bool
    where
        S: Source + ?Sized,
    {
        let mut links = self.links.lock();
        let key = upstream.id();
        if links.contains_key(&key) {
            return false;
        }

        let subscription = upstream.subscribe_listener(listener);
        links.insert(key, subscription);
        true
    }

    /// Remove a single link.
    pub fn unlink(&self, upstream: EntityId) -> bool {
        let removed = self.links.lock().shift_remove(&upstream);
        match removed {
            Some(subscription) => {
                subscription.unsubscribe();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, upstream: EntityId) -> bool {
        self.links.lock().contains_key(&upstream)
    }

    pub fn len(&self) -> usize {
        self.links.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.lock().is_empty()
    }

    /// Unsubscribe from every upstream.
    pub fn release(&self) {
        let links = std::mem::take(&mut *self.links.lock());
        for subscription in links.values() {
            subscription.unsubscribe();
        }
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("upstreams", &self.links.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Identity, listeners and upstream links shared by every entity kind.
pub struct EntityCore<T> {
    id: EntityId,
    observable: Observable<T>,
    dependencies: Dependencies,
}

impl<T: 'static> EntityCore<T> {
    pub fn new() -> Self {
        Self {
            id: EntityId::next(),
            observable: Observable::new(),
            dependencies: Dependencies::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        self.observable.subscribe_listener(listener)
    }

    pub fn notify(&self, payload: &T) {
        self.observable.notify(payload);
    }

    pub fn has_listeners(&self) -> bool {
        self.observable.has_listeners()
    }

    pub fn listener_count(&self) -> usize {
        self.observable.listener_count()
    }

    /// Wire a callback to `upstream`; a no-op if already wired.
    pub fn depend_on<S>(&self, upstream: &S, listener: Listener<S::Payload>) -> bool
    where
        S: Source + ?Sized,
    {
        let linked = self.dependencies.link(upstream, listener);
        if !linked {
            tracing::trace!(entity = %self.id, upstream = %upstream.id(), "already wired");
        }
        linked
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Drop every listener but keep the upstream links.
    pub fn clear_listeners(&self) {
        self.observable.clear();
    }

    pub fn release(&self) {
        self.dependencies.release();
        self.observable.clear();
    }
}

impl<T: 'static> Default for EntityCore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EntityCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCore")
            .field("id", &self.id)
            .field("observable", &self.observable)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}
