//! Persisted state.
//!
//! A [`PersistState`] is a [`State`] mirrored into a key-value [`Storage`].
//! On construction it adopts the stored value, if one decodes; afterwards
//! every change is written back once per turn of the runtime.
//!
//! Values are stored as JSON wrapped in a one-field envelope, `{"_": value}`,
//! under `key_prefix + key`.

use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::RippleError;
use crate::reactive::{
    Batch, ComputedState, Entity, EntityId, Listener, Readable, Source, State, StateValue,
    Subscription,
};

/// Key-value backend for persisted states.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process storage. Clones share entries.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistOptions {
    /// Prepended to every storage key.
    pub key_prefix: String,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            key_prefix: "ripple-".to_owned(),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(rename = "_")]
    value: T,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    #[serde(rename = "_")]
    value: &'a T,
}

struct PersistInner<T> {
    state: State<T>,
    key: String,
    storage: Arc<dyn Storage>,
    batch: Batch,
    writer: Mutex<Option<Subscription>>,
}

impl<T> PersistInner<T>
where
    T: StateValue + Serialize + DeserializeOwned,
{
    fn load(&self) {
        let Some(raw) = self.storage.get(&self.key) else {
            return;
        };
        match serde_json::from_str::<Envelope<T>>(&raw) {
            Ok(envelope) => self.state.set(envelope.value),
            Err(source) => {
                let error = RippleError::InvalidPersistedValue {
                    key: self.key.clone(),
                    source,
                };
                tracing::error!(%error, "keeping default value");
            }
        }
    }

    fn schedule_write(self: &Arc<Self>) {
        let inner: Weak<Self> = Arc::downgrade(self);
        self.batch.schedule(move || {
            if let Some(inner) = inner.upgrade() {
                inner.write();
            }
        });
    }

    fn write(&self) {
        let value = self.state.get();
        match serde_json::to_string(&EnvelopeRef { value: &value }) {
            Ok(json) => {
                tracing::trace!(key = %self.key, "writing persisted state");
                self.storage.set(&self.key, json);
            }
            Err(source) => {
                let error = RippleError::Serialize {
                    key: self.key.clone(),
                    source,
                };
                tracing::error!(%error, "persisted state not written");
            }
        }
    }
}

/// A state mirrored into a [`Storage`].
///
/// ```rust,ignore
/// let storage = Arc::new(MemoryStorage::new());
/// let theme = PersistState::new("light".to_string(), "theme", storage);
/// theme.set("dark".to_string());
/// ```
pub struct PersistState<T> {
    inner: Arc<PersistInner<T>>,
}

impl<T> PersistState<T>
where
    T: StateValue + Serialize + DeserializeOwned,
{
    pub fn new(value: T, key: &str, storage: Arc<dyn Storage>) -> Self {
        Self::with_options(value, key, storage, &PersistOptions::default())
    }

    pub fn with_options(
        value: T,
        key: &str,
        storage: Arc<dyn Storage>,
        options: &PersistOptions,
    ) -> Self {
        let inner = Arc::new(PersistInner {
            state: State::new(value),
            key: format!("{}{}", options.key_prefix, key),
            storage,
            batch: Batch::new(),
            writer: Mutex::new(None),
        });
        inner.load();

        let weak: Weak<PersistInner<T>> = Arc::downgrade(&inner);
        let writer = inner.state.subscribe(move |_: &T| {
            if let Some(inner) = weak.upgrade() {
                inner.schedule_write();
            }
        });
        *inner.writer.lock() = Some(writer);

        Self { inner }
    }

    /// Full storage key, prefix included.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Remove the stored entry. The in-memory value is kept.
    pub fn clear_storage(&self) {
        self.inner.storage.remove(&self.inner.key);
    }

    /// The underlying state.
    pub fn as_state(&self) -> &State<T> {
        &self.inner.state
    }

    pub fn get(&self) -> T {
        self.inner.state.get()
    }

    pub fn get_previous(&self) -> T {
        self.inner.state.get_previous()
    }

    pub fn set(&self, value: T) {
        self.inner.state.set(value);
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.inner.state.update(f);
    }

    /// Return to the construction value, which is then persisted.
    pub fn reset(&self) {
        self.inner.state.reset();
    }

    pub fn change_on<S>(&self, source: &S) -> &Self
    where
        S: Source<Payload = T>,
    {
        self.inner.state.change_on(source);
        self
    }

    pub fn change_on_with<S, F>(&self, source: &S, map: F) -> &Self
    where
        S: Source,
        F: Fn(&S::Payload, &T) -> T + Send + Sync + 'static,
    {
        self.inner.state.change_on_with(source, map);
        self
    }

    pub fn reset_on<S>(&self, source: &S) -> &Self
    where
        S: Source,
    {
        self.inner.state.reset_on(source);
        self
    }

    pub fn map<U, F>(&self, f: F) -> ComputedState<U>
    where
        U: StateValue,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.inner.state.map(f)
    }
}

impl<T> Entity for PersistState<T>
where
    T: StateValue + Serialize + DeserializeOwned,
{
    fn id(&self) -> EntityId {
        self.inner.state.id()
    }

    fn release(&self) {
        if let Some(writer) = self.inner.writer.lock().take() {
            writer.unsubscribe();
        }
        self.inner.state.release();
    }
}

impl<T> Source for PersistState<T>
where
    T: StateValue + Serialize + DeserializeOwned,
{
    type Payload = T;

    fn subscribe_listener(&self, listener: Listener<T>) -> Subscription {
        self.inner.state.subscribe_listener(listener)
    }
}

impl<T> Readable for PersistState<T>
where
    T: StateValue + Serialize + DeserializeOwned,
{
    fn read(&self) -> T {
        self.get()
    }
}

impl<T> Clone for PersistState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for PersistState<T>
where
    T: StateValue + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistState")
            .field("key", &self.inner.key)
            .field("state", &self.inner.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn storage() -> (MemoryStorage, Arc<dyn Storage>) {
        let storage = MemoryStorage::new();
        let shared: Arc<dyn Storage> = Arc::new(storage.clone());
        (storage, shared)
    }

    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        writes: AtomicUsize,
    }

    impl CountingStorage {
        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl Storage for CountingStorage {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: String) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value);
        }

        fn remove(&self, key: &str) {
            self.inner.remove(key);
        }
    }

    #[test]
    fn adopts_a_stored_value() {
        let (backend, shared) = storage();
        backend.set("ripple-count", r#"{"_":41}"#.to_owned());

        let count = PersistState::new(0, "count", shared);
        assert_eq!(count.get(), 41);
        assert_eq!(count.key(), "ripple-count");
    }

    #[test]
    fn invalid_stored_value_keeps_the_default() {
        let (backend, shared) = storage();
        backend.set("ripple-count", "not json".to_owned());

        let count = PersistState::new(7, "count", shared);
        assert_eq!(count.get(), 7);
    }

    #[tokio::test]
    async fn writes_back_once_per_turn() {
        let (backend, shared) = storage();
        let name = PersistState::new("ada".to_string(), "name", shared);
        assert!(backend.get("ripple-name").is_none());

        name.set("grace".to_string());
        name.set("barbara".to_string());
        tokio::task::yield_now().await;

        assert_eq!(
            backend.get("ripple-name").as_deref(),
            Some(r#"{"_":"barbara"}"#)
        );
    }

    #[tokio::test]
    async fn synchronous_commits_share_one_write() {
        let counting = Arc::new(CountingStorage::default());
        let name = PersistState::new("ada".to_string(), "name", counting.clone());
        assert_eq!(counting.writes(), 0);

        name.set("grace".to_string());
        name.set("barbara".to_string());
        tokio::task::yield_now().await;
        assert_eq!(counting.writes(), 1);

        name.set("hedy".to_string());
        tokio::task::yield_now().await;
        assert_eq!(counting.writes(), 2);
        assert_eq!(
            counting.get("ripple-name").as_deref(),
            Some(r#"{"_":"hedy"}"#)
        );
    }

    #[test]
    fn custom_prefix_and_clear() {
        let (backend, shared) = storage();
        let options = PersistOptions {
            key_prefix: "app/".to_owned(),
        };
        let flag = PersistState::with_options(false, "flag", shared, &options);

        flag.set(true);
        assert_eq!(backend.get("app/flag").as_deref(), Some(r#"{"_":true}"#));

        flag.clear_storage();
        assert!(backend.is_empty());
        assert!(flag.get());
    }

    #[test]
    fn reset_persists_the_construction_value() {
        let (backend, shared) = storage();
        backend.set("ripple-level", r#"{"_":3}"#.to_owned());

        let level = PersistState::new(1u8, "level", shared);
        level.reset();

        assert_eq!(level.get(), 1);
        assert_eq!(backend.get("ripple-level").as_deref(), Some(r#"{"_":1}"#));
    }

    #[test]
    fn release_stops_writing() {
        let (backend, shared) = storage();
        let count = PersistState::new(0, "count", shared);
        count.release();

        count.set(5);
        assert!(backend.get("ripple-count").is_none());
    }

    #[test]
    fn options_default_from_empty_config() {
        let options: PersistOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, PersistOptions::default());
    }
}
