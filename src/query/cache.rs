use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tracing::{debug, trace};

use super::key::CacheKey;
use crate::error::{ApiError, Result};
use crate::lock;

pub(crate) type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V>> + Send + Sync>;

pub(crate) type InFlight<V> = Shared<BoxFuture<'static, Result<V>>>;

/// The observable state of one cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Last successfully fetched data. Survives failed refetches.
    pub data: Option<T>,
    /// Error of the most recent fetch, cleared by the next success.
    pub error: Option<ApiError>,
    /// When `data` was last written.
    pub updated_at: Option<Instant>,
    pub is_fetching: bool,
    /// Set by invalidation; forces staleness regardless of age.
    pub is_invalidated: bool,
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            updated_at: None,
            is_fetching: false,
            is_invalidated: false,
        }
    }
}

impl<T> CacheEntry<T> {
    /// Checks if this entry is stale based on the given stale time.
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.is_invalidated
            || self
                .updated_at
                .map_or(true, |at| at.elapsed() >= stale_time)
    }

    /// Stores fresh data, clearing any error and invalidation.
    pub fn record_success(&mut self, data: T) {
        self.data = Some(data);
        self.error = None;
        self.updated_at = Some(Instant::now());
        self.is_invalidated = false;
    }

    /// Records a failed fetch. Previously fetched data is kept.
    pub fn record_failure(&mut self, error: ApiError) {
        self.error = Some(error);
    }
}

/// One keyed entry: shared state, the in-flight fetch, and observer bookkeeping.
pub(crate) struct QueryEntry<V> {
    key: CacheKey,
    state: watch::Sender<CacheEntry<V>>,
    fetcher: Mutex<Option<Fetcher<V>>>,
    in_flight: Mutex<Option<InFlight<V>>>,
    observers: AtomicUsize,
    active: AtomicUsize,
    released_at: Mutex<Instant>,
}

impl<V> QueryEntry<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(key: CacheKey) -> Self {
        let (state, _) = watch::channel(CacheEntry::default());
        Self {
            key,
            state,
            fetcher: Mutex::new(None),
            in_flight: Mutex::new(None),
            observers: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            released_at: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn key(&self) -> &CacheKey {
        &self.key
    }

    pub(crate) fn snapshot(&self) -> CacheEntry<V> {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<CacheEntry<V>> {
        self.state.subscribe()
    }

    /// Makes `fetcher` the one used by invalidation-driven refetches. Latest wins.
    pub(crate) fn register(&self, fetcher: Fetcher<V>) {
        *lock(&self.fetcher) = Some(fetcher);
    }

    pub(crate) fn set_data(&self, data: V) {
        self.state.send_modify(|entry| entry.record_success(data));
    }

    /// Starts a fetch with `fetcher`, or joins the one already in flight.
    ///
    /// At most one fetch per entry runs at a time. When a Tokio runtime is available
    /// the fetch is driven by a spawned task, so it completes and updates the cache
    /// even if every caller stops waiting.
    pub(crate) fn fetch_with(self: &Arc<Self>, fetcher: Fetcher<V>) -> InFlight<V> {
        let mut slot = lock(&self.in_flight);
        if let Some(existing) = slot.as_ref() {
            trace!(key = %self.key, "joining in-flight fetch");
            return existing.clone();
        }

        debug!(key = %self.key, "fetching");
        self.state.send_modify(|entry| entry.is_fetching = true);

        let entry = Arc::clone(self);
        let shared = async move {
            let result = fetcher().await;
            entry.settle(&result);
            result
        }
        .boxed()
        .shared();
        *slot = Some(shared.clone());
        drop(slot);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(shared.clone().map(|_| ()));
        }

        shared
    }

    fn settle(&self, result: &Result<V>) {
        // Held until the state is published, so a fetch started right after this
        // cannot have its `is_fetching` cleared by us.
        let mut slot = lock(&self.in_flight);
        slot.take();
        self.state.send_modify(|entry| {
            entry.is_fetching = false;
            match result {
                Ok(data) => entry.record_success(data.clone()),
                Err(e) => entry.record_failure(e.clone()),
            }
        });
        drop(slot);

        if let Err(e) = result {
            debug!(key = %self.key, error = %e, "fetch failed");
        }
    }

    pub(crate) fn attach(&self, active: bool) {
        self.observers.fetch_add(1, Ordering::SeqCst);
        if active {
            self.active.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn detach(&self, active: bool) {
        if active {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        if self.observers.fetch_sub(1, Ordering::SeqCst) == 1 {
            *lock(&self.released_at) = Instant::now();
        }
    }

    pub(crate) fn set_active(&self, active: bool) {
        if active {
            self.active.fetch_add(1, Ordering::SeqCst);
        } else {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.load(Ordering::SeqCst)
    }
}

/// Type-erased view of a [`QueryEntry`] so entries of different data types can
/// live in one map.
pub(crate) trait ErasedEntry: Send + Sync {
    fn key(&self) -> &CacheKey;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Marks the entry stale. If an enabled observer is attached, starts (or joins)
    /// a refetch and returns it.
    fn invalidate(self: Arc<Self>) -> Option<BoxFuture<'static, ()>>;

    /// Unobserved, idle, and released for at least `cache_time`.
    fn is_collectable(&self, cache_time: Duration) -> bool;
}

impl<V> ErasedEntry for QueryEntry<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn key(&self) -> &CacheKey {
        &self.key
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn invalidate(self: Arc<Self>) -> Option<BoxFuture<'static, ()>> {
        self.state.send_modify(|entry| entry.is_invalidated = true);

        if self.active.load(Ordering::SeqCst) == 0 {
            return None;
        }

        let fetcher = lock(&self.fetcher).clone()?;
        Some(self.fetch_with(fetcher).map(|_| ()).boxed())
    }

    fn is_collectable(&self, cache_time: Duration) -> bool {
        self.observer_count() == 0
            && !self.state.borrow().is_fetching
            && lock(&self.released_at).elapsed() >= cache_time
    }
}
