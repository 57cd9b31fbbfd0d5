use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, join_all};
use tracing::debug;

use super::cache::{ErasedEntry, Fetcher, QueryEntry};
use super::config::{QueryConfig, QueryOptions};
use super::key::CacheKey;
use super::observer::QueryObserver;
use crate::error::Result;

/// Entries are scoped by key *and* data type, so two call sites decoding the same
/// endpoint into different types never see each other's values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryId {
    key: CacheKey,
    type_id: TypeId,
}

impl EntryId {
    fn of<V: 'static>(key: CacheKey) -> Self {
        Self {
            key,
            type_id: TypeId::of::<V>(),
        }
    }
}

/// A client for managing the query cache and invalidation.
///
/// The `QueryClient` is the central state manager for queries. It handles:
/// - Sharing one cache entry between observers of equal keys
/// - De-duplicating concurrent fetches of the same entry
/// - Invalidation by key prefix and garbage collection of unobserved entries
///
/// Clones share the same cache.
///
/// # Example
///
/// ```rust
/// use carrier::query::{QueryClient, QueryConfig};
/// use std::time::Duration;
///
/// let config = QueryConfig::new(
///     Duration::from_secs(30),  // stale_time
///     Duration::from_secs(300), // cache_time
/// );
///
/// let client = QueryClient::with_config(config);
/// assert!(client.is_empty());
/// ```
#[derive(Clone)]
pub struct QueryClient {
    entries: Arc<DashMap<EntryId, Arc<dyn ErasedEntry>>>,
    config: QueryConfig,
}

impl QueryClient {
    /// Creates a new query client with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    /// Creates a new query client with the given configuration.
    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            config,
        }
    }

    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Subscribes to `key`, creating its entry on first use.
    ///
    /// When the observer is enabled and the cached data is missing or stale, a fetch
    /// starts immediately (or the in-flight one is joined). Inside a Tokio runtime
    /// the fetch runs in the background; outside one it runs on the observer's first
    /// [`fetch`](QueryObserver::fetch) or [`refetch`](QueryObserver::refetch).
    ///
    /// # Example
    ///
    /// ```rust
    /// use carrier::cache_key;
    /// use carrier::query::{QueryClient, QueryOptions};
    /// use futures::FutureExt;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let client = QueryClient::new();
    /// let observer = client.observe(
    ///     cache_key!["notifications"],
    ///     || async { Ok(vec!["parcel picked up".to_string()]) }.boxed(),
    ///     QueryOptions::new(),
    /// );
    ///
    /// let result = observer.fetch().await;
    /// assert_eq!(result.data().map(Vec::len), Some(1));
    /// # }
    /// ```
    pub fn observe<V, F>(&self, key: CacheKey, fetcher: F, options: QueryOptions) -> QueryObserver<V>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<V>> + Send + Sync + 'static,
    {
        debug!(%key, enabled = options.enabled, "observing query");
        let entry = self.entry::<V>(key);
        let stale_time = options.stale_time.unwrap_or(self.config.stale_time);
        QueryObserver::attach(entry, Arc::new(fetcher), options.enabled, stale_time)
    }

    /// Returns fresh cached data for `key`, otherwise fetches it (joining any fetch
    /// already in flight) without creating an observer.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when no fresh data is cached and the fetch fails.
    pub async fn fetch_query<V, F>(&self, key: CacheKey, fetcher: F) -> Result<V>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> BoxFuture<'static, Result<V>> + Send + Sync + 'static,
    {
        let entry = self.entry::<V>(key);
        let snapshot = entry.snapshot();
        if let Some(data) = snapshot.data {
            if !snapshot.is_invalidated
                && snapshot
                    .updated_at
                    .is_some_and(|at| at.elapsed() < self.config.stale_time)
            {
                return Ok(data);
            }
        }

        let fetcher: Fetcher<V> = Arc::new(fetcher);
        entry.register(Arc::clone(&fetcher));
        entry.fetch_with(fetcher).await
    }

    /// Cached data for `key`, if any.
    pub fn get_query_data<V>(&self, key: &CacheKey) -> Option<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        let id = EntryId::of::<V>(key.clone());
        let erased = self.entries.get(&id)?.value().clone();
        let entry = erased.into_any().downcast::<QueryEntry<V>>().ok()?;
        entry.snapshot().data
    }

    /// Writes `data` into the cache as if it had just been fetched. Observers of
    /// `key` see the update immediately.
    pub fn set_query_data<V>(&self, key: CacheKey, data: V)
    where
        V: Clone + Send + Sync + 'static,
    {
        self.entry::<V>(key).set_data(data);
    }

    /// Marks every entry whose key starts with `prefix` as stale and refetches those
    /// with an enabled observer. Resolves once those refetches settle.
    ///
    /// Returns the number of matching entries.
    pub async fn invalidate(&self, prefix: &CacheKey) -> usize {
        let matching: Vec<Arc<dyn ErasedEntry>> = self
            .entries
            .iter()
            .filter(|entry| entry.value().key().starts_with(prefix))
            .map(|entry| entry.value().clone())
            .collect();

        let count = matching.len();
        let refetches: Vec<_> = matching
            .into_iter()
            .filter_map(|entry| entry.invalidate())
            .collect();
        debug!(%prefix, matched = count, refetching = refetches.len(), "invalidated queries");

        join_all(refetches).await;
        count
    }

    /// Drops every entry for `key`, whatever its data type. Existing observers keep
    /// their detached entry; new observers start fresh.
    pub fn remove(&self, key: &CacheKey) {
        self.entries.retain(|id, _| &id.key != key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops entries that have had no observer for at least
    /// [`QueryConfig::cache_time`] and are not fetching. Returns how many were
    /// removed.
    pub fn gc(&self) -> usize {
        let before = self.entries.len();
        let cache_time = self.config.cache_time;
        self.entries
            .retain(|_, entry| !entry.is_collectable(cache_time));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "collected unobserved queries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry<V>(&self, key: CacheKey) -> Arc<QueryEntry<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let id = EntryId::of::<V>(key.clone());
        let erased = self
            .entries
            .entry(id.clone())
            .or_insert_with(|| -> Arc<dyn ErasedEntry> { Arc::new(QueryEntry::<V>::new(key.clone())) })
            .value()
            .clone();

        match erased.into_any().downcast::<QueryEntry<V>>() {
            Ok(entry) => entry,
            Err(_) => {
                // Unreachable while ids carry the type; recover with a fresh entry.
                let entry = Arc::new(QueryEntry::<V>::new(key));
                self.entries.insert(id, entry.clone());
                entry
            }
        }
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::FutureExt;

    use super::*;
    use crate::cache_key;
    use crate::error::ApiError;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn fetch_value(
        calls: &Arc<AtomicUsize>,
        value: i32,
    ) -> impl Fn() -> BoxFuture<'static, Result<i32>> + Send + Sync + use<> {
        let calls = Arc::clone(calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[test]
    fn test_query_client_new() {
        let client = QueryClient::new();
        assert_eq!(client.len(), 0);
        assert_eq!(client.config().stale_time, Duration::from_secs(0));
    }

    #[test]
    fn test_query_client_with_config() {
        let config = QueryConfig::new(Duration::from_secs(30), Duration::from_secs(300));
        let client = QueryClient::with_config(config);
        assert_eq!(client.config().stale_time, Duration::from_secs(30));
        assert_eq!(client.config().cache_time, Duration::from_secs(300));
    }

    #[test]
    fn test_query_client_cache_operations() {
        let client = QueryClient::new();
        let key = cache_key!["key1"];

        assert!(client.get_query_data::<i32>(&key).is_none());

        client.set_query_data(key.clone(), 42);
        assert_eq!(client.get_query_data::<i32>(&key), Some(42));

        // Same key, different type: separate entry.
        assert!(client.get_query_data::<String>(&key).is_none());
        assert_eq!(client.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let client = QueryClient::new();
        client.set_query_data(cache_key!["a"], 1);
        client.set_query_data(cache_key!["a"], "one".to_string());
        client.set_query_data(cache_key!["b"], 2);
        assert_eq!(client.len(), 3);

        client.remove(&cache_key!["a"]);
        assert_eq!(client.len(), 1);

        client.clear();
        assert!(client.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_query_uses_fresh_cache() {
        let client = QueryClient::with_config(QueryConfig::new(
            Duration::from_secs(60),
            Duration::from_secs(300),
        ));
        let calls = counter();

        let first = client
            .fetch_query(cache_key!["n"], fetch_value(&calls, 5))
            .await;
        let second = client
            .fetch_query(cache_key!["n"], fetch_value(&calls, 6))
            .await;

        assert_eq!(first, Ok(5));
        assert_eq!(second, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_query_propagates_error() {
        let client = QueryClient::new();
        let result = client
            .fetch_query(cache_key!["broken"], || {
                async { Err::<i32, _>(ApiError::network("offline")) }.boxed()
            })
            .await;
        assert!(result.unwrap_err().is_network());
    }

    #[tokio::test]
    async fn test_observers_share_entry() {
        let client = QueryClient::new();
        let calls = counter();

        let a = client.observe(cache_key!["user", 1], fetch_value(&calls, 1), QueryOptions::new());
        let b = client.observe(cache_key!["user", 1], fetch_value(&calls, 1), QueryOptions::new());
        let (ra, rb) = tokio::join!(a.fetch(), b.fetch());

        assert_eq!(ra.data(), Some(&1));
        assert_eq!(rb.data(), Some(&1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_refetches_active_prefix_matches() {
        let client = QueryClient::new();
        let calls = counter();

        let booking = client.observe(cache_key!["booking", 1], fetch_value(&calls, 1), QueryOptions::new());
        let bids = client.observe(cache_key!["booking", 1, "bids"], fetch_value(&calls, 2), QueryOptions::new());
        let wallet = client.observe(cache_key!["wallet"], fetch_value(&calls, 3), QueryOptions::new());
        booking.fetch().await;
        bids.fetch().await;
        wallet.fetch().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let matched = client.invalidate(&cache_key!["booking"]).await;
        assert_eq!(matched, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(!booking.result().is_fetching());
    }

    #[tokio::test]
    async fn test_invalidate_skips_unobserved_entries() {
        let client = QueryClient::new();
        let calls = counter();

        {
            let observer = client.observe(cache_key!["feed"], fetch_value(&calls, 1), QueryOptions::new());
            observer.fetch().await;
        }

        assert_eq!(client.invalidate(&cache_key!["feed"]).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gc_drops_only_unobserved_entries() {
        let client = QueryClient::with_config(QueryConfig::new(Duration::ZERO, Duration::ZERO));
        let calls = counter();

        let kept = client.observe(cache_key!["kept"], fetch_value(&calls, 1), QueryOptions::new());
        kept.fetch().await;
        {
            let dropped = client.observe(cache_key!["dropped"], fetch_value(&calls, 2), QueryOptions::new());
            dropped.fetch().await;
        }

        assert_eq!(client.gc(), 1);
        assert_eq!(client.len(), 1);
        assert_eq!(client.get_query_data::<i32>(&cache_key!["kept"]), Some(1));
    }
}
