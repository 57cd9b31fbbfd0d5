use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

use super::cache::{CacheEntry, Fetcher, QueryEntry};
use super::key::CacheKey;
use crate::error::ApiError;

/// Coarse lifecycle of a query as seen by one observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// The observer is disabled; nothing is fetched or reported.
    Idle,
    /// No data has been fetched yet.
    Pending,
    /// The last fetch succeeded.
    Success,
    /// The last fetch failed. Earlier data, if any, is still available.
    Error,
}

/// A point-in-time view of a query.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub status: QueryStatus,
    /// Last successfully fetched data, kept across failed refetches.
    pub data: Option<T>,
    /// Error of the most recent fetch.
    pub error: Option<ApiError>,
    /// A fetch (first load or background refetch) is in flight.
    pub is_fetching: bool,
    pub is_stale: bool,
    pub updated_at: Option<Instant>,
}

impl<T> QueryResult<T> {
    /// The result reported by a disabled observer.
    pub const fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_fetching: false,
            is_stale: false,
            updated_at: None,
        }
    }

    pub(crate) fn from_entry(entry: &CacheEntry<T>, stale_time: Duration) -> Self
    where
        T: Clone,
    {
        let status = if entry.error.is_some() {
            QueryStatus::Error
        } else if entry.data.is_some() {
            QueryStatus::Success
        } else {
            QueryStatus::Pending
        };

        Self {
            status,
            data: entry.data.clone(),
            error: entry.error.clone(),
            is_fetching: entry.is_fetching,
            is_stale: entry.data.is_some() && entry.is_stale(stale_time),
            updated_at: entry.updated_at,
        }
    }

    /// Returns the data if any fetch has succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub const fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Returns `true` during the first fetch, while there is no data to show.
    pub const fn is_loading(&self) -> bool {
        self.is_fetching && self.data.is_none()
    }

    /// Returns `true` during any fetch, including background refetches.
    pub const fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.status, QueryStatus::Success)
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.status, QueryStatus::Error)
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self.status, QueryStatus::Idle)
    }

    /// Returns `true` if the data is due for revalidation.
    pub const fn is_stale(&self) -> bool {
        self.is_stale
    }
}

/// A subscriber to one cache entry.
///
/// Created by [`QueryClient::observe`](super::QueryClient::observe). Observers of
/// structurally equal keys share the entry and its in-flight fetch. Dropping the
/// last observer makes the entry eligible for [`QueryClient::gc`](super::QueryClient::gc).
pub struct QueryObserver<V>
where
    V: Clone + Send + Sync + 'static,
{
    entry: Arc<QueryEntry<V>>,
    fetcher: Fetcher<V>,
    enabled: Arc<AtomicBool>,
    stale_time: Duration,
}

impl<V> QueryObserver<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn attach(
        entry: Arc<QueryEntry<V>>,
        fetcher: Fetcher<V>,
        enabled: bool,
        stale_time: Duration,
    ) -> Self {
        entry.attach(enabled);
        entry.register(Arc::clone(&fetcher));

        let observer = Self {
            entry,
            fetcher,
            enabled: Arc::new(AtomicBool::new(enabled)),
            stale_time,
        };
        if enabled {
            observer.start_if_needed();
        }
        observer
    }

    pub fn key(&self) -> &CacheKey {
        self.entry.key()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// The current state, without waiting.
    pub fn result(&self) -> QueryResult<V> {
        if !self.is_enabled() {
            return QueryResult::idle();
        }
        QueryResult::from_entry(&self.entry.snapshot(), self.stale_time)
    }

    /// Serves fresh cached data, otherwise fetches (joining any fetch in flight).
    pub async fn fetch(&self) -> QueryResult<V> {
        if !self.needs_fetch() {
            return self.result();
        }
        self.refetch().await
    }

    /// Forces a fetch regardless of freshness. Calls made while a fetch is in flight
    /// join it instead of issuing another request.
    ///
    /// A failed refetch keeps the previous data and sets the error.
    pub async fn refetch(&self) -> QueryResult<V> {
        if !self.is_enabled() {
            return QueryResult::idle();
        }
        // Failures are recorded in the entry and reported through the result.
        let _ = self.entry.fetch_with(Arc::clone(&self.fetcher)).await;
        self.result()
    }

    /// Enables or disables the observer. Enabling starts a fetch when the cached
    /// data is missing or stale.
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) == enabled {
            return;
        }
        self.entry.set_active(enabled);
        if enabled {
            self.start_if_needed();
        }
    }

    /// A stream of results: the current one first, then one per entry change.
    pub fn watch(&self) -> BoxStream<'static, QueryResult<V>> {
        let enabled = Arc::clone(&self.enabled);
        let stale_time = self.stale_time;

        WatchStream::new(self.entry.subscribe())
            .map(move |entry| {
                if enabled.load(Ordering::SeqCst) {
                    QueryResult::from_entry(&entry, stale_time)
                } else {
                    QueryResult::idle()
                }
            })
            .boxed()
    }

    fn needs_fetch(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let entry = self.entry.snapshot();
        entry.data.is_none() || entry.is_stale(self.stale_time)
    }

    /// Starts a background fetch. Without a Tokio runtime nothing could drive it,
    /// so the fetch waits for the first `fetch`/`refetch` instead.
    fn start_if_needed(&self) {
        if tokio::runtime::Handle::try_current().is_err() {
            trace!(key = %self.key(), "no runtime, deferring fetch");
            return;
        }
        if self.needs_fetch() {
            drop(self.entry.fetch_with(Arc::clone(&self.fetcher)));
        }
    }
}

impl<V> Drop for QueryObserver<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.entry.detach(self.is_enabled());
    }
}

impl<V> fmt::Debug for QueryObserver<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", self.key())
            .field("enabled", &self.is_enabled())
            .field("stale_time", &self.stale_time)
            .finish_non_exhaustive()
    }
}
