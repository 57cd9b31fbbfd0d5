//! Queries and mutations bound to one REST backend and one session.
//!
//! [`Api`] is what screens hold. It ties an [`ApiClient`] to a [`QueryClient`] and
//! an injected [`SessionReader`], and offers two explicitly named flavours of each
//! operation:
//!
//! - [`Api::query`] and [`Api::mutation`] never send a token.
//! - [`Api::authenticated_query`] and [`Api::authenticated_mutation`] read the
//!   token from the session immediately before every request. A missing token
//!   sends no `Authorization` header; the server decides what that means.
//!
//! Tokens are never captured when an observer or mutation is created, so login and
//! logout take effect on the next request without rebuilding anything.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::query::{CacheKey, Mutation, QueryClient, QueryObserver, QueryOptions};
use crate::session::SessionReader;
use crate::transport::{FetchOptions, Method, RequestDescriptor, Response};

/// The data layer entry point. Clones share the client, cache and session.
#[derive(Clone)]
pub struct Api {
    client: ApiClient,
    queries: QueryClient,
    session: Arc<dyn SessionReader>,
}

impl Api {
    pub fn new(client: ApiClient, session: Arc<dyn SessionReader>) -> Self {
        Self {
            client,
            queries: QueryClient::new(),
            session,
        }
    }

    /// Builds an [`Api`] backed by an HTTP transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns a request error if the HTTP client cannot be constructed.
    pub fn from_config(config: &ClientConfig, session: Arc<dyn SessionReader>) -> Result<Self> {
        Ok(Self::new(ApiClient::from_config(config)?, session))
    }

    /// Replaces the query cache, e.g. to share one across several backends or to
    /// apply a non-default [`QueryConfig`](crate::query::QueryConfig).
    #[must_use]
    pub fn with_query_client(mut self, queries: QueryClient) -> Self {
        self.queries = queries;
        self
    }

    pub const fn client(&self) -> &ApiClient {
        &self.client
    }

    /// The cache, for invalidation and direct reads.
    pub const fn queries(&self) -> &QueryClient {
        &self.queries
    }

    pub fn session(&self) -> &Arc<dyn SessionReader> {
        &self.session
    }

    /// Observes `GET path` under `key`, decoding the body into `T`. No token is sent.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use carrier::api::Api;
    /// use carrier::cache_key;
    /// use carrier::client::ApiClient;
    /// use carrier::query::QueryOptions;
    /// use carrier::session::SessionStore;
    /// use carrier::transport::FetchOptions;
    /// use carrier::transport::mock::MockTransport;
    /// use serde_json::json;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let mock = MockTransport::json(200, json!(["Lagos", "Abuja"]));
    /// let client = ApiClient::new("https://api.example.com", Arc::new(mock));
    /// let api = Api::new(client, Arc::new(SessionStore::new()));
    ///
    /// let cities = api.query::<Vec<String>>(
    ///     cache_key!["cities"],
    ///     "/cities",
    ///     FetchOptions::new(),
    ///     QueryOptions::new(),
    /// );
    /// assert_eq!(cities.fetch().await.data().map(Vec::len), Some(2));
    /// # }
    /// ```
    pub fn query<T>(
        &self,
        key: CacheKey,
        path: impl Into<String>,
        fetch_options: FetchOptions,
        options: QueryOptions,
    ) -> QueryObserver<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.observe(key, path.into(), fetch_options, options, None)
    }

    /// Like [`Api::query`], but every fetch carries the session token current at
    /// the moment the fetch starts.
    pub fn authenticated_query<T>(
        &self,
        key: CacheKey,
        path: impl Into<String>,
        fetch_options: FetchOptions,
        options: QueryOptions,
    ) -> QueryObserver<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let session = Some(Arc::clone(&self.session));
        self.observe(key, path.into(), fetch_options, options, session)
    }

    /// A mutation sending `method path`. The variables are serialized as the JSON
    /// body for POST, PUT and PATCH, and ignored for GET and DELETE. No token is sent.
    pub fn mutation<B>(
        &self,
        method: Method,
        path: impl Into<String>,
        fetch_options: FetchOptions,
    ) -> Mutation<B, Response>
    where
        B: Serialize + Send + 'static,
    {
        self.mutate_with(method, path.into(), fetch_options, None)
    }

    /// Like [`Api::mutation`], but every invocation carries the session token
    /// current at the moment it starts.
    pub fn authenticated_mutation<B>(
        &self,
        method: Method,
        path: impl Into<String>,
        fetch_options: FetchOptions,
    ) -> Mutation<B, Response>
    where
        B: Serialize + Send + 'static,
    {
        let session = Some(Arc::clone(&self.session));
        self.mutate_with(method, path.into(), fetch_options, session)
    }

    fn observe<T>(
        &self,
        key: CacheKey,
        path: String,
        fetch_options: FetchOptions,
        options: QueryOptions,
        session: Option<Arc<dyn SessionReader>>,
    ) -> QueryObserver<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let client = self.client.clone();
        let path: Arc<str> = Arc::from(path);
        let fetch_options = Arc::new(fetch_options);

        let fetcher = move || {
            let token = session.as_ref().and_then(|session| session.token());
            let client = client.clone();
            let path = Arc::clone(&path);
            let fetch_options = Arc::clone(&fetch_options);
            async move {
                let response = client.get(&path, &fetch_options, token.as_deref()).await?;
                response.json::<T>()
            }
            .boxed()
        };

        self.queries.observe(key, fetcher, options)
    }

    fn mutate_with<B>(
        &self,
        method: Method,
        path: String,
        fetch_options: FetchOptions,
        session: Option<Arc<dyn SessionReader>>,
    ) -> Mutation<B, Response>
    where
        B: Serialize + Send + 'static,
    {
        let client = self.client.clone();

        Mutation::new(move |variables: B| {
            let token = session.as_ref().and_then(|session| session.token());
            let descriptor = RequestDescriptor::new(method, path.as_str()).with_options(&fetch_options);
            let descriptor = if method.carries_body() {
                descriptor.json(&variables)
            } else {
                Ok(descriptor)
            };
            let client = client.clone();
            async move { client.request(&descriptor?, token.as_deref()).await }.boxed()
        })
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("client", &self.client)
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::*;
    use crate::cache_key;
    use crate::session::SessionStore;
    use crate::transport::mock::MockTransport;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Booking {
        id: u64,
        status: String,
    }

    fn api(mock: &MockTransport, session: &SessionStore) -> Api {
        let client = ApiClient::new("https://api.example.com/v1/", Arc::new(mock.clone()));
        Api::new(client, Arc::new(session.clone()))
    }

    #[tokio::test]
    async fn test_query_decodes_and_sends_no_token() {
        let mock = MockTransport::json(200, json!({"id": 4, "status": "in_transit"}));
        let session = SessionStore::with_token("abc");
        let booking = api(&mock, &session).query::<Booking>(
            cache_key!["booking", 4],
            "/bookings/4",
            FetchOptions::new().param("expand", "bids"),
            QueryOptions::new(),
        );

        let result = booking.fetch().await;
        assert_eq!(
            result.data(),
            Some(&Booking {
                id: 4,
                status: "in_transit".into()
            })
        );

        let sent = mock.last_request().expect("one request");
        assert_eq!(sent.method, Method::Get);
        assert_eq!(
            sent.url.as_str(),
            "https://api.example.com/v1/bookings/4?expand=bids"
        );
        assert_eq!(sent.header("authorization"), None);
    }

    #[tokio::test]
    async fn test_authenticated_query_reads_token_per_fetch() {
        let mock = MockTransport::json(200, json!([]));
        let session = SessionStore::new();
        let bids = api(&mock, &session).authenticated_query::<Vec<Booking>>(
            cache_key!["bids"],
            "bids",
            FetchOptions::new(),
            QueryOptions::new(),
        );

        bids.fetch().await;
        assert_eq!(mock.last_request().expect("sent").header("authorization"), None);

        session.set_token("abc");
        bids.refetch().await;
        assert_eq!(
            mock.last_request().expect("sent").header("authorization"),
            Some("Bearer abc")
        );
    }

    #[tokio::test]
    async fn test_query_decode_failure_is_error() {
        let mock = MockTransport::json(200, json!({"unexpected": true}));
        let session = SessionStore::new();
        let booking = api(&mock, &session).query::<Booking>(
            cache_key!["booking", 1],
            "bookings/1",
            FetchOptions::new(),
            QueryOptions::new(),
        );

        let result = booking.fetch().await;
        assert!(result.is_error());
        let error = result.error().expect("decode error");
        assert!(error.is_network());
        assert_eq!(error.status(), Some(200));
    }

    #[tokio::test]
    async fn test_mutation_body_follows_method() {
        let mock = MockTransport::echo();
        let session = SessionStore::with_token("abc");
        let api = api(&mock, &session);

        let create = api.mutation::<Value>(Method::Post, "bookings", FetchOptions::new());
        let response = create.mutate_async(json!({"x": 1})).await.expect("ok");
        assert_eq!(response.body.as_json(), Some(&json!({"x": 1})));
        let sent = mock.last_request().expect("sent");
        assert_eq!(sent.header("content-type"), Some("application/json"));
        assert_eq!(sent.header("authorization"), None);

        let cancel = api.authenticated_mutation::<Value>(Method::Delete, "bookings/1", FetchOptions::new());
        cancel.mutate_async(json!({"ignored": true})).await.expect("ok");
        let sent = mock.last_request().expect("sent");
        assert_eq!(sent.body, None);
        assert_eq!(sent.header("content-type"), None);
        assert_eq!(sent.header("authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_closure_session_reader() {
        let mock = MockTransport::json(200, json!(null));
        let client = ApiClient::new("https://api.example.com", Arc::new(mock.clone()));
        let api = Api::new(client, Arc::new(|| Some("from-closure".to_string())));

        let ping = api.authenticated_mutation::<()>(Method::Get, "ping", FetchOptions::new());
        ping.mutate_async(()).await.expect("ok");
        assert_eq!(
            mock.last_request().expect("sent").header("authorization"),
            Some("Bearer from-closure")
        );
    }
}
