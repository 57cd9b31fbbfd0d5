//! Mock transport for testing.
//!
//! [`MockTransport`] records every [`PreparedRequest`] it receives and answers from a
//! responder closure, optionally after a delay. It performs no I/O, so header
//! injection, request counts and de-duplication can be asserted deterministically.
//!
//! # Basic Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use carrier::client::ApiClient;
//! use carrier::transport::{FetchOptions, mock::MockTransport};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> carrier::Result<()> {
//! let mock = MockTransport::json(200, json!({"id": 1}));
//! let client = ApiClient::new("https://api.example.com", Arc::new(mock.clone()));
//!
//! let response = client.get("/bookings/1", &FetchOptions::new(), None).await?;
//! assert_eq!(response.json::<serde_json::Value>()?, json!({"id": 1}));
//! assert_eq!(mock.call_count(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Scripted Replies
//!
//! ```
//! use carrier::transport::{RawResponse, mock::MockTransport};
//! use serde_json::json;
//!
//! // First call succeeds, every later call fails with a 500.
//! let mock = MockTransport::sequence(vec![
//!     Ok(RawResponse::json(200, &json!({"id": 1}))),
//!     Ok(RawResponse::text(500, "boom")),
//! ]);
//! assert_eq!(mock.call_count(), 0);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use super::{PreparedRequest, RawResponse, Transport};
use crate::error::{ApiError, Result};
use crate::lock;

type Responder = dyn Fn(&PreparedRequest) -> Result<RawResponse> + Send + Sync;

/// A [`Transport`] that answers from a closure and records what it was sent.
///
/// Clones share the same request log, so a test can keep one clone and hand the
/// other to the client under test.
#[derive(Clone)]
pub struct MockTransport {
    requests: Arc<Mutex<Vec<PreparedRequest>>>,
    responder: Arc<Responder>,
    delay: Duration,
}

impl MockTransport {
    /// Creates a mock that answers every request with `responder`.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&PreparedRequest) -> Result<RawResponse> + Send + Sync + 'static,
    {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
            delay: Duration::ZERO,
        }
    }

    /// Always replies with the given JSON body.
    pub fn json(status: u16, body: Value) -> Self {
        Self::new(move |_| Ok(RawResponse::json(status, &body)))
    }

    /// Always replies with the given `text/plain` body.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::new(move |_| Ok(RawResponse::text(status, body.clone())))
    }

    /// Always fails as if the network were unreachable.
    pub fn offline() -> Self {
        Self::new(|_| Err(ApiError::network("connection refused")))
    }

    /// Replies with `replies` in order, repeating the last one once exhausted.
    ///
    /// # Panics
    ///
    /// Panics if `replies` is empty.
    pub fn sequence(replies: Vec<Result<RawResponse>>) -> Self {
        assert!(!replies.is_empty(), "sequence needs at least one reply");
        let next = AtomicUsize::new(0);
        Self::new(move |_| {
            let index = next.fetch_add(1, Ordering::SeqCst).min(replies.len() - 1);
            replies[index].clone()
        })
    }

    /// Echoes the request body back as JSON, or `null` when there is none.
    pub fn echo() -> Self {
        Self::new(|request| {
            let body = match &request.body {
                Some(text) => serde_json::from_str(text).map_err(ApiError::request)?,
                None => Value::Null,
            };
            Ok(RawResponse::json(200, &body))
        })
    }

    /// Holds every reply for `delay` before resolving.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<PreparedRequest> {
        lock(&self.requests).clone()
    }

    pub fn last_request(&self) -> Option<PreparedRequest> {
        lock(&self.requests).last().cloned()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("calls", &self.call_count())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: PreparedRequest) -> BoxFuture<'static, Result<RawResponse>> {
        let reply = (self.responder)(&request);
        lock(&self.requests).push(request);
        let delay = self.delay;

        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply
        }
        .boxed()
    }
}
