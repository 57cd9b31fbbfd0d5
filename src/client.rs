//! The transport-level REST client.
//!
//! [`ApiClient`] turns a path, optional body and [`FetchOptions`] into one request,
//! sends it through a [`Transport`], and normalizes the outcome. Whether a bearer
//! token is attached is decided by the caller on every call: the client never looks
//! at session state on its own.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::transport::{
    FetchOptions, HttpTransport, Method, RequestDescriptor, Response, Transport, normalize,
    prepare,
};

/// A cheap-to-clone handle to a base URL and a [`Transport`].
#[derive(Clone)]
pub struct ApiClient {
    base_url: Arc<str>,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: Arc::from(base_url),
            transport,
        }
    }

    /// Builds a client backed by [`HttpTransport`].
    ///
    /// # Errors
    ///
    /// Returns a request error if the HTTP client cannot be constructed.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(config.base_url.clone(), Arc::new(transport)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Performs one request.
    ///
    /// `token`, when present, is sent as `Authorization: Bearer <token>`.
    ///
    /// # Errors
    ///
    /// Every failure (invalid request, network, non-2xx, undecodable JSON) is an
    /// [`ApiError`](crate::ApiError).
    pub async fn request(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<Response> {
        let prepared = prepare(&self.base_url, descriptor, token)?;
        let method = prepared.method;
        let url = prepared.url.clone();
        debug!(%method, %url, authenticated = token.is_some(), "sending request");

        let outcome = self.transport.send(prepared).await.and_then(normalize);

        match &outcome {
            Ok(response) => debug!(%method, %url, status = response.status, "request succeeded"),
            Err(e) => warn!(%method, %url, status = ?e.status(), error = %e, "request failed"),
        }

        outcome
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn get(
        &self,
        path: &str,
        options: &FetchOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        let descriptor = RequestDescriptor::new(Method::Get, path).with_options(options);
        self.request(&descriptor, token).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &FetchOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        self.send_with_body(Method::Post, path, body, options, token)
            .await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &FetchOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        self.send_with_body(Method::Put, path, body, options, token)
            .await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: &FetchOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        self.send_with_body(Method::Patch, path, body, options, token)
            .await
    }

    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn delete(
        &self,
        path: &str,
        options: &FetchOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        let descriptor = RequestDescriptor::new(Method::Delete, path).with_options(options);
        self.request(&descriptor, token).await
    }

    async fn send_with_body<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        options: &FetchOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        let descriptor = RequestDescriptor::new(method, path)
            .with_options(options)
            .json(body)?;
        self.request(&descriptor, token).await
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
