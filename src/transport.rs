//! One HTTP round trip, normalized.
//!
//! This module owns everything between a caller's intent ("POST this body to
//! `/bookings`") and a typed outcome:
//!
//! 1. [`prepare`] resolves a [`RequestDescriptor`] against the base URL into a
//!    [`PreparedRequest`] with its final URL, headers and body text.
//! 2. A [`Transport`] performs the exchange and hands back a [`RawResponse`].
//! 3. [`normalize`] turns the raw response into a [`Response`] or an [`ApiError`].
//!
//! Only step 2 does I/O, which keeps URL building, header policy and error
//! normalization testable without a network. [`HttpTransport`] is the reqwest-backed
//! implementation; [`mock::MockTransport`] records requests for tests.
//!
//! There are no retries and no timeouts here: a request is a single deterministic
//! round trip.

pub mod mock;

use std::fmt;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};

/// Sent with every request.
pub const ACCEPT_HEADER: &str = "application/json, text/plain;q=0.9,*/*;q=0.8";

const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP methods understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether mutation variables are sent as the request body.
    pub const fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// A scalar query-string value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered query parameters. Entries without a value are kept for bookkeeping but
/// never serialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(Vec<(String, Option<ParamValue>)>);

impl QueryParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter that is always sent.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.push((name.into(), Some(value.into())));
        self
    }

    /// Appends a parameter that is omitted when `value` is `None`.
    #[must_use]
    pub fn with_opt<V: Into<ParamValue>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.0.push((name.into(), value.map(Into::into)));
        self
    }

    /// The parameters that will actually be serialized, in insertion order.
    pub fn present(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.as_str(), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }
}

/// Per-call options shared by queries, mutations and direct requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    pub params: QueryParams,
    pub headers: Vec<(String, String)>,
}

impl FetchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params = self.params.with(name, value);
        self
    }

    #[must_use]
    pub fn param_opt<V: Into<ParamValue>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.params = self.params.with_opt(name, value);
        self
    }

    /// Adds a header. Caller headers are merged last and override defaults,
    /// including an injected `Authorization`.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Everything needed to describe one request, before it is resolved against a
/// base URL. Built fresh per call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub params: QueryParams,
    pub headers: Vec<(String, String)>,
    /// JSON text; `None` means no body and no `Content-Type`.
    pub body: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: QueryParams::default(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: &FetchOptions) -> Self {
        self.params = options.params.clone();
        self.headers = options.headers.clone();
        self
    }

    /// Serializes `body` as the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns a request error if `body` cannot be serialized.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let text = serde_json::to_string(body).map_err(ApiError::request)?;
        self.body = Some(text);
        Ok(self)
    }
}

/// A request resolved to its final URL, headers and body, ready for a [`Transport`].
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl PreparedRequest {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Joins `base_url` and `path` with exactly one slash and appends every present
/// query parameter.
///
/// # Errors
///
/// Returns a request error if the result is not a valid absolute URL.
pub fn build_url(base_url: &str, path: &str, params: &QueryParams) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined).map_err(|e| ApiError::request(format!("{joined}: {e}")))?;

    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params.present() {
            pairs.append_pair(name, &value.to_string());
        }
    }

    Ok(url)
}

/// Resolves a descriptor into a [`PreparedRequest`].
///
/// Header precedence, lowest first: `Accept`, `Content-Type` (only with a body),
/// `Authorization: Bearer <token>` (only when `token` is `Some`), then the caller's
/// own headers.
///
/// # Errors
///
/// Returns a request error for an invalid URL or header.
pub fn prepare(
    base_url: &str,
    descriptor: &RequestDescriptor,
    token: Option<&str>,
) -> Result<PreparedRequest> {
    let url = build_url(base_url, &descriptor.path, &descriptor.params)?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER));

    if descriptor.body.is_some() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    }

    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ApiError::request("token is not a valid header value"))?;
        headers.insert(AUTHORIZATION, value);
    }

    for (name, value) in &descriptor.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::request(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::request(format!("header {name}: {e}")))?;
        headers.insert(name, value);
    }

    Ok(PreparedRequest {
        method: descriptor.method,
        url,
        headers,
        body: descriptor.body.clone(),
    })
}

/// What a [`Transport`] hands back before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    /// A response with a JSON body and content type.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            status_text: canonical_reason(status),
            content_type: Some(JSON_CONTENT_TYPE.to_owned()),
            body: body.to_string(),
        }
    }

    /// A `text/plain` response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status),
            content_type: Some("text/plain; charset=utf-8".to_owned()),
            body: body.into(),
        }
    }
}

fn canonical_reason(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or_default()
        .to_owned()
}

/// A parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
}

impl Body {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    /// Decodes the body into `T`. A text body decodes as a JSON string, so
    /// `T = String` accepts plain-text endpoints.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.deserialize().map_err(|e| ApiError::decode(None, e))
    }

    fn deserialize<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        match self {
            Self::Json(value) => T::deserialize(value),
            Self::Text(text) => T::deserialize(Value::String(text.clone())),
        }
    }
}

/// Normalized 2xx response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Body,
}

impl Response {
    /// Decodes the body into `T`, keeping the status on failure.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        self.body
            .deserialize()
            .map_err(|e| ApiError::decode(Some(self.status), e))
    }
}

/// Maps a raw response onto [`Response`] or [`ApiError`].
///
/// # Errors
///
/// Non-2xx statuses become HTTP errors carrying the status and raw body. A body
/// labelled JSON that fails to parse becomes a decode error; partially parsed data
/// is never returned.
pub fn normalize(raw: RawResponse) -> Result<Response> {
    if !(200..300).contains(&raw.status) {
        return Err(ApiError::http(raw.status, &raw.status_text, raw.body));
    }

    let is_json = raw
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().contains(JSON_CONTENT_TYPE));

    let body = if !is_json {
        Body::Text(raw.body)
    } else if raw.body.trim().is_empty() {
        Body::Json(Value::Null)
    } else {
        let value = serde_json::from_str(&raw.body)
            .map_err(|e| ApiError::decode(Some(raw.status), e))?;
        Body::Json(value)
    };

    Ok(Response {
        status: raw.status,
        body,
    })
}

/// Performs one HTTP exchange.
///
/// Implementations report "no response received" as [`ApiError::network`]; every
/// received response, whatever its status, is returned as a [`RawResponse`].
pub trait Transport: Send + Sync {
    fn send(&self, request: PreparedRequest) -> BoxFuture<'static, Result<RawResponse>>;
}

/// [`Transport`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns a request error if the underlying client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(ApiError::request)?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: PreparedRequest) -> BoxFuture<'static, Result<RawResponse>> {
        let client = self.client.clone();

        async move {
            let mut builder = client
                .request(request.method.into(), request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let resp = builder.send().await.map_err(ApiError::from)?;

            let status = resp.status();
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body = resp.text().await.map_err(ApiError::network)?;

            Ok(RawResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_owned(),
                content_type,
                body,
            })
        }
        .boxed()
    }
}
