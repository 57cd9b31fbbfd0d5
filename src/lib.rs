//! # Carrier - typed REST data layer
//!
//! Carrier is the data-fetching and mutation layer of a shipping client. It turns
//! REST calls into typed results, caches reads under structural keys, and attaches
//! the session's bearer token where a call asks for it.
//!
//! ## Layers
//!
//! 1. **Transport**: URL building, JSON bodies, the HTTP round trip and
//!    normalization of every outcome into a [`Response`](transport::Response) or
//!    an [`ApiError`]
//! 2. **Queries**: a keyed, de-duplicating read cache with observers that keep the
//!    last good data when a refetch fails
//! 3. **Mutations**: one-off writes with observable loading/success/error state
//! 4. **Session binding**: [`Api`](api::Api) variants that read the token from an
//!    injected [`SessionReader`](session::SessionReader) before every request
//!
//! ## Core Components
//!
//! - [`ApiClient`](client::ApiClient): Sends requests through a [`Transport`](transport::Transport)
//! - [`QueryClient`](query::QueryClient): Owns the cache, invalidation and GC
//! - [`Mutation`](query::Mutation): Observable write operation
//! - [`Api`](api::Api): Binds all of the above to one backend and one session
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use carrier::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Clone, Deserialize)]
//! struct Booking {
//!     id: u64,
//!     status: String,
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> carrier::Result<()> {
//! let session = SessionStore::new();
//! let api = Api::from_config(
//!     &ClientConfig::new("https://api.example.com/v1"),
//!     Arc::new(session.clone()),
//! )?;
//!
//! session.set_token("token-from-login");
//! let bookings = api.authenticated_query::<Vec<Booking>>(
//!     cache_key!["bookings", "active"],
//!     "/bookings",
//!     FetchOptions::new().param("status", "active"),
//!     QueryOptions::new(),
//! );
//!
//! let result = bookings.fetch().await;
//! if let Some(error) = result.error() {
//!     eprintln!("could not load bookings: {error}");
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod query;
pub mod session;
pub mod transport;

pub use error::{ApiError, ErrorKind, Result};

/// Locks `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
