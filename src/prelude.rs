//! Prelude module for convenient imports.
//!
//! ```
//! use carrier::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`Api`] - Queries and mutations bound to a backend and a session
//! - [`ApiClient`] and [`ClientConfig`] - Direct requests
//! - [`QueryClient`], [`QueryOptions`], [`QueryResult`] and [`Mutation`] - The cache
//! - [`SessionStore`] and [`SessionReader`] - Token access
//! - [`cache_key!`](crate::cache_key) - Builds a [`CacheKey`]

pub use crate::api::Api;
pub use crate::cache_key;
pub use crate::client::ApiClient;
pub use crate::config::ClientConfig;
pub use crate::error::{ApiError, ErrorKind, Result};
pub use crate::query::{
    CacheKey, Mutation, MutationResult, QueryClient, QueryConfig, QueryObserver, QueryOptions,
    QueryResult, QueryStatus,
};
pub use crate::session::{SessionReader, SessionStore};
pub use crate::transport::{FetchOptions, Method, Response};
