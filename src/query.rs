//! Cached queries and observable mutations.
//!
//! This module provides a keyed read cache with subscription-style observers and a
//! write primitive with observable state, similar to SWR or TanStack Query.
//!
//! # Features
//!
//! - **Queries**: one cache entry per [`CacheKey`], shared by every observer of that key
//! - **De-duplication**: concurrent fetches of one entry share a single request
//! - **Stale-while-error**: a failed refetch keeps the last good data next to the error
//! - **Mutations**: one-off writes whose latest outcome can be watched
//! - **Cache management**: prefix invalidation and garbage collection
//!
//! # Example
//!
//! ```rust
//! use carrier::cache_key;
//! use carrier::query::{QueryClient, QueryOptions};
//! use futures::FutureExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let client = QueryClient::new();
//!
//! let wallet = client.observe(
//!     cache_key!["wallet"],
//!     || async { Ok(1250_u64) }.boxed(),
//!     QueryOptions::new(),
//! );
//!
//! let result = wallet.fetch().await;
//! assert_eq!(result.data(), Some(&1250));
//!
//! // After a top-up, revalidate everything under "wallet".
//! client.invalidate(&cache_key!["wallet"]).await;
//! # }
//! ```

mod cache;
mod client;
mod config;
mod key;
pub mod mutation;
mod observer;

// Re-export main types
pub use cache::CacheEntry;
pub use client::QueryClient;
pub use config::{QueryConfig, QueryOptions};
pub use key::{CacheKey, KeyPart};
pub use mutation::{Mutation, MutationResult, MutationState};
pub use observer::{QueryObserver, QueryResult, QueryStatus};
