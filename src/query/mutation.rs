//! Observable write operations.
//!
//! A [`Mutation`] wraps an async function that creates, updates, or deletes a
//! resource. Unlike queries, mutations are not cached or shared: every call to
//! [`Mutation::mutate_async`] performs exactly one mutator call. The outcome of the
//! latest call is published as a [`MutationResult`] for anyone watching.
//!
//! Mutations never touch the query cache. After a successful mutation, call
//! [`QueryClient::invalidate`](super::QueryClient::invalidate) for the keys it
//! affected.
//!
//! # Example
//!
//! ```rust
//! use carrier::query::Mutation;
//! use futures::FutureExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let accept_bid = Mutation::new(|bid_id: u64| {
//!     async move { Ok(format!("bid {bid_id} accepted")) }.boxed()
//! });
//!
//! let message = accept_bid.mutate_async(7).await;
//! assert_eq!(message.as_deref(), Ok("bid 7 accepted"));
//! assert!(accept_bid.result().is_success());
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::error::{ApiError, Result};

/// The state of a mutation result.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState<T> {
    /// Mutation is idle (not yet started, or reset).
    Idle,
    /// Mutation is in progress.
    Loading,
    /// Mutation succeeded with a result.
    Success(T),
    /// Mutation failed with an error.
    Error(ApiError),
}

/// A mutation result containing the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult<T> {
    /// The current state of the mutation.
    pub state: MutationState<T>,
}

impl<T> MutationResult<T> {
    pub const fn idle() -> Self {
        Self {
            state: MutationState::Idle,
        }
    }

    /// Returns the result data if the mutation succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            MutationState::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the error if the mutation failed, otherwise `None`.
    pub const fn error(&self) -> Option<&ApiError> {
        match &self.state {
            MutationState::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if the mutation is currently loading.
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, MutationState::Loading)
    }

    /// Returns `true` if the mutation succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.state, MutationState::Success(_))
    }

    /// Returns `true` if the mutation failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.state, MutationState::Error(_))
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self.state, MutationState::Idle)
    }
}

type Mutator<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O>> + Send + Sync>;

struct Inner<I, O> {
    mutator: Mutator<I, O>,
    state: watch::Sender<MutationResult<O>>,
    latest: AtomicU64,
}

/// A write operation with observable state.
///
/// Clones share state, so a clone handed to another task reports into the same
/// [`MutationResult`].
pub struct Mutation<I, O> {
    inner: Arc<Inner<I, O>>,
}

impl<I, O> Mutation<I, O>
where
    I: Send + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn new<F>(mutator: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<O>> + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(MutationResult::idle());
        Self {
            inner: Arc::new(Inner {
                mutator: Arc::new(mutator),
                state,
                latest: AtomicU64::new(0),
            }),
        }
    }

    /// Runs the mutator once with `input`.
    ///
    /// The state moves to `Loading` (clearing any previous error) and then to
    /// `Success` or `Error`. When invocations overlap, only the most recent one
    /// settles the state; every caller still receives its own result.
    ///
    /// Dropping the returned future abandons the call. If it was the most recent
    /// one, the state returns to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns whatever error the mutator produced.
    pub async fn mutate_async(&self, input: I) -> Result<O> {
        let invocation = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_replace(MutationResult {
            state: MutationState::Loading,
        });
        let mut pending = Pending {
            inner: &self.inner,
            invocation,
            settled: false,
        };

        let result = (self.inner.mutator)(input).await;

        let state = match &result {
            Ok(data) => MutationState::Success(data.clone()),
            Err(e) => MutationState::Error(e.clone()),
        };
        pending.settle(state);

        result
    }

    pub fn result(&self) -> MutationResult<O> {
        self.inner.state.borrow().clone()
    }

    /// A stream of states: the current one first, then one per change.
    pub fn watch(&self) -> BoxStream<'static, MutationResult<O>> {
        WatchStream::new(self.inner.state.subscribe()).boxed()
    }

    /// Returns the state to `Idle`. A call still in flight no longer settles it.
    pub fn reset(&self) {
        self.inner.latest.fetch_add(1, Ordering::SeqCst);
        self.inner.state.send_replace(MutationResult::idle());
    }
}

/// Settles the state for one invocation, unless a newer one (or a reset) has
/// taken over. Dropped unsettled, it returns the state to `Idle`.
struct Pending<'a, I, O> {
    inner: &'a Inner<I, O>,
    invocation: u64,
    settled: bool,
}

impl<I, O> Pending<'_, I, O> {
    fn settle(&mut self, state: MutationState<O>) {
        self.settled = true;
        let latest = &self.inner.latest;
        let invocation = self.invocation;

        // The check runs under the channel's write lock, so a newer invocation
        // always publishes its `Loading` after this.
        let applied = self.inner.state.send_if_modified(|current| {
            if latest.load(Ordering::SeqCst) != invocation {
                return false;
            }
            current.state = state;
            true
        });
        if !applied {
            debug!(invocation, "superseded mutation settled");
        }
    }
}

impl<I, O> Drop for Pending<'_, I, O> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(invocation = self.invocation, "mutation abandoned");
            self.settle(MutationState::Idle);
        }
    }
}

impl<I, O> Clone for Mutation<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O: fmt::Debug> fmt::Debug for Mutation<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("state", &self.inner.state.borrow().state)
            .finish_non_exhaustive()
    }
}
