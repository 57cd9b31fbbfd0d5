//! Bookings example demonstrating queries, mutations and the session binding.
//!
//! This example shows:
//! - Authenticated query with a shared cache key
//! - Mutation creating a resource, followed by prefix invalidation
//! - Stale data kept next to the error of a failed refetch
//! - Logging setup through `LoggingConfig`
//!
//! This uses `JSONPlaceholder` API (<https://jsonplaceholder.typicode.com/>) as a mock backend,
//! with todos standing in for bookings.
//!
//! Run with: `cargo run --example bookings`
//! Set `RUST_LOG=carrier=debug` to see every request.

use std::sync::Arc;

use carrier::logging::{LogFormat, LoggingConfig};
use carrier::prelude::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// A booking from the API
#[derive(Debug, Clone, Deserialize)]
struct Booking {
    id: u32,
    title: String,
    completed: bool,
}

#[derive(Debug, Serialize)]
struct NewBooking {
    #[serde(rename = "userId")]
    user_id: u32,
    title: String,
    completed: bool,
}

fn print_bookings(label: &str, result: &QueryResult<Vec<Booking>>) {
    match (result.data(), result.error()) {
        (Some(bookings), error) => {
            let open = bookings.iter().filter(|b| !b.completed).count();
            println!("{label}: {} bookings, {open} open", bookings.len());
            if let Some(first) = bookings.first() {
                println!("  #{} {}", first.id, first.title);
            }
            if let Some(error) = error {
                println!("  (showing cached data, refresh failed: {error})");
            }
        }
        (None, Some(error)) => println!("{label}: failed: {error}"),
        (None, None) => println!("{label}: {:?}", result.status),
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    LoggingConfig::new(LogFormat::Text, "info", false).try_init()?;

    let session = SessionStore::new();
    let api = Api::from_config(
        &ClientConfig::new("https://jsonplaceholder.typicode.com"),
        Arc::new(session.clone()),
    )?;

    // Restored from storage by whatever owns the login flow.
    session.set_token("demo-token");

    let bookings = api.authenticated_query::<Vec<Booking>>(
        cache_key!["bookings", 1],
        "/todos",
        FetchOptions::new().param("userId", 1),
        QueryOptions::new(),
    );

    let mut updates = bookings.watch();
    while let Some(result) = updates.next().await {
        if result.is_loading() {
            println!("loading bookings...");
            continue;
        }
        print_bookings("initial", &result);
        break;
    }

    let create = api.authenticated_mutation::<NewBooking>(Method::Post, "/todos", FetchOptions::new());
    let response = create
        .mutate_async(NewBooking {
            user_id: 1,
            title: "Pick up parcel at depot".to_string(),
            completed: false,
        })
        .await?;
    println!("created booking (HTTP {})", response.status);

    let refreshed = api.queries().invalidate(&cache_key!["bookings"]).await;
    println!("invalidated {refreshed} queries");
    print_bookings("after create", &bookings.result());

    session.clear();
    let logged_out = bookings.refetch().await;
    print_bookings("after logout", &logged_out);

    Ok(())
}
