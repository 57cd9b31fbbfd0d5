// Integration tests for the query runtime driven through Api and a mock transport.
// Unit tests for the cache internals are in src/query/.

use std::sync::Arc;

use carrier::prelude::*;
use carrier::transport::RawResponse;
use carrier::transport::mock::MockTransport;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::time::{Duration, timeout};

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Profile {
    id: u64,
}

fn api(mock: &MockTransport) -> Api {
    let client = ApiClient::new("https://api.example.com", Arc::new(mock.clone()));
    Api::new(client, Arc::new(SessionStore::new()))
}

#[tokio::test]
async fn test_identical_keys_share_one_request() {
    let mock = MockTransport::json(200, json!({"id": 1})).with_delay(Duration::from_millis(50));
    let api = api(&mock);

    let first = api.query::<Profile>(
        cache_key!["profile"],
        "/user/profile",
        FetchOptions::new(),
        QueryOptions::new(),
    );
    let second = api.query::<Profile>(
        cache_key!["profile"],
        "user/profile",
        FetchOptions::new(),
        QueryOptions::new(),
    );

    let (a, b) = tokio::join!(first.refetch(), second.refetch());
    assert_eq!(a.data(), Some(&Profile { id: 1 }));
    assert_eq!(b.data(), Some(&Profile { id: 1 }));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_refetch_failure_keeps_previous_data() {
    let mock = MockTransport::sequence(vec![
        Ok(RawResponse::json(200, &json!({"id": 1}))),
        Ok(RawResponse::text(500, "boom")),
    ]);
    let api = api(&mock);
    let profile = api.query::<Profile>(
        cache_key!["profile"],
        "user/profile",
        FetchOptions::new(),
        QueryOptions::new(),
    );

    let loaded = profile.fetch().await;
    assert!(loaded.is_success());

    let failed = profile.refetch().await;
    assert_eq!(failed.data(), Some(&Profile { id: 1 }));
    assert!(failed.is_error());
    assert!(!failed.is_loading());
    let error = failed.error().expect("error is set");
    assert_eq!(error.status(), Some(500));
    assert_eq!(error.body(), Some("boom"));
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_network_failure_surfaces_as_query_error() {
    let mock = MockTransport::offline();
    let api = api(&mock);
    let profile = api.query::<Profile>(
        cache_key!["profile"],
        "user/profile",
        FetchOptions::new(),
        QueryOptions::new(),
    );

    let result = profile.fetch().await;
    assert_eq!(result.status, QueryStatus::Error);
    assert!(result.data().is_none());
    let error = result.error().expect("network error");
    assert!(error.is_network());
    assert_eq!(error.status(), None);
    assert!(!error.message().is_empty());
}

#[tokio::test]
async fn test_disabled_query_sends_nothing_until_enabled() {
    let mock = MockTransport::json(200, json!({"id": 9}));
    let api = api(&mock);
    let profile = api.query::<Profile>(
        cache_key!["profile", 9],
        "user/9",
        FetchOptions::new(),
        QueryOptions::new().enabled(false),
    );

    let idle = profile.refetch().await;
    assert!(idle.is_idle());
    assert!(idle.data().is_none());
    assert!(idle.error().is_none());
    assert!(!idle.is_loading());
    assert_eq!(mock.call_count(), 0);

    profile.set_enabled(true);
    let result = profile.fetch().await;
    assert_eq!(result.data(), Some(&Profile { id: 9 }));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_fresh_data_is_served_from_cache() {
    let mock = MockTransport::json(200, json!({"id": 3}));
    let api = api(&mock);
    let options = QueryOptions::new().stale_time(Duration::from_secs(60));

    let first = api.query::<Profile>(cache_key!["profile", 3], "user/3", FetchOptions::new(), options.clone());
    first.fetch().await;
    drop(first);

    let second = api.query::<Profile>(cache_key!["profile", 3], "user/3", FetchOptions::new(), options);
    let result = second.result();
    assert_eq!(result.data(), Some(&Profile { id: 3 }));
    assert!(!result.is_fetching());
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_invalidate_refetches_observed_prefix() {
    let mock = MockTransport::json(200, json!({"id": 1}));
    let api = api(&mock);
    let booking = api.query::<Profile>(cache_key!["booking", 1], "bookings/1", FetchOptions::new(), QueryOptions::new());
    let bids = api.query::<Vec<Profile>>(cache_key!["booking", 1, "bids"], "bookings/1/bids", FetchOptions::new(), QueryOptions::new().enabled(false));
    booking.fetch().await;
    let before = mock.call_count();

    let matched = api.queries().invalidate(&cache_key!["booking", 1]).await;
    assert_eq!(matched, 2);
    assert_eq!(mock.call_count(), before + 1);
    assert!(bids.result().is_idle());
}

#[tokio::test]
async fn test_watch_reports_loading_then_success() {
    let mock = MockTransport::json(200, json!({"id": 5})).with_delay(Duration::from_millis(20));
    let api = api(&mock);
    let profile = api.query::<Profile>(cache_key!["profile", 5], "user/5", FetchOptions::new(), QueryOptions::new());

    let mut updates = profile.watch();
    let first = updates.next().await.expect("current state");
    assert!(first.is_loading());

    let settled = timeout(Duration::from_secs(1), async {
        while let Some(result) = updates.next().await {
            if !result.is_fetching() {
                return result;
            }
        }
        panic!("stream ended");
    })
    .await
    .expect("query settles");
    assert_eq!(settled.data(), Some(&Profile { id: 5 }));
}

#[tokio::test]
async fn test_fetch_completes_after_last_observer_drops() {
    let mock = MockTransport::json(200, json!({"id": 8})).with_delay(Duration::from_millis(30));
    let api = api(&mock);

    let profile = api.query::<Profile>(
        cache_key!["profile", 8],
        "user/8",
        FetchOptions::new(),
        QueryOptions::new(),
    );
    assert!(profile.result().is_loading());
    drop(profile);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(mock.call_count(), 1);
    assert_eq!(
        api.queries().get_query_data::<Profile>(&cache_key!["profile", 8]),
        Some(Profile { id: 8 })
    );

    let again = api.query::<Profile>(
        cache_key!["profile", 8],
        "user/8",
        FetchOptions::new(),
        QueryOptions::new().stale_time(Duration::from_secs(60)),
    );
    assert_eq!(again.result().data(), Some(&Profile { id: 8 }));
    assert_eq!(mock.call_count(), 1);
}
