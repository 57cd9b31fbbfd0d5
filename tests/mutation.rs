// Integration tests for mutation state transitions through Api.

use std::sync::Arc;

use carrier::prelude::*;
use carrier::query::MutationState;
use carrier::transport::RawResponse;
use carrier::transport::mock::MockTransport;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::time::{Duration, timeout};

fn api(mock: &MockTransport) -> Api {
    let client = ApiClient::new("https://api.example.com", Arc::new(mock.clone()));
    Api::new(client, Arc::new(SessionStore::new()))
}

#[tokio::test]
async fn test_each_call_has_its_own_loading_transition() {
    let mock = MockTransport::echo().with_delay(Duration::from_millis(10));
    let create = api(&mock).mutation::<Value>(Method::Post, "bookings", FetchOptions::new());
    assert!(create.result().is_idle());

    let mut states = create.watch();
    assert!(states.next().await.expect("current").is_idle());

    for n in 0..2 {
        let call = create.mutate_async(json!({ "n": n }));
        let (response, loading) = tokio::join!(call, states.next());
        assert!(loading.expect("loading state").is_loading());
        assert_eq!(response.expect("ok").body.as_json(), Some(&json!({ "n": n })));

        let settled = states.next().await.expect("settled state");
        assert!(settled.is_success());
        assert!(!settled.is_loading());
    }
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_error_does_not_leak_into_next_call() {
    let mock = MockTransport::sequence(vec![
        Ok(RawResponse::text(422, "pickup date is in the past")),
        Ok(RawResponse::json(200, &json!({"id": 2}))),
    ])
    .with_delay(Duration::from_millis(20));
    let create = api(&mock).mutation::<Value>(Method::Post, "bookings", FetchOptions::new());

    let err = create.mutate_async(json!({})).await.unwrap_err();
    assert!(err.is_client_error());
    assert!(err.message().contains("422"));
    assert_eq!(err.body(), Some("pickup date is in the past"));
    assert!(create.result().is_error());

    let retry = {
        let create = create.clone();
        tokio::spawn(async move { create.mutate_async(json!({})).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let during = create.result();
    assert!(during.is_loading());
    assert!(during.error().is_none());

    retry.await.expect("task").expect("second call succeeds");
    let after = create.result();
    assert_eq!(after.data().map(|r| r.status), Some(200));
    assert!(after.error().is_none());
}

#[tokio::test]
async fn test_network_failure_is_returned_not_panicked() {
    let mock = MockTransport::offline();
    let cancel = api(&mock).mutation::<()>(Method::Delete, "bookings/1", FetchOptions::new());

    let err = cancel.mutate_async(()).await.unwrap_err();
    assert!(err.is_network());
    assert!(matches!(cancel.result().state, MutationState::Error(_)));
}

#[tokio::test]
async fn test_abandoned_call_does_not_stay_loading() {
    let mock = MockTransport::echo().with_delay(Duration::from_millis(200));
    let create = api(&mock).mutation::<Value>(Method::Post, "bookings", FetchOptions::new());

    let abandoned = timeout(Duration::from_millis(10), create.mutate_async(json!({}))).await;
    assert!(abandoned.is_err());
    assert_eq!(mock.call_count(), 1);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let state = create.result();
    assert!(!state.is_loading());
    assert!(state.is_idle());

    let response = create.mutate_async(json!({"n": 2})).await.expect("ok");
    assert_eq!(response.body.as_json(), Some(&json!({"n": 2})));
    assert!(create.result().is_success());
}
