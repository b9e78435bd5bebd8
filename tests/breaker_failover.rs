//! Failure injection: circuit breaking, fallbacks and upstream errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use edge_gateway::security::TokenService;
use serde_json::{Map, Value};
use uuid::Uuid;

mod common;

fn bearer() -> String {
    let tokens = TokenService::from_secret(
        common::SECRET.as_bytes(),
        chrono::Duration::hours(1),
        chrono::Duration::days(7),
    )
    .unwrap();
    tokens
        .issue_access_token(Uuid::new_v4(), &[], Map::new(), tokens.access_ttl())
        .unwrap()
}

#[tokio::test]
async fn test_breaker_opens_and_recovers() {
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    let (backend, seen) = common::start_programmable_backend(move |_| {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, r#"{"ok":true}"#.to_string())
            } else {
                (500, r#"{"error":"boom"}"#.to_string())
            }
        }
    })
    .await;

    let mut config = common::config_for(backend);
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.open_duration_ms = 300;
    let (gateway, _shutdown) = common::start_gateway(config).await;
    let client = common::client();
    let token = bearer();
    let url = format!("http://{gateway}/api/users/42");

    // Backend errors pass through until the threshold is reached.
    for _ in 0..3 {
        let res = client.get(&url).bearer_auth(&token).send().await.unwrap();
        assert_eq!(res.status(), 500);
    }
    assert_eq!(seen.count(), 3);

    let res = client.get(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["errorCode"], "SERVICE_UNAVAILABLE");
    assert_eq!(
        body["message"],
        "User service is currently unavailable. Please try again later."
    );
    assert_eq!(seen.count(), 3, "open circuit must not call the backend");

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(350)).await;

    let res = client.get(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let res = client.get(&url).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(seen.count(), 5);
}

#[tokio::test]
async fn test_breakers_are_isolated_per_route() {
    let (backend, _) = common::start_programmable_backend(|seen| async move {
        if seen.path.starts_with("/api/v1/users") {
            (500, "{}".to_string())
        } else {
            (200, "{}".to_string())
        }
    })
    .await;

    let mut config = common::config_for(backend);
    config.circuit_breaker.failure_threshold = 2;
    let (gateway, _shutdown) = common::start_gateway(config).await;
    let client = common::client();
    let token = bearer();

    for _ in 0..2 {
        client
            .get(format!("http://{gateway}/api/users/1"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
    }

    let res = client
        .get(format!("http://{gateway}/api/users/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);

    let res = client
        .get(format!("http://{gateway}/api/chats/1"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let (backend, _) = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        (200, "{}".to_string())
    })
    .await;

    let mut config = common::config_for(backend);
    config.timeouts.upstream_ms = 200;
    let (gateway, _shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{gateway}/api/presence/me"))
        .bearer_auth(bearer())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 504);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["errorCode"], "GATEWAY_TIMEOUT");
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let backend = common::closed_port().await;
    let (gateway, _shutdown) = common::start_gateway(common::config_for(backend)).await;

    let res = common::client()
        .get(format!("http://{gateway}/api/notifications/unread"))
        .bearer_auth(bearer())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 502);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["errorCode"], "BAD_GATEWAY");
}
