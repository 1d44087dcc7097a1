//! HTTP surface integration tests
//!
//! Runs the full middleware stack on a real listener, so requests carry a
//! peer address and the rate limiter sees a real source.

mod common;

use std::sync::Arc;

use auth_service::clock::ManualClock;
use auth_service::config::Config;
use chrono::{TimeZone, Utc};
use common::*;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn start_server(config: Config) -> (String, tokio::sync::oneshot::Sender<()>) {
    let store = create_test_store().await;
    add_identity(store.as_ref(), "alice", "s3cret").await;

    // Frozen at the start of a rate-limit window so counters never straddle two
    let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_040, 0).unwrap());
    let state = create_test_state(&config, Arc::clone(&store), Arc::new(clock));
    let (addr, shutdown) = run_test_server(&config, state).await;
    (format!("http://{}", addr), shutdown)
}

async fn login(client: &reqwest::Client, base: &str, secret: &str) -> reqwest::Response {
    client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "identityRef": "alice", "secret": secret }))
        .send()
        .await
        .expect("Failed to send request")
}

async fn login_token(client: &reqwest::Client, base: &str) -> String {
    let response = login(client, base, "s3cret").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    body["token"].as_str().unwrap().to_string()
}

/// Test 1: Health endpoint responds
#[tokio::test]
async fn test_health() {
    let (base, _shutdown) = start_server(create_test_config()).await;

    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test 2: Login returns a token and its expiry
#[tokio::test]
async fn test_login_success() {
    let (base, _shutdown) = start_server(create_test_config()).await;
    let client = reqwest::Client::new();

    let response = login(&client, &base, "s3cret").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["token"].as_str().unwrap().split('.').count(), 3);
    assert!(body["expiresAt"].is_string());
}

/// Test 3: Wrong secret is unauthorized
#[tokio::test]
async fn test_login_wrong_secret() {
    let (base, _shutdown) = start_server(create_test_config()).await;
    let client = reqwest::Client::new();

    let response = login(&client, &base, "wrong").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "errorKind": "invalid_credentials" }));
}

/// Test 4: Malformed login bodies are bad requests
#[tokio::test]
async fn test_login_malformed_body() {
    let (base, _shutdown) = start_server(create_test_config()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/auth/login", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errorKind"], "invalid_request");
}

/// Test 5: Tokens verify from the body or a bearer header
#[tokio::test]
async fn test_verify_token() {
    let (base, _shutdown) = start_server(create_test_config()).await;
    let client = reqwest::Client::new();
    let token = login_token(&client, &base).await;

    let response = client
        .post(format!("{}/auth/verify", base))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "identityRef": "alice" }));

    let response = client
        .post(format!("{}/auth/verify", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test 6: Verify without a token is unauthorized
#[tokio::test]
async fn test_verify_missing_token() {
    let (base, _shutdown) = start_server(create_test_config()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/auth/verify", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "errorKind": "unauthorized" }));
}

/// Test 7: Revoked tokens are rejected with a collapsed error kind
#[tokio::test]
async fn test_revoke_then_verify() {
    let (base, _shutdown) = start_server(create_test_config()).await;
    let client = reqwest::Client::new();
    let token = login_token(&client, &base).await;

    let response = client
        .post(format!("{}/auth/revoke", base))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client
        .post(format!("{}/auth/verify", base))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "errorKind": "unauthorized" }));
}

/// Test 8: Precise token error kinds can be exposed
#[tokio::test]
async fn test_exposed_token_error_kinds() {
    let mut config = create_test_config();
    config.auth.expose_token_error_kinds = true;
    let (base, _shutdown) = start_server(config).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/auth/verify", base))
        .json(&json!({ "token": "garbage" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "errorKind": "token_malformed" }));
}

/// Test 9: Repeated failures are rate limited with Retry-After
#[tokio::test]
async fn test_login_rate_limited() {
    let (base, _shutdown) = start_server(create_test_config()).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let response = login(&client, &base, "wrong").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = login(&client, &base, "s3cret").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get("retry-after")
        .expect("Retry-After header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(retry_after, 60);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errorKind"], "rate_limited");
}

/// Test 10: Federated login without a provider is a bad request
#[tokio::test]
async fn test_federated_login_not_configured() {
    let (base, _shutdown) = start_server(create_test_config()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/auth/federated/login", base))
        .json(&json!({ "identityRef": "carol", "secret": "pw" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test 11: Metrics snapshot counts logins
#[tokio::test]
async fn test_metrics_endpoint() {
    let (base, _shutdown) = start_server(create_test_config()).await;
    let client = reqwest::Client::new();
    login_token(&client, &base).await;

    let response = client
        .get(format!("{}/metrics", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["logins_succeeded"], 1);
    assert_eq!(body["logins_failed"], 0);
}

/// Test 12: Disabled metrics are not served
#[tokio::test]
async fn test_metrics_disabled() {
    let mut config = create_test_config();
    config.metrics.enabled = false;
    let (base, _shutdown) = start_server(config).await;

    let response = reqwest::get(format!("{}/metrics", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
