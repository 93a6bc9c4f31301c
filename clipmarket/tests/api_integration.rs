//! Integration tests for the HTTP client, retry and cache combinators.
//!
//! Requests go to an in-process axum server bound to an ephemeral port.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{get, post};
use axum::{Json, Router};
use clipmarket::api::{ApiClient, ApiResponse, ResponseCache, RetryPolicy, with_retry};
use clipmarket::auth::{AuthController, StaticCredentials};
use clipmarket::config::{ApiConfig, RuntimeConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Bounty {
    id: u32,
    title: String,
}

#[derive(Clone, Default)]
struct Counters {
    flaky: Arc<AtomicU32>,
    down: Arc<AtomicU32>,
    counted: Arc<AtomicU32>,
}

async fn list_bounties() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": [{ "id": 1, "title": "Clip my stream" }, { "id": 2, "title": "Highlights" }]
    }))
}

async fn bare_bounty() -> Json<Bounty> {
    Json(Bounty {
        id: 3,
        title: "Bare".to_string(),
    })
}

async fn create_bounty(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": body, "message": "created" })),
    )
}

async fn update_bounty(Path(id): Path<u32>, Json(mut body): Json<Value>) -> Json<Value> {
    body["id"] = json!(id);
    Json(json!({ "success": true, "data": body }))
}

async fn delete_bounty(Path(_id): Path<u32>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn missing() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "message": "Bounty not found" })),
    )
}

async fn invalid() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "message": "Validation failed", "errors": ["title is required"] })),
    )
}

async fn plain_error() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn whoami(headers: HeaderMap) -> Json<Value> {
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    Json(json!({ "success": true, "data": auth }))
}

async fn flaky(State(counters): State<Counters>) -> (StatusCode, Json<Value>) {
    let n = counters.flaky.fetch_add(1, Ordering::SeqCst) + 1;
    if n < 3 {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "message": format!("busy ({n})") })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "success": true, "data": n })))
    }
}

async fn down(State(counters): State<Counters>) -> (StatusCode, Json<Value>) {
    let n = counters.down.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "message": format!("down ({n})") })),
    )
}

async fn counted(State(counters): State<Counters>) -> Json<Value> {
    let n = counters.counted.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "success": true, "data": n }))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({ "success": true, "data": null }))
}

/// Start the mock backend; returns its `/api` base URL.
async fn spawn_backend(counters: Counters) -> String {
    let app = Router::new()
        .route("/api/bounties", get(list_bounties).post(create_bounty))
        .route(
            "/api/bounties/{id}",
            axum::routing::put(update_bounty)
                .patch(update_bounty)
                .delete(delete_bounty),
        )
        .route("/api/bare", get(bare_bounty))
        .route("/api/missing", get(missing))
        .route("/api/invalid", post(invalid))
        .route("/api/plain-error", get(plain_error))
        .route("/api/me", get(whoami))
        .route("/api/flaky", get(flaky))
        .route("/api/down", get(down))
        .route("/api/counted", get(counted))
        .route("/api/slow", get(slow))
        .with_state(counters);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn api_config(base_url: String) -> ApiConfig {
    ApiConfig {
        base_url,
        ..Default::default()
    }
}

fn client(base_url: String) -> ApiClient {
    ApiClient::new(
        &api_config(base_url),
        Arc::new(StaticCredentials {
            access_token: Some("tok-9".to_string()),
            user_id: Some("u-9".to_string()),
        }),
    )
}

// ============================================================================
// Envelope
// ============================================================================

#[tokio::test]
async fn test_get_envelope() {
    let client = client(spawn_backend(Counters::default()).await);

    let response: ApiResponse<Vec<Bounty>> = client.get("/bounties").await;
    assert!(response.success);
    assert_eq!(response.data.unwrap().len(), 2);
}

#[tokio::test]
async fn test_bare_body_is_wrapped() {
    let client = client(spawn_backend(Counters::default()).await);

    let response: ApiResponse<Bounty> = client.get("bare").await;
    assert!(response.success);
    assert_eq!(response.data.unwrap().title, "Bare");
}

#[tokio::test]
async fn test_write_verbs() {
    let client = client(spawn_backend(Counters::default()).await);
    let bounty = Bounty {
        id: 0,
        title: "New".to_string(),
    };

    let created: ApiResponse<Bounty> = client.post("/bounties", &bounty).await;
    assert!(created.success);
    assert_eq!(created.message.as_deref(), Some("created"));

    let replaced: ApiResponse<Bounty> = client.put("/bounties/7", &bounty).await;
    assert_eq!(replaced.data.unwrap().id, 7);

    let patched: ApiResponse<Value> = client.patch("/bounties/8", &json!({ "title": "x" })).await;
    assert_eq!(patched.data.unwrap()["id"], 8);

    let deleted: ApiResponse<Value> = client.delete("/bounties/7").await;
    assert!(deleted.success);
    assert!(deleted.data.is_none());
}

#[tokio::test]
async fn test_bearer_token_is_attached() {
    let client = client(spawn_backend(Counters::default()).await);

    let response: ApiResponse<Option<String>> = client.get("/me").await;
    assert_eq!(response.data.flatten().as_deref(), Some("Bearer tok-9"));
}

#[tokio::test]
async fn test_demo_controller_supplies_sentinel_token() {
    let base_url = spawn_backend(Counters::default()).await;
    let auth = Arc::new(AuthController::new(&RuntimeConfig::demo()));
    auth.initialize().await;
    let client = ApiClient::new(&api_config(base_url.clone()), auth);

    let response: ApiResponse<Option<String>> = client.get("/me").await;
    assert_eq!(
        response.data.flatten().as_deref(),
        Some("Bearer demo-access-token")
    );

    let anonymous = ApiClient::anonymous(&api_config(base_url));
    let response: ApiResponse<Option<String>> = anonymous.get("/me").await;
    assert_eq!(response.data.flatten(), None);
}

// ============================================================================
// Failures never escape the envelope
// ============================================================================

#[tokio::test]
async fn test_non_2xx_becomes_failure() {
    let client = client(spawn_backend(Counters::default()).await);

    let response: ApiResponse<Bounty> = client.get("/missing").await;
    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Bounty not found"));

    let response: ApiResponse<Bounty> = client.post("/invalid", &json!({})).await;
    assert_eq!(response.message.as_deref(), Some("Validation failed"));
    assert_eq!(response.errors, Some(vec!["title is required".to_string()]));

    let response: ApiResponse<Bounty> = client.get("/plain-error").await;
    assert_eq!(
        response.message.as_deref(),
        Some("Request failed with status 500")
    );
}

#[tokio::test]
async fn test_unreachable_backend_becomes_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(format!("http://{addr}/api"));
    let response: ApiResponse<Bounty> = client.get("/bounties").await;
    assert!(!response.success);
    assert_eq!(
        response.message.as_deref(),
        Some("Network error. Please check your connection.")
    );
}

#[tokio::test]
async fn test_request_timeout_becomes_failure() {
    let base_url = spawn_backend(Counters::default()).await;
    let client = ApiClient::anonymous(&ApiConfig {
        base_url,
        request_timeout: Duration::from_millis(100),
    });

    let response: ApiResponse<Value> = client.get("/slow").await;
    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("Request timed out"));
}

#[tokio::test]
async fn test_wrong_shape_becomes_failure() {
    let client = client(spawn_backend(Counters::default()).await);

    let response: ApiResponse<Vec<u32>> = client.get("/bare").await;
    assert!(!response.success);
    assert_eq!(
        response.message.as_deref(),
        Some("Unexpected response from server")
    );
}

// ============================================================================
// Combinators over real requests
// ============================================================================

#[tokio::test]
async fn test_retry_recovers_from_transient_failures() {
    let counters = Counters::default();
    let client = client(spawn_backend(counters.clone()).await);

    let response: ApiResponse<u32> = with_retry(RetryPolicy::new(3, Duration::from_millis(10)), || {
        client.get("/flaky")
    })
    .await;

    assert!(response.success);
    assert_eq!(response.data, Some(3));
    assert_eq!(counters.flaky.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_returns_last_failure() {
    let counters = Counters::default();
    let client = client(spawn_backend(counters.clone()).await);

    let response: ApiResponse<u32> = with_retry(RetryPolicy::new(2, Duration::from_millis(10)), || {
        client.get("/down")
    })
    .await;

    assert!(!response.success);
    assert_eq!(response.message.as_deref(), Some("down (2)"));
    assert_eq!(counters.down.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cache_serves_repeat_reads() {
    let counters = Counters::default();
    let client = client(spawn_backend(counters.clone()).await);
    let cache = ResponseCache::new();

    for _ in 0..3 {
        let response: ApiResponse<u32> = cache
            .with_cache("counted", Duration::from_secs(60), || client.get("/counted"))
            .await;
        assert_eq!(response.data, Some(1));
    }
    assert_eq!(counters.counted.load(Ordering::SeqCst), 1);

    cache.invalidate("counted");
    let response: ApiResponse<u32> = cache
        .with_cache("counted", Duration::from_secs(60), || client.get("/counted"))
        .await;
    assert_eq!(response.data, Some(2));
}

#[tokio::test]
async fn test_cache_skips_failed_requests() {
    let counters = Counters::default();
    let client = client(spawn_backend(counters.clone()).await);
    let cache = ResponseCache::new();

    for _ in 0..2 {
        let response: ApiResponse<u32> = cache
            .with_cache("down", Duration::from_secs(60), || client.get("/down"))
            .await;
        assert!(!response.success);
    }
    assert_eq!(counters.down.load(Ordering::SeqCst), 2);
    assert!(cache.is_empty());
}
