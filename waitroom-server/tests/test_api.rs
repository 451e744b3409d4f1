//! API surface tests driving the router over in-memory backends

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use waitroom::base::CounterStore;
use waitroom::config::Config;
use waitroom::memdb::MemoryStore;
use waitroom::registry::MemoryRegistry;
use waitroom_server::{router, AppState};

fn test_app() -> (Router, AppState) {
  let state = AppState::new(
    Arc::new(MemoryStore::new()),
    Arc::new(MemoryRegistry::new()),
    Config::default(),
  );
  (router(state.clone()), state)
}

fn test_router() -> Router {
  test_app().0
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
  let response = app.clone().oneshot(req).await.unwrap();
  let status = response.status();
  let bytes = response.into_body().collect().await.unwrap().to_bytes();
  let body: Value = serde_json::from_slice(&bytes).unwrap();
  (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
  Request::builder()
    .method(method)
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
  Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Create an activity over the API and flip it to active
async fn create_live_activity(app: &Router) -> i64 {
  let now = Utc::now();
  let (status, body) = send(
    app,
    json_request(
      "POST",
      "/api/v1/admin/activities",
      json!({
        "tenant_id": "acme",
        "name": "flash sale",
        "sku": "SKU-1",
        "initial_stock": 100,
        "start_at": (now - Duration::minutes(1)).to_rfc3339(),
        "end_at": (now + Duration::hours(1)).to_rfc3339(),
      }),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["success"], json!(true));
  let id = body["data"]["id"].as_i64().unwrap();

  let (status, _) = send(
    app,
    json_request(
      "PUT",
      &format!("/api/v1/admin/activities/{id}"),
      json!({"status": "active"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  id
}

#[tokio::test]
async fn test_enter_and_status_roundtrip() {
  let app = test_router();
  let id = create_live_activity(&app).await;

  let (status, body) = send(
    &app,
    json_request(
      "POST",
      "/api/v1/queue/enter",
      json!({"activity_id": id, "user_hash": "u1", "fingerprint": "fp"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["seq"], json!(1));
  let session_id = body["data"]["session_id"].as_str().unwrap().to_string();
  assert_eq!(session_id.len(), 16);

  let (status, body) = send(
    &app,
    get_request(&format!(
      "/api/v1/queue/status?activity_id={id}&seq=1&session_id={session_id}"
    )),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["state"], json!("waiting"));
  assert_eq!(body["data"]["position"], json!(1));
  assert_eq!(body["data"]["queue_seq"], json!(1));
  assert_eq!(body["data"]["release_seq"], json!(0));
}

#[tokio::test]
async fn test_enter_unknown_activity_is_404() {
  let app = test_router();
  let (status, body) = send(
    &app,
    json_request(
      "POST",
      "/api/v1/queue/enter",
      json!({"activity_id": 999, "user_hash": "u1"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["error"], json!("ACTIVITY_NOT_FOUND"));
  assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_enter_draft_activity_is_409() {
  let app = test_router();
  let now = Utc::now();
  let (_, body) = send(
    &app,
    json_request(
      "POST",
      "/api/v1/admin/activities",
      json!({
        "tenant_id": "acme",
        "name": "drop",
        "sku": "SKU-2",
        "initial_stock": 1,
        "start_at": now.to_rfc3339(),
        "end_at": (now + Duration::hours(1)).to_rfc3339(),
      }),
    ),
  )
  .await;
  let id = body["data"]["id"].as_i64().unwrap();

  let (status, body) = send(
    &app,
    json_request(
      "POST",
      "/api/v1/queue/enter",
      json!({"activity_id": id, "user_hash": "u1"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"], json!("ACTIVITY_NOT_ACTIVE"));
}

#[tokio::test]
async fn test_same_session_rejoin_is_idempotent() {
  let app = test_router();
  let id = create_live_activity(&app).await;

  let (status, first) = send(
    &app,
    json_request(
      "POST",
      "/api/v1/queue/enter",
      json!({"activity_id": id, "user_hash": "u1"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let (status, second) = send(
    &app,
    json_request(
      "POST",
      "/api/v1/queue/enter",
      json!({"activity_id": id, "user_hash": "u1"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(first["data"]["seq"], second["data"]["seq"]);
  assert_eq!(first["data"]["session_id"], second["data"]["session_id"]);
}

#[tokio::test]
async fn test_duplicate_user_with_new_session_is_409() {
  let (app, state) = test_app();
  let id = create_live_activity(&app).await;

  let (status, first) = send(
    &app,
    json_request(
      "POST",
      "/api/v1/queue/enter",
      json!({"activity_id": id, "user_hash": "u1"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  // Simulate the hour boundary: the session binding disappears while the
  // dedupe set still holds the user
  let session_id = first["data"]["session_id"].as_str().unwrap();
  state
    .store
    .del(&waitroom::base::keys::user_queue_key("acme", id, session_id))
    .await
    .unwrap();

  let (status, body) = send(
    &app,
    json_request(
      "POST",
      "/api/v1/queue/enter",
      json!({"activity_id": id, "user_hash": "u1"}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"], json!("USER_ALREADY_IN_QUEUE"));
}

#[tokio::test]
async fn test_throttle_returns_429() {
  let app = test_router();
  let id = create_live_activity(&app).await;

  for i in 0..10 {
    let mut req = json_request(
      "POST",
      "/api/v1/queue/enter",
      json!({"activity_id": id, "user_hash": format!("user-{i}")}),
    );
    req
      .headers_mut()
      .insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
  }

  let mut req = json_request(
    "POST",
    "/api/v1/queue/enter",
    json!({"activity_id": id, "user_hash": "user-10"}),
  );
  req
    .headers_mut()
    .insert("x-forwarded-for", "203.0.113.9".parse().unwrap());
  let (status, body) = send(&app, req).await;
  assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
  assert_eq!(body["error"], json!("RATE_LIMIT_EXCEEDED"));
}

#[tokio::test]
async fn test_status_with_wrong_session_is_400() {
  let app = test_router();
  let id = create_live_activity(&app).await;

  let (status, body) = send(
    &app,
    get_request(&format!(
      "/api/v1/queue/status?activity_id={id}&seq=1&session_id=0000000000000000"
    )),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], json!("INVALID_SEQUENCE"));
}

#[tokio::test]
async fn test_admin_validation_errors() {
  let app = test_router();

  // Listing without a tenant id
  let (status, body) = send(&app, get_request("/api/v1/admin/activities")).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], json!("MISSING_TENANT_ID"));

  // Inverted time window
  let now = Utc::now();
  let (status, body) = send(
    &app,
    json_request(
      "POST",
      "/api/v1/admin/activities",
      json!({
        "tenant_id": "acme",
        "name": "drop",
        "sku": "SKU-3",
        "initial_stock": 1,
        "start_at": now.to_rfc3339(),
        "end_at": (now - Duration::hours(1)).to_rfc3339(),
      }),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], json!("INVALID_TIME_RANGE"));

  // Empty update
  let id = create_live_activity(&app).await;
  let (status, body) = send(
    &app,
    json_request("PUT", &format!("/api/v1/admin/activities/{id}"), json!({})),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], json!("NO_FIELDS_TO_UPDATE"));

  // Non-numeric activity id
  let (status, body) = send(
    &app,
    json_request(
      "PUT",
      "/api/v1/admin/activities/abc",
      json!({"release_rate": 5}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], json!("INVALID_ACTIVITY_ID"));
}

#[tokio::test]
async fn test_admin_snapshot_reflects_queue() {
  let app = test_router();
  let id = create_live_activity(&app).await;

  for i in 0..3 {
    let (status, _) = send(
      &app,
      json_request(
        "POST",
        "/api/v1/queue/enter",
        json!({"activity_id": id, "user_hash": format!("user-{i}")}),
      ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
  }

  let (status, body) = send(
    &app,
    get_request(&format!("/api/v1/admin/activities/{id}/status")),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["queue_metrics"]["queue_seq"], json!(3));
  assert_eq!(body["data"]["queue_metrics"]["queue_length"], json!(3));
  assert_eq!(body["data"]["queue_metrics"]["active_users"], json!(3));
  assert_eq!(body["data"]["activity"]["status"], json!("active"));
}

#[tokio::test]
async fn test_update_release_rate_persists() {
  let app = test_router();
  let id = create_live_activity(&app).await;

  let (status, _) = send(
    &app,
    json_request(
      "PUT",
      &format!("/api/v1/admin/activities/{id}"),
      json!({"release_rate": 25}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);

  let (_, body) = send(&app, get_request("/api/v1/admin/activities?tenant_id=acme")).await;
  assert_eq!(body["data"][0]["config"]["release_rate"], json!(25));
}

#[tokio::test]
async fn test_release_rate_cap_enforced() {
  let app = test_router();
  let id = create_live_activity(&app).await;

  let (status, body) = send(
    &app,
    json_request(
      "PUT",
      &format!("/api/v1/admin/activities/{id}"),
      json!({"release_rate": 100_000}),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], json!("INVALID_REQUEST"));
}
