//! HTTP handlers for the queue and admin APIs
//!
//! This module converts between the wire protocol and the control-plane
//! operations. Responses are wrapped in a `{success, data}` envelope;
//! failures map to `{error, message, request_id}` with the status codes of
//! the error contract.

use crate::error::{Error, Result};
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use waitroom::activity::{Activity, ActivityUpdate, NewActivity};
use waitroom::admission::{EnterRequest, EnterResponse, StatusRequest, StatusResponse};
use waitroom::base::keys;

/// Response envelope for successful calls
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  pub success: bool,
  pub data: T,
}

impl<T> Envelope<T> {
  fn new(data: T) -> Self {
    Self {
      success: true,
      data,
    }
  }
}

/// POST /api/v1/queue/enter request body
#[derive(Debug, Deserialize)]
pub struct EnterBody {
  pub activity_id: i64,
  pub user_hash: String,
  #[serde(default)]
  pub fingerprint: String,
}

/// POST /api/v1/queue/enter
pub async fn enter_queue(
  State(state): State<AppState>,
  headers: HeaderMap,
  connect_info: Option<ConnectInfo<SocketAddr>>,
  body: std::result::Result<Json<EnterBody>, JsonRejection>,
) -> Result<Json<Envelope<EnterResponse>>> {
  let Json(body) = body.map_err(|e| Error::invalid_request(e.to_string()))?;
  if body.user_hash.trim().is_empty() {
    return Err(Error::invalid_request("user_hash is required"));
  }

  let req = EnterRequest {
    activity_id: body.activity_id,
    user_hash: body.user_hash,
    fingerprint: body.fingerprint,
    ip: client_ip(&headers, connect_info),
  };
  let resp = state.engine.enter(&req).await.map_err(Error::Core)?;
  Ok(Json(Envelope::new(resp)))
}

/// GET /api/v1/queue/status query parameters
#[derive(Debug, Deserialize)]
pub struct StatusParams {
  pub activity_id: i64,
  pub seq: i64,
  pub session_id: String,
}

/// GET /api/v1/queue/status
pub async fn queue_status(
  State(state): State<AppState>,
  params: std::result::Result<Query<StatusParams>, QueryRejection>,
) -> Result<Json<Envelope<StatusResponse>>> {
  let Query(params) = params.map_err(|e| Error::invalid_request(e.to_string()))?;
  let req = StatusRequest {
    activity_id: params.activity_id,
    seq: params.seq,
    session_id: params.session_id,
  };
  let resp = state.engine.status(&req).await.map_err(Error::Core)?;
  Ok(Json(Envelope::new(resp)))
}

/// POST /api/v1/admin/activities response body
#[derive(Debug, Serialize)]
pub struct CreateActivityResponse {
  pub id: i64,
  pub created_at: DateTime<Utc>,
}

/// POST /api/v1/admin/activities
pub async fn create_activity(
  State(state): State<AppState>,
  body: std::result::Result<Json<NewActivity>, JsonRejection>,
) -> Result<Json<Envelope<CreateActivityResponse>>> {
  let Json(body) = body.map_err(|e| Error::invalid_request(e.to_string()))?;
  let activity = state
    .registry
    .create_activity(body)
    .await
    .map_err(Error::Core)?;
  Ok(Json(Envelope::new(CreateActivityResponse {
    id: activity.id,
    created_at: activity.created_at,
  })))
}

/// GET /api/v1/admin/activities query parameters
#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub tenant_id: String,
}

/// GET /api/v1/admin/activities?tenant_id=…
pub async fn list_activities(
  State(state): State<AppState>,
  Query(params): Query<ListParams>,
) -> Result<Json<Envelope<Vec<Activity>>>> {
  let activities = state
    .registry
    .list_activities(&params.tenant_id)
    .await
    .map_err(Error::Core)?;
  Ok(Json(Envelope::new(activities)))
}

/// Realtime queue counters of one activity
#[derive(Debug, Serialize)]
pub struct QueueMetrics {
  pub queue_seq: i64,
  pub release_seq: i64,
  pub queue_length: i64,
  pub active_users: i64,
}

/// Realtime admission statistics of one activity
#[derive(Debug, Serialize)]
pub struct RealtimeStats {
  pub enter_total: i64,
  pub last_updated: DateTime<Utc>,
}

/// GET /api/v1/admin/activities/:id/status response body
#[derive(Debug, Serialize)]
pub struct ActivityStatusResponse {
  pub activity: Activity,
  pub queue_metrics: QueueMetrics,
  pub realtime_stats: RealtimeStats,
}

/// GET /api/v1/admin/activities/:id/status
pub async fn activity_status(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<Json<Envelope<ActivityStatusResponse>>> {
  let activity_id = parse_activity_id(&id)?;
  let activity = state
    .registry
    .get_activity(activity_id)
    .await
    .map_err(Error::Core)?;

  let tenant = activity.tenant_id.as_str();
  let queue_seq = state
    .store
    .get_int(&keys::queue_seq_key(tenant, activity_id))
    .await
    .map_err(Error::Core)?
    .unwrap_or(0);
  let release_seq = state
    .store
    .get_int(&keys::release_seq_key(tenant, activity_id))
    .await
    .map_err(Error::Core)?
    .unwrap_or(0);
  let active_users = state
    .store
    .pfcount(&keys::active_users_key(tenant, activity_id))
    .await
    .map_err(Error::Core)?;
  let enter_total = state
    .store
    .get_int(&keys::metrics_key(tenant, activity_id, "enter_total"))
    .await
    .map_err(Error::Core)?
    .unwrap_or(0);

  Ok(Json(Envelope::new(ActivityStatusResponse {
    activity,
    queue_metrics: QueueMetrics {
      queue_seq,
      release_seq,
      queue_length: (queue_seq - release_seq).max(0),
      active_users,
    },
    realtime_stats: RealtimeStats {
      enter_total,
      last_updated: Utc::now(),
    },
  })))
}

/// PUT /api/v1/admin/activities/:id request body
#[derive(Debug, Deserialize)]
pub struct UpdateBody {
  pub status: Option<String>,
  pub release_rate: Option<u32>,
}

/// PUT /api/v1/admin/activities/:id
pub async fn update_activity(
  State(state): State<AppState>,
  Path(id): Path<String>,
  body: std::result::Result<Json<UpdateBody>, JsonRejection>,
) -> Result<Json<Envelope<serde_json::Value>>> {
  let activity_id = parse_activity_id(&id)?;
  let Json(body) = body.map_err(|e| Error::invalid_request(e.to_string()))?;

  let status = body
    .status
    .map(|s| {
      s.parse::<waitroom::activity::ActivityStatus>()
        .map_err(|_| Error::invalid_request(format!("unknown status: {s}")))
    })
    .transpose()?;

  if status.is_none() && body.release_rate.is_none() {
    return Err(Error::Core(waitroom::error::Error::NoFieldsToUpdate));
  }

  if let Some(rate) = body.release_rate {
    if rate > state.config.queue.max_release_rate {
      return Err(Error::invalid_request(format!(
        "release_rate exceeds maximum of {}",
        state.config.queue.max_release_rate
      )));
    }
    // Persists to the registry and patches the live scheduler task
    state
      .scheduler
      .update_release_rate(activity_id, rate)
      .await
      .map_err(Error::Core)?;
  }

  if let Some(status) = status {
    state
      .registry
      .update_activity(
        activity_id,
        ActivityUpdate {
          status: Some(status),
          ..Default::default()
        },
      )
      .await
      .map_err(Error::Core)?;
  }

  Ok(Json(Envelope::new(serde_json::json!({ "id": activity_id }))))
}

/// Extract the client IP: X-Forwarded-For, else X-Real-IP, else peer
/// address
fn client_ip(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
  if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
    if let Some(first) = forwarded.split(',').next() {
      let ip = first.trim();
      if !ip.is_empty() {
        return ip.to_string();
      }
    }
  }
  if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
    if !real_ip.trim().is_empty() {
      return real_ip.trim().to_string();
    }
  }
  connect_info
    .map(|ConnectInfo(addr)| addr.ip().to_string())
    .unwrap_or_default()
}

fn parse_activity_id(raw: &str) -> Result<i64> {
  raw
    .parse::<i64>()
    .ok()
    .filter(|id| *id > 0)
    .ok_or_else(|| Error::InvalidActivityId(raw.to_string()))
}
