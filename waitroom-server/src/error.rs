//! Error types for waitroom-server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Result type for waitroom-server
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for waitroom-server
#[derive(Error, Debug)]
pub enum Error {
  /// Core library error
  #[error(transparent)]
  Core(#[from] waitroom::error::Error),

  /// Malformed request rejected at ingress
  #[error("Invalid request: {0}")]
  InvalidRequest(String),

  /// Activity id path segment is not a positive integer
  #[error("Invalid activity id: {0}")]
  InvalidActivityId(String),
}

impl Error {
  /// Create an ingress validation error
  pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
    Self::InvalidRequest(msg.into())
  }

  /// Wire error code
  pub fn code(&self) -> &'static str {
    match self {
      Self::Core(e) => e.code(),
      Self::InvalidRequest(_) => "INVALID_REQUEST",
      Self::InvalidActivityId(_) => "INVALID_ACTIVITY_ID",
    }
  }

  /// HTTP status for the wire error code
  pub fn status(&self) -> StatusCode {
    match self.code() {
      "INVALID_REQUEST" | "INVALID_ACTIVITY_ID" | "INVALID_SEQUENCE" | "INVALID_TIME_RANGE"
      | "MISSING_TENANT_ID" | "NO_FIELDS_TO_UPDATE" => StatusCode::BAD_REQUEST,
      "ACTIVITY_NOT_FOUND" => StatusCode::NOT_FOUND,
      "ACTIVITY_NOT_ACTIVE" | "USER_ALREADY_IN_QUEUE" => StatusCode::CONFLICT,
      "RATE_LIMIT_EXCEEDED" => StatusCode::TOO_MANY_REQUESTS,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
      tracing::error!(error = %self, "Request failed");
    }
    let body = json!({
      "error": self.code(),
      "message": self.to_string(),
      "request_id": Uuid::new_v4().to_string(),
    });
    (status, Json(body)).into_response()
  }
}
