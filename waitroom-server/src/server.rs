//! Router assembly and serving
//!
//! Builds the axum router with tracing, CORS and request-timeout layers and
//! serves it with peer-address information for the throttle fallback.

use crate::handlers;
use crate::state::AppState;
use axum::routing::{get, post, put};
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the API router
pub fn router(state: AppState) -> Router {
  let read_timeout = Duration::from_secs(state.config.server.read_timeout);
  Router::new()
    .route("/api/v1/queue/enter", post(handlers::enter_queue))
    .route("/api/v1/queue/status", get(handlers::queue_status))
    .route(
      "/api/v1/admin/activities",
      post(handlers::create_activity).get(handlers::list_activities),
    )
    .route(
      "/api/v1/admin/activities/:id/status",
      get(handlers::activity_status),
    )
    .route("/api/v1/admin/activities/:id", put(handlers::update_activity))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .layer(TimeoutLayer::new(read_timeout))
    .with_state(state)
}

/// Serve the API until the shutdown future resolves
pub async fn run(
  state: AppState,
  shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
  let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server.port));
  let app = router(state);

  let listener = tokio::net::TcpListener::bind(addr).await?;
  info!("Listening on {}", addr);
  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .with_graceful_shutdown(shutdown)
  .await?;
  Ok(())
}
