//! Waitroom server binary
//!
//! A standalone waiting-room server: HTTP admission API plus the release
//! scheduler, configured from QUEUE_-prefixed environment variables.

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use waitroom::config::Config;
use waitroom_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialize logging
  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(
      EnvFilter::from_default_env()
        .add_directive("waitroom=info".parse()?)
        .add_directive("waitroom_server=info".parse()?),
    )
    .init();

  let config = Config::from_env()?;
  info!(port = config.server.port, "Starting waitroom-server");

  let state = AppState::from_config(config).await?;

  // The scheduler runs for the lifetime of the process, next to the API
  state.scheduler.start().await?;

  let scheduler = state.scheduler.clone();
  waitroom_server::run(state, async {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
  })
  .await?;

  // Wait for every release task before exiting
  scheduler.stop().await;
  info!("waitroom-server stopped");
  Ok(())
}
