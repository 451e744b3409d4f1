//! Shared application state and backend wiring

use std::sync::Arc;
use waitroom::admission::AdmissionEngine;
use waitroom::base::{ActivityRegistry, CounterStore};
use waitroom::config::Config;
use waitroom::memdb::MemoryStore;
use waitroom::rdb::RedisStore;
use waitroom::redis::RedisConnectionType;
use waitroom::registry::{MemoryRegistry, PostgresRegistry};
use waitroom::scheduler::ReleaseScheduler;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
  pub engine: Arc<AdmissionEngine>,
  pub registry: Arc<dyn ActivityRegistry>,
  pub store: Arc<dyn CounterStore>,
  pub scheduler: Arc<ReleaseScheduler>,
  pub config: Arc<Config>,
}

impl AppState {
  /// Build the state from already-constructed backends
  pub fn new(
    store: Arc<dyn CounterStore>,
    registry: Arc<dyn ActivityRegistry>,
    config: Config,
  ) -> Self {
    let engine = Arc::new(AdmissionEngine::new(
      store.clone(),
      registry.clone(),
      config.queue.clone(),
    ));
    let scheduler = Arc::new(ReleaseScheduler::new(store.clone(), registry.clone()));
    Self {
      engine,
      registry,
      store,
      scheduler,
      config: Arc::new(config),
    }
  }

  /// Build the state from configuration, selecting backends by environment
  ///
  /// `QUEUE_BACKEND=memory` runs everything in-process (no Redis, no
  /// PostgresSQL); otherwise the counter store is Redis and the registry is
  /// PostgresSQL when a DSN is configured, in-memory when not.
  pub async fn from_config(config: Config) -> anyhow::Result<Self> {
    let backend = std::env::var("QUEUE_BACKEND").unwrap_or_default();

    let store: Arc<dyn CounterStore> = if backend.eq_ignore_ascii_case("memory") {
      tracing::warn!("Using in-memory counter store; state is lost on restart");
      Arc::new(MemoryStore::new())
    } else {
      let redis_config = RedisConnectionType::single(config.redis.url.as_str())?;
      let store = RedisStore::new(redis_config).await?;
      store.ping().await?;
      tracing::info!(url = %config.redis.url, "Connected to Redis counter store");
      Arc::new(store)
    };

    let registry: Arc<dyn ActivityRegistry> = if backend.eq_ignore_ascii_case("memory") {
      Arc::new(MemoryRegistry::new())
    } else {
      match &config.database.dsn {
        Some(dsn) => {
          let registry = PostgresRegistry::new(dsn).await?;
          tracing::info!("Connected to PostgresSQL activity registry");
          Arc::new(registry)
        }
        None => {
          tracing::warn!("No QUEUE_DATABASE_DSN set; using in-memory activity registry");
          Arc::new(MemoryRegistry::new())
        }
      }
    };

    Ok(Self::new(store, registry, config))
  }
}
