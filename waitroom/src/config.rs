//! 配置模块
//! Configuration module
//!
//! 定义了服务与队列的配置选项；所有字段可用 QUEUE_ 前缀的
//! 环境变量覆盖。
//! Defines service and queue configuration options; every field can be
//! overridden with a QUEUE_-prefixed environment variable.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP 服务配置
/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
  /// 监听端口
  /// Listen port
  pub port: u16,
  /// 读超时（秒）
  /// Read timeout (seconds)
  pub read_timeout: u64,
  /// 写超时（秒）
  /// Write timeout (seconds)
  pub write_timeout: u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      port: 8080,
      read_timeout: 10,
      write_timeout: 10,
    }
  }
}

/// 计数存储（Redis）配置
/// Counter store (Redis) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
  /// 连接 URL，含可选的认证信息
  /// Connection URL including optional auth
  pub url: String,
}

impl Default for RedisConfig {
  fn default() -> Self {
    Self {
      url: "redis://127.0.0.1:6379".to_string(),
    }
  }
}

/// 活动目录（PostgresSQL）配置
/// Activity registry (PostgresSQL) configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
  /// 连接 DSN；为空时使用内存目录
  /// Connection DSN; the in-memory registry is used when empty
  pub dsn: Option<String>,
}

/// 队列行为配置
/// Queue behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
  /// 会话绑定与去重集合的默认 TTL（秒）
  /// Default TTL of session bindings and the dedupe set (seconds)
  pub default_ttl: u64,
  /// 客户端默认轮询间隔（毫秒）
  /// Default client poll interval (milliseconds)
  pub default_poll_interval: u64,
  /// 管理端可设置的最大释放速率（每秒）
  /// Maximum admin-settable release rate (per second)
  pub max_release_rate: u32,
  /// IP 哈希盐
  /// Salt for IP hashing
  pub ip_salt: String,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      default_ttl: 4 * 3600,
      default_poll_interval: 2000,
      max_release_rate: 1000,
      ip_salt: "salt".to_string(),
    }
  }
}

impl QueueConfig {
  /// 会话 TTL 的 Duration 形式
  /// Session TTL as a Duration
  pub fn session_ttl(&self) -> Duration {
    Duration::from_secs(self.default_ttl)
  }
}

/// 顶层配置
/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  pub redis: RedisConfig,
  pub database: DatabaseConfig,
  pub queue: QueueConfig,
}

impl Config {
  /// 创建默认配置
  /// Create the default configuration
  pub fn new() -> Self {
    Self::default()
  }

  /// 从环境变量加载配置，未设置的变量保留默认值
  /// Load configuration from environment variables, keeping defaults for
  /// unset ones
  pub fn from_env() -> Result<Self> {
    let mut config = Self::default();

    if let Some(port) = read_env("QUEUE_SERVER_PORT")? {
      config.server.port = port;
    }
    if let Some(timeout) = read_env("QUEUE_READ_TIMEOUT")? {
      config.server.read_timeout = timeout;
    }
    if let Some(timeout) = read_env("QUEUE_WRITE_TIMEOUT")? {
      config.server.write_timeout = timeout;
    }
    if let Ok(url) = std::env::var("QUEUE_REDIS_URL") {
      config.redis.url = url;
    }
    if let Ok(dsn) = std::env::var("QUEUE_DATABASE_DSN") {
      if !dsn.is_empty() {
        config.database.dsn = Some(dsn);
      }
    }
    if let Some(ttl) = read_env("QUEUE_DEFAULT_TTL")? {
      config.queue.default_ttl = ttl;
    }
    if let Some(interval) = read_env("QUEUE_DEFAULT_POLL_INTERVAL")? {
      config.queue.default_poll_interval = interval;
    }
    if let Some(rate) = read_env("QUEUE_MAX_RELEASE_RATE")? {
      config.queue.max_release_rate = rate;
    }
    if let Ok(salt) = std::env::var("QUEUE_IP_SALT") {
      config.queue.ip_salt = salt;
    }

    Ok(config)
  }
}

/// 读取并解析一个环境变量；缺失返回 None，解析失败返回配置错误
/// Read and parse one environment variable; None when missing, a config
/// error when unparsable
fn read_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
  match std::env::var(name) {
    Ok(raw) => raw
      .parse::<T>()
      .map(Some)
      .map_err(|_| Error::config(format!("invalid value for {name}: {raw}"))),
    Err(_) => Ok(None),
  }
}
