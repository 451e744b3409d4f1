//! 错误处理模块
//! Error handling module
//!
//! 定义了 Waitroom 库中使用的各种错误类型
//! Defines the error types used across the Waitroom library

use thiserror::Error;

/// Waitroom 库的结果类型
/// Result type for the Waitroom library
pub type Result<T> = std::result::Result<T, Error>;

/// Waitroom 错误类型
/// Waitroom error type
#[derive(Error, Debug)]
pub enum Error {
  /// Redis 连接或命令错误
  /// Redis connection or command error
  #[error("Redis error: {0}")]
  Redis(#[from] redis::RedisError),

  /// SeaORM 数据库错误
  /// SeaORM database error
  #[error("Database error: {0}")]
  Database(#[from] sea_orm::DbErr),

  /// 序列化错误
  /// Serialization error
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// IO 错误
  /// IO error
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  /// 活动不存在
  /// Activity not found
  #[error("Activity not found: {activity_id}")]
  ActivityNotFound { activity_id: i64 },

  /// 活动不在可进入状态（未开始、已暂停或已结束）
  /// Activity is not admitting (not started, paused or ended)
  #[error("Activity {activity_id} is not active")]
  ActivityNotActive { activity_id: i64 },

  /// 同一用户已持有序号
  /// The same user already holds a seq
  #[error("User is already in the queue")]
  UserAlreadyInQueue,

  /// IP 在窗口内的进入尝试超限
  /// Enter attempts from one IP exceeded the window limit
  #[error("Rate limit exceeded")]
  RateLimitExceeded,

  /// 会话绑定缺失或与提交的序号不一致
  /// Session binding is missing or disagrees with the submitted seq
  #[error("Invalid sequence number")]
  InvalidSequence,

  /// 活动时间窗口非法（end_at ≤ start_at）
  /// Invalid activity time window (end_at ≤ start_at)
  #[error("end_at must be after start_at")]
  InvalidTimeRange,

  /// 缺少租户 ID
  /// Missing tenant id
  #[error("tenant_id is required")]
  MissingTenantId,

  /// 更新请求没有携带任何字段
  /// Update request carries no fields
  #[error("No fields to update")]
  NoFieldsToUpdate,

  /// 请求验证失败
  /// Request validation failure
  #[error("Invalid request: {message}")]
  InvalidRequest { message: String },

  /// 配置错误
  /// Configuration error
  #[error("Configuration error: {message}")]
  Config { message: String },

  /// 其他错误
  /// Other error
  #[error("{message}")]
  Other { message: String },
}

impl Error {
  /// 创建请求验证错误
  /// Create a request validation error
  pub fn invalid_request<S: Into<String>>(message: S) -> Self {
    Self::InvalidRequest {
      message: message.into(),
    }
  }

  /// 创建配置错误
  /// Create a configuration error
  pub fn config<S: Into<String>>(message: S) -> Self {
    Self::Config {
      message: message.into(),
    }
  }

  /// 创建其他错误
  /// Create another type of error
  pub fn other<S: Into<String>>(message: S) -> Self {
    Self::Other {
      message: message.into(),
    }
  }

  /// 对外错误码，HTTP 层按它映射状态码
  /// Wire error code; the HTTP layer maps status codes from it
  pub fn code(&self) -> &'static str {
    match self {
      Error::ActivityNotFound { .. } => "ACTIVITY_NOT_FOUND",
      Error::ActivityNotActive { .. } => "ACTIVITY_NOT_ACTIVE",
      Error::UserAlreadyInQueue => "USER_ALREADY_IN_QUEUE",
      Error::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
      Error::InvalidSequence => "INVALID_SEQUENCE",
      Error::InvalidTimeRange => "INVALID_TIME_RANGE",
      Error::MissingTenantId => "MISSING_TENANT_ID",
      Error::NoFieldsToUpdate => "NO_FIELDS_TO_UPDATE",
      Error::InvalidRequest { .. } => "INVALID_REQUEST",
      Error::Redis(_)
      | Error::Database(_)
      | Error::Serialization(_)
      | Error::Io(_)
      | Error::Config { .. }
      | Error::Other { .. } => "INTERNAL_ERROR",
    }
  }

  /// 检查是否为可重试的瞬时基础设施错误
  /// Check whether this is a retriable transient infrastructure error
  ///
  /// 策略类错误（去重、节流、状态）是终态，重试不会改变结果；
  /// 基础设施错误在下一个 tick / 下一次请求重试。
  /// Policy errors (dedupe, throttle, state) are terminal, retrying cannot
  /// change the outcome; infrastructure errors retry on the next tick or
  /// next request.
  pub fn is_retriable(&self) -> bool {
    matches!(self, Error::Redis(_) | Error::Database(_) | Error::Io(_))
  }
}
