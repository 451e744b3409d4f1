//! 后端抽象模块
//! Backend abstraction module
//!
//! 定义了与计数存储和活动目录交互的抽象层
//! Defines the abstraction layers for the counter store and the activity
//! registry

use crate::activity::{Activity, ActivityUpdate, NewActivity, QueueEntry};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub mod constants;
pub mod keys;

/// 计数存储特性，准入与释放的唯一事实来源
/// Counter store trait, the single source of truth for admission and release
///
/// 所有操作以稳定字符串为键（见 [`keys`]）。正确性只依赖
/// `incr` 的原子性；其余操作可以是尽力而为的。
/// All operations are keyed by stable strings (see [`keys`]). Correctness
/// relies only on the atomicity of `incr`; everything else may be
/// best-effort.
#[async_trait]
pub trait CounterStore: Send + Sync {
  /// 探测连接
  /// Probe the connection
  async fn ping(&self) -> Result<()>;

  /// 原子自增并返回新值
  /// Atomically increment and return the new value
  async fn incr(&self, key: &str) -> Result<i64>;

  /// 原子加上 delta 并返回新值
  /// Atomically add delta and return the new value
  async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

  /// 读取整数值；键不存在时返回 None
  /// Read an integer value; None when the key does not exist
  async fn get_int(&self, key: &str) -> Result<Option<i64>>;

  /// 写入整数值，可选 TTL
  /// Write an integer value with an optional TTL
  async fn set_int(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()>;

  /// 写入字符串值，可选 TTL（调度器状态等非数值键）
  /// Write a string value with an optional TTL (scheduler status and other
  /// non-numeric keys)
  async fn set_str(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

  /// 读取字符串值；键不存在时返回 None
  /// Read a string value; None when the key does not exist
  async fn get_str(&self, key: &str) -> Result<Option<String>>;

  /// 为已有键设置过期时间
  /// Set an expiry on an existing key
  async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

  /// 向集合添加成员并刷新集合 TTL
  /// Add a member to a set and refresh the set TTL
  async fn sadd(&self, key: &str, member: &str, ttl: Duration) -> Result<()>;

  /// 检查集合成员
  /// Check set membership
  async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

  /// 向近似基数草图插入一个元素
  /// Insert an element into the approximate cardinality sketch
  async fn pfadd(&self, key: &str, element: &str) -> Result<()>;

  /// 读取近似基数
  /// Read the approximate cardinality
  async fn pfcount(&self, key: &str) -> Result<i64>;

  /// 向有界列表头部推入一条记录：LPUSH + LTRIM(keep) + EXPIRE
  /// Push a record onto a bounded list: LPUSH + LTRIM(keep) + EXPIRE
  async fn push_event(&self, key: &str, payload: &str, keep: usize, ttl: Duration) -> Result<()>;

  /// 读取列表头部最多 count 条记录，最新在前
  /// Read up to count records from the list head, newest first
  async fn recent_events(&self, key: &str, count: usize) -> Result<Vec<String>>;

  /// 删除键
  /// Delete a key
  async fn del(&self, key: &str) -> Result<()>;
}

/// 活动目录特性，活动元数据的持久事实来源
/// Activity registry trait, the durable source of truth for activity
/// metadata
///
/// 目录同时承载尽力而为的队列进入审计记录；它不是准入的
/// 事实来源，丢失一条记录不影响正确性。
/// The registry also carries the best-effort enqueue audit records; it is
/// not the source of truth for admission, and a lost record does not affect
/// correctness.
#[async_trait]
pub trait ActivityRegistry: Send + Sync {
  /// 创建活动；校验时间窗口并填充默认配置
  /// Create an activity; validates the time window and applies config
  /// defaults
  async fn create_activity(&self, activity: NewActivity) -> Result<Activity>;

  /// 按 ID 查找活动
  /// Look up an activity by id
  async fn get_activity(&self, activity_id: i64) -> Result<Activity>;

  /// 列出某租户的全部活动，按创建时间倒序
  /// List a tenant's activities, newest first
  async fn list_activities(&self, tenant_id: &str) -> Result<Vec<Activity>>;

  /// 列出当前可进入的活动（status = active 且窗口覆盖 now）
  /// List activities that are currently live (status = active and the
  /// window covers now)
  async fn list_live_activities(&self) -> Result<Vec<Activity>>;

  /// 部分更新；空更新返回 NoFieldsToUpdate
  /// Partial update; an empty update returns NoFieldsToUpdate
  async fn update_activity(&self, activity_id: i64, update: ActivityUpdate) -> Result<()>;

  /// 写入队列进入审计记录；(activity_id, session_id) 冲突时静默忽略
  /// Write an enqueue audit record; silently ignored on
  /// (activity_id, session_id) conflict
  async fn record_queue_entry(&self, entry: &QueueEntry) -> Result<()>;
}
