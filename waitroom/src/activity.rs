//! 活动领域模型
//! Activity domain model
//!
//! 一个活动是一次有自己队列和时间窗口的抢购/发售，
//! 所有键空间都由 (tenant_id, activity_id) 限定。
//! An activity is a single sale/drop with its own queue and time window;
//! every keyspace is scoped by (tenant_id, activity_id).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 活动生命周期状态
/// Activity lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
  /// 草稿，尚未开放
  /// Draft, not yet open
  Draft,
  /// 接受进入
  /// Admitting entries
  Active,
  /// 暂停进入，队列保留
  /// Admission paused, queue retained
  Paused,
  /// 已结束，活动从不删除
  /// Ended; activities are never deleted
  Ended,
}

impl ActivityStatus {
  /// 将状态转换为字符串
  /// Convert the status to a string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Draft => "draft",
      Self::Active => "active",
      Self::Paused => "paused",
      Self::Ended => "ended",
    }
  }
}

impl FromStr for ActivityStatus {
  type Err = ();

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s {
      "draft" => Ok(Self::Draft),
      "active" => Ok(Self::Active),
      "paused" => Ok(Self::Paused),
      "ended" => Ok(Self::Ended),
      _ => Err(()),
    }
  }
}

impl std::fmt::Display for ActivityStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// 活动的释放与轮询配置
/// Release and polling configuration of an activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityConfig {
  /// 每秒释放的名额数
  /// Positions released per second
  pub release_rate: u32,
  /// 客户端默认轮询间隔（毫秒），同时是自适应轮询的上限
  /// Default client poll interval (ms), also the adaptive polling ceiling
  pub poll_interval: u64,
  /// 下游并发上限（透传给下游，控制面不执行）
  /// Downstream concurrency cap (passed through, not enforced here)
  pub max_concurrent: u32,
  /// 是否启用 IP 节流
  /// Whether the IP throttle is enabled
  pub enable_throttle: bool,
}

impl Default for ActivityConfig {
  fn default() -> Self {
    Self {
      release_rate: crate::base::constants::DEFAULT_RELEASE_RATE,
      poll_interval: crate::base::constants::DEFAULT_POLL_INTERVAL_MS,
      max_concurrent: 0,
      enable_throttle: true,
    }
  }
}

/// 活动
/// Activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
  pub id: i64,
  pub tenant_id: String,
  pub name: String,
  pub sku: String,
  pub initial_stock: i32,
  pub start_at: DateTime<Utc>,
  pub end_at: DateTime<Utc>,
  pub status: ActivityStatus,
  pub config: ActivityConfig,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Activity {
  /// 准入引擎只在 status = active 且时间窗口覆盖 now 时视活动为可进入
  /// The admission engine treats an activity as live only when
  /// status = active and the time window covers now
  pub fn is_live(&self, now: DateTime<Utc>) -> bool {
    self.status == ActivityStatus::Active && self.start_at <= now && now < self.end_at
  }
}

/// 创建活动的输入
/// Input for creating an activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
  pub tenant_id: String,
  pub name: String,
  pub sku: String,
  pub initial_stock: i32,
  pub start_at: DateTime<Utc>,
  pub end_at: DateTime<Utc>,
  #[serde(default)]
  pub config: Option<ActivityConfig>,
}

/// 活动的部分更新；所有字段可选，空更新被拒绝
/// Partial activity update; all fields optional, an empty update is rejected
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityUpdate {
  pub status: Option<ActivityStatus>,
  pub release_rate: Option<u32>,
}

impl ActivityUpdate {
  pub fn is_empty(&self) -> bool {
    self.status.is_none() && self.release_rate.is_none()
  }
}

/// 成功进入队列后的持久审计记录
/// Durable audit record written after a successful enqueue
///
/// 这是审计痕迹，不是准入的事实来源；计数存储才是。
/// This is an audit trail, not the source of truth for admission; the
/// counter store is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
  pub activity_id: i64,
  pub user_hash: String,
  pub session_id: String,
  pub seq_number: i64,
  pub fingerprint: String,
  pub ip_hash: String,
  pub created_at: DateTime<Utc>,
}

/// 调度器释放一批名额时写入事件环的记录
/// Record pushed to the event ring when the scheduler releases a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseEvent {
  pub activity_id: i64,
  pub tenant_id: String,
  pub prev_seq: i64,
  pub new_seq: i64,
  pub release_count: i64,
  pub timestamp: DateTime<Utc>,
  /// 每秒释放速率；-1 表示手动释放
  /// Release rate per second; -1 marks a manual release
  pub release_rate: i64,
}

/// 客户端在队列里的状态
/// Client state within the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
  /// 仍在等待释放
  /// Still waiting for release
  Waiting,
  /// 序号已被释放，可以请求下游
  /// Seq has been released; the client may call downstream
  Eligible,
  /// 活动窗口已结束
  /// The activity window has ended
  Expired,
}

impl QueueState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Waiting => "waiting",
      Self::Eligible => "eligible",
      Self::Expired => "expired",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn sample_activity(status: ActivityStatus) -> Activity {
    let now = Utc::now();
    Activity {
      id: 1,
      tenant_id: "acme".to_string(),
      name: "flash sale".to_string(),
      sku: "SKU-1".to_string(),
      initial_stock: 100,
      start_at: now - Duration::hours(1),
      end_at: now + Duration::hours(1),
      status,
      config: ActivityConfig::default(),
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn test_status_conversion() {
    assert_eq!(ActivityStatus::Active.as_str(), "active");
    assert_eq!("paused".parse::<ActivityStatus>(), Ok(ActivityStatus::Paused));
    assert!("deleted".parse::<ActivityStatus>().is_err());
  }

  #[test]
  fn test_is_live() {
    let now = Utc::now();
    assert!(sample_activity(ActivityStatus::Active).is_live(now));
    assert!(!sample_activity(ActivityStatus::Paused).is_live(now));
    assert!(!sample_activity(ActivityStatus::Draft).is_live(now));

    // 窗口之外不可进入，包括 end_at 本身
    // Not live outside the window, including end_at itself
    let mut ended = sample_activity(ActivityStatus::Active);
    ended.end_at = now - Duration::seconds(1);
    assert!(!ended.is_live(now));

    let mut exact = sample_activity(ActivityStatus::Active);
    exact.end_at = now;
    assert!(!exact.is_live(now));
  }

  #[test]
  fn test_update_is_empty() {
    assert!(ActivityUpdate::default().is_empty());
    assert!(!ActivityUpdate {
      release_rate: Some(5),
      ..Default::default()
    }
    .is_empty());
  }
}
