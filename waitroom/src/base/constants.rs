//! 共享常量
//! Shared constants

use std::time::Duration;

/// 释放游标键的存活时间
/// Lifetime of the release cursor key
pub const RELEASE_SEQ_TTL: Duration = Duration::from_secs(24 * 3600);

/// IP 节流滑动窗口
/// IP throttle sliding window
pub const THROTTLE_WINDOW: Duration = Duration::from_secs(60);

/// 窗口内允许的最大进入尝试次数
/// Maximum enter attempts allowed within the window
pub const THROTTLE_LIMIT: i64 = 10;

/// 指标计数器的存活时间
/// Lifetime of metric counters
pub const METRICS_TTL: Duration = Duration::from_secs(24 * 3600);

/// 按小时释放计数器的存活时间
/// Lifetime of the hourly release counters
pub const HOURLY_METRICS_TTL: Duration = Duration::from_secs(2 * 3600);

/// 释放事件环形缓冲保留的事件数
/// Number of events retained in the release event ring
pub const EVENT_RING_SIZE: usize = 100;

/// 释放事件环的存活时间
/// Lifetime of the release event ring
pub const EVENT_RING_TTL: Duration = Duration::from_secs(3600);

/// 调度任务的最小 tick 间隔
/// Minimum tick interval of a scheduler task
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// 监督者对活动目录的对账间隔
/// Supervisor reconciliation interval against the activity registry
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// 调度器指标汇报间隔
/// Scheduler metrics reporting interval
pub const METRICS_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// 调度器状态键的存活时间
/// Lifetime of scheduler status keys
pub const SCHEDULER_STATUS_TTL: Duration = Duration::from_secs(3600);

/// 会话 ID 的小时桶长度（秒）
/// Hour bucket length for session id derivation (seconds)
pub const SESSION_BUCKET_SECS: i64 = 3600;

/// 活动创建时的默认释放速率（每秒）
/// Default release rate applied at activity creation (per second)
pub const DEFAULT_RELEASE_RATE: u32 = 10;

/// 活动创建时的默认轮询间隔（毫秒）
/// Default poll interval applied at activity creation (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
