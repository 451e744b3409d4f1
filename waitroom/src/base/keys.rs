//! 计数存储键名 - 键格式是对外契约的一部分
//! Counter store key names - key formats are part of the external contract
//!
//! 外部工具（仪表盘扫描器、运维脚本）按名字直接检查这些键，
//! 因此格式一旦发布就不能改变。
//! External tools (dashboard scanners, ops scripts) inspect these keys by
//! name, so the formats must not change once published.

/// 全局键：当前存活的调度任务数
/// Global key: number of live scheduler tasks
pub const GLOBAL_ACTIVE_SCHEDULERS: &str = "global:metrics:active_schedulers";

/// 会话 → 序号绑定键: user:queue:{tenant}:{activity}:{session}
/// Session → seq binding key: user:queue:{tenant}:{activity}:{session}
pub fn user_queue_key(tenant_id: &str, activity_id: i64, session_id: &str) -> String {
  format!("user:queue:{tenant_id}:{activity_id}:{session_id}")
}

/// 队列序号计数器键: queue:seq:{tenant}:{activity}
/// Queue sequence counter key: queue:seq:{tenant}:{activity}
pub fn queue_seq_key(tenant_id: &str, activity_id: i64) -> String {
  format!("queue:seq:{tenant_id}:{activity_id}")
}

/// 释放游标键: release:seq:{tenant}:{activity}
/// Release cursor key: release:seq:{tenant}:{activity}
pub fn release_seq_key(tenant_id: &str, activity_id: i64) -> String {
  format!("release:seq:{tenant_id}:{activity_id}")
}

/// 活跃用户基数草图键: active:users:{tenant}:{activity}
/// Active user cardinality sketch key: active:users:{tenant}:{activity}
pub fn active_users_key(tenant_id: &str, activity_id: i64) -> String {
  format!("active:users:{tenant_id}:{activity_id}")
}

/// IP 节流计数器键: throttle:ip:{tenant}:{activity}:{iphash}
/// IP throttle counter key: throttle:ip:{tenant}:{activity}:{iphash}
pub fn ip_throttle_key(tenant_id: &str, activity_id: i64, ip_hash: &str) -> String {
  format!("throttle:ip:{tenant_id}:{activity_id}:{ip_hash}")
}

/// 用户去重集合键: dedupe:user:{tenant}:{activity}
/// User dedupe set key: dedupe:user:{tenant}:{activity}
pub fn user_dedupe_key(tenant_id: &str, activity_id: i64) -> String {
  format!("dedupe:user:{tenant_id}:{activity_id}")
}

/// 指标键: metrics:{tenant}:{activity}:{name}
/// Metrics key: metrics:{tenant}:{activity}:{name}
pub fn metrics_key(tenant_id: &str, activity_id: i64, name: &str) -> String {
  format!("metrics:{tenant_id}:{activity_id}:{name}")
}

/// 释放事件环键: t:{tenant}:a:{activity}:events:release
/// Release event ring key: t:{tenant}:a:{activity}:events:release
pub fn release_events_key(tenant_id: &str, activity_id: i64) -> String {
  format!("t:{tenant_id}:a:{activity_id}:events:release")
}

/// 第二命名空间下的调度器状态键: t:{tenant}:a:{activity}:metrics:scheduler_status
/// Scheduler status key in the second namespace: t:{tenant}:a:{activity}:metrics:scheduler_status
///
/// 仪表盘扫描器按 `t:*:a:*` 模式查找这个键，主命名空间的
/// `metrics:{t}:{a}:scheduler_status` 同时保留。
/// The dashboard scanner looks this key up via `t:*:a:*` patterns; the
/// primary `metrics:{t}:{a}:scheduler_status` key is kept alongside it.
pub fn scheduler_status_scan_key(tenant_id: &str, activity_id: i64) -> String {
  format!("t:{tenant_id}:a:{activity_id}:metrics:scheduler_status")
}

/// 按小时释放计数的指标名: release_hourly_{hour}
/// Hourly release count metric name: release_hourly_{hour}
pub fn release_hourly_metric(hour: u32) -> String {
  format!("release_hourly_{hour}")
}
