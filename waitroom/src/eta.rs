//! 等待时间估算模块
//! Wait time estimation module
//!
//! 从释放事件环和当前游标推导等待估计，并为客户端选择
//! 自适应轮询间隔。估算方法按置信度从高到低逐级回退：
//! immediate → historical → current_rate → static → basic。
//! Derives wait estimates from the release event ring plus the current
//! cursor, and picks an adaptive poll interval for clients. Estimation
//! methods fall through from highest to lowest confidence:
//! immediate → historical → current_rate → static → basic.

use crate::activity::{Activity, ReleaseEvent};
use crate::base::constants::EVENT_RING_SIZE;
use crate::base::{keys, CounterStore};
use crate::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 估算方法
/// Estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EtaMethod {
  /// 位置已被释放，无需等待
  /// Position already released, no wait
  Immediate,
  /// 基于最近 1 小时事件的平均速率
  /// Average rate over the last hour of events
  Historical,
  /// 基于最近两个事件的即时速率
  /// Instantaneous rate from the two most recent events
  CurrentRate,
  /// 基于配置的释放速率
  /// Configured release rate
  Static,
  /// 保守回退：假设每秒释放 1 个
  /// Conservative fallback: assume one release per second
  Basic,
  /// 估算失败后的外层回退
  /// Outer fallback after a failed estimation
  Fallback,
}

impl EtaMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Immediate => "immediate",
      Self::Historical => "historical",
      Self::CurrentRate => "current_rate",
      Self::Static => "static",
      Self::Basic => "basic",
      Self::Fallback => "fallback",
    }
  }
}

/// 估算结果
/// Estimation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtaResult {
  pub estimated_wait_seconds: i64,
  pub estimated_wait_time: DateTime<Utc>,
  /// 置信度，常规区间 [0.3, 0.9]，immediate 为 1.0
  /// Confidence, normally within [0.3, 0.9]; 1.0 for immediate
  pub confidence: f64,
  pub next_poll_interval_ms: u64,
  pub method: EtaMethod,
}

/// ETA 计算器
/// ETA calculator
pub struct EtaCalculator {
  store: Arc<dyn CounterStore>,
}

impl EtaCalculator {
  /// 创建新的计算器实例
  /// Create a new calculator instance
  pub fn new(store: Arc<dyn CounterStore>) -> Self {
    Self { store }
  }

  /// 为某个序号计算等待估计
  /// Compute the wait estimate for a seq
  pub async fn calculate(&self, activity: &Activity, seq: i64) -> Result<EtaResult> {
    let release_key = keys::release_seq_key(&activity.tenant_id, activity.id);
    let release_seq = self.store.get_int(&release_key).await?.unwrap_or(0);
    let position = seq - release_seq;
    let now = Utc::now();

    if position <= 0 {
      return Ok(EtaResult {
        estimated_wait_seconds: 0,
        estimated_wait_time: now,
        confidence: 1.0,
        next_poll_interval_ms: 0,
        method: EtaMethod::Immediate,
      });
    }

    let events = self.recent_release_events(activity).await?;
    let (seconds, confidence, method) = estimate(position, &events, activity, now);

    Ok(EtaResult {
      estimated_wait_seconds: seconds,
      estimated_wait_time: now + ChronoDuration::seconds(seconds),
      confidence,
      next_poll_interval_ms: poll_interval_ms(seconds, activity.config.poll_interval),
      method,
    })
  }

  /// 读取并解码事件环，最新在前；解码失败的记录被跳过
  /// Read and decode the event ring, newest first; undecodable records are
  /// skipped
  async fn recent_release_events(&self, activity: &Activity) -> Result<Vec<ReleaseEvent>> {
    let key = keys::release_events_key(&activity.tenant_id, activity.id);
    let raw = self.store.recent_events(&key, EVENT_RING_SIZE / 2).await?;
    Ok(
      raw
        .iter()
        .filter_map(|line| serde_json::from_str::<ReleaseEvent>(line).ok())
        .collect(),
    )
  }
}

/// 逐级回退的估算主体
/// Fallthrough estimation body
///
/// events 必须是最新在前的顺序（事件环的自然顺序）。
/// events must be newest-first (the event ring's natural order).
fn estimate(
  position: i64,
  events: &[ReleaseEvent],
  activity: &Activity,
  now: DateTime<Utc>,
) -> (i64, f64, EtaMethod) {
  if let Some((seconds, confidence)) = historical_eta(position, events, now) {
    return (seconds, confidence, EtaMethod::Historical);
  }
  if let Some(seconds) = current_rate_eta(position, events, now) {
    return (seconds, 0.6, EtaMethod::CurrentRate);
  }
  if activity.config.release_rate > 0 {
    let seconds = position / activity.config.release_rate as i64;
    return (seconds, 0.5, EtaMethod::Static);
  }
  (position, 0.3, EtaMethod::Basic)
}

/// 基于过去 1 小时历史事件的平均释放速率；事件不足 3 条则放弃
/// Average release rate over the last hour of events; declines with fewer
/// than 3 events
fn historical_eta(
  position: i64,
  events: &[ReleaseEvent],
  now: DateTime<Utc>,
) -> Option<(i64, f64)> {
  let cutoff = now - ChronoDuration::hours(1);
  let recent: Vec<&ReleaseEvent> = events.iter().filter(|e| e.timestamp > cutoff).collect();
  if recent.len() < 3 {
    return None;
  }

  let mut total_releases = 0i64;
  let mut total_seconds = 0f64;
  for pair in recent.windows(2) {
    total_releases += pair[0].release_count;
    total_seconds += (pair[0].timestamp - pair[1].timestamp)
      .to_std()
      .ok()?
      .as_secs_f64();
  }
  if total_seconds <= 0.0 {
    return None;
  }

  let avg_rate = total_releases as f64 / total_seconds;
  if avg_rate <= 0.0 {
    return None;
  }

  let seconds = (position as f64 / avg_rate) as i64;
  Some((seconds, confidence(&recent, avg_rate)))
}

/// 基于最近 5 分钟内最新两个事件的即时速率；事件不足则放弃
/// Instantaneous rate from the two newest events within 5 minutes; declines
/// without enough events
fn current_rate_eta(position: i64, events: &[ReleaseEvent], now: DateTime<Utc>) -> Option<i64> {
  let cutoff = now - ChronoDuration::minutes(5);
  let recent: Vec<&ReleaseEvent> = events.iter().filter(|e| e.timestamp > cutoff).collect();
  if recent.len() < 2 {
    return None;
  }

  let latest = recent[0];
  let prev = recent[1];
  let gap = (latest.timestamp - prev.timestamp).to_std().ok()?.as_secs_f64();
  if gap <= 0.0 {
    return None;
  }

  let rate = latest.release_count as f64 / gap;
  if rate <= 0.0 {
    return None;
  }
  Some((position as f64 / rate) as i64)
}

/// 置信度与逐段速率的变异系数成反比，约束在 [0.3, 0.9]
/// Confidence is inverse to the coefficient of variation of per-gap rates,
/// clamped to [0.3, 0.9]
fn confidence(events: &[&ReleaseEvent], avg_rate: f64) -> f64 {
  let mut rates = Vec::new();
  for pair in events.windows(2) {
    if let Ok(gap) = (pair[0].timestamp - pair[1].timestamp).to_std() {
      let secs = gap.as_secs_f64();
      if secs > 0.0 {
        rates.push(pair[0].release_count as f64 / secs);
      }
    }
  }
  if rates.len() < 2 {
    return 0.4;
  }

  let variance =
    rates.iter().map(|r| (r - avg_rate).powi(2)).sum::<f64>() / rates.len() as f64;
  let cv = variance.sqrt() / avg_rate;
  (1.0 / (1.0 + cv)).clamp(0.3, 0.9)
}

/// 自适应轮询间隔：ETA 越远轮询越慢，但不超过活动配置的上限
/// Adaptive poll interval: the further out the ETA, the slower the polling,
/// never exceeding the activity's configured ceiling
pub fn poll_interval_ms(eta_seconds: i64, default_interval_ms: u64) -> u64 {
  if eta_seconds <= 0 {
    return 0;
  }
  let cap: u64 = match eta_seconds {
    1..=30 => 1000,
    31..=120 => 2000,
    121..=300 => 5000,
    301..=600 => 10_000,
    _ => 30_000,
  };
  cap.min(default_interval_ms)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::activity::{ActivityConfig, ActivityStatus};
  use crate::memdb::MemoryStore;

  fn test_activity(release_rate: u32) -> Activity {
    let now = Utc::now();
    Activity {
      id: 7,
      tenant_id: "acme".to_string(),
      name: "drop".to_string(),
      sku: "SKU-7".to_string(),
      initial_stock: 100,
      start_at: now - ChronoDuration::hours(1),
      end_at: now + ChronoDuration::hours(1),
      status: ActivityStatus::Active,
      config: ActivityConfig {
        release_rate,
        poll_interval: 2000,
        ..Default::default()
      },
      created_at: now,
      updated_at: now,
    }
  }

  /// 构造一条均匀速率的事件链，最新在前
  /// Build a steady-rate event chain, newest first
  fn steady_events(count: usize, gap_secs: i64, per_event: i64) -> Vec<ReleaseEvent> {
    let now = Utc::now();
    (0..count)
      .map(|i| ReleaseEvent {
        activity_id: 7,
        tenant_id: "acme".to_string(),
        prev_seq: 0,
        new_seq: 0,
        release_count: per_event,
        timestamp: now - ChronoDuration::seconds(gap_secs * i as i64),
        release_rate: per_event,
      })
      .collect()
  }

  #[tokio::test]
  async fn test_immediate_when_position_zero() {
    let store = Arc::new(MemoryStore::new());
    store
      .set_int("release:seq:acme:7", 10, None)
      .await
      .unwrap();
    let calc = EtaCalculator::new(store);
    let result = calc.calculate(&test_activity(5), 10).await.unwrap();
    assert_eq!(result.method, EtaMethod::Immediate);
    assert_eq!(result.estimated_wait_seconds, 0);
    assert_eq!(result.next_poll_interval_ms, 0);
    assert_eq!(result.confidence, 1.0);
  }

  #[test]
  fn test_historical_steady_rate() {
    // 每 10 秒释放 10 个 → 1/s，position 60 → 60 秒
    // 10 released every 10 s → 1/s, position 60 → 60 s
    let events = steady_events(5, 10, 10);
    let (seconds, confidence, method) =
      estimate(60, &events, &test_activity(5), Utc::now());
    assert_eq!(method, EtaMethod::Historical);
    assert_eq!(seconds, 60);
    // 完全均匀的速率 → cv = 0 → 置信度钳到 0.9
    // Perfectly steady rate → cv = 0 → confidence clamps to 0.9
    assert!((confidence - 0.9).abs() < 1e-9);
  }

  #[test]
  fn test_historical_declines_below_three_events() {
    let events = steady_events(2, 10, 10);
    let (_, _, method) = estimate(60, &events, &test_activity(0), Utc::now());
    // 两个近期事件足够 current_rate，但不够 historical
    // Two recent events are enough for current_rate, not for historical
    assert_eq!(method, EtaMethod::CurrentRate);
  }

  #[test]
  fn test_static_fallback_without_events() {
    let (seconds, confidence, method) = estimate(50, &[], &test_activity(5), Utc::now());
    assert_eq!(method, EtaMethod::Static);
    assert_eq!(seconds, 10);
    assert!((confidence - 0.5).abs() < 1e-9);
  }

  #[test]
  fn test_basic_fallback_when_rate_zero() {
    let (seconds, confidence, method) = estimate(42, &[], &test_activity(0), Utc::now());
    assert_eq!(method, EtaMethod::Basic);
    assert_eq!(seconds, 42);
    assert!((confidence - 0.3).abs() < 1e-9);
  }

  #[test]
  fn test_stale_events_ignored() {
    // 事件都在 1 小时之外 → historical 与 current_rate 都放弃
    // All events older than an hour → both historical and current_rate decline
    let mut events = steady_events(5, 10, 10);
    for event in &mut events {
      event.timestamp -= ChronoDuration::hours(2);
    }
    let (_, _, method) = estimate(60, &events, &test_activity(5), Utc::now());
    assert_eq!(method, EtaMethod::Static);
  }

  #[test]
  fn test_poll_interval_table() {
    assert_eq!(poll_interval_ms(0, 2000), 0);
    assert_eq!(poll_interval_ms(10, 2000), 1000);
    assert_eq!(poll_interval_ms(60, 2000), 2000);
    assert_eq!(poll_interval_ms(200, 2000), 2000); // capped by activity config
    assert_eq!(poll_interval_ms(200, 10_000), 5000);
    assert_eq!(poll_interval_ms(500, 30_000), 10_000);
    assert_eq!(poll_interval_ms(3600, 30_000), 30_000);
    // 间隔对 ETA 单调不减
    // Interval is monotone non-decreasing in the ETA
    assert!(poll_interval_ms(31, 30_000) >= poll_interval_ms(30, 30_000));
  }

  #[test]
  fn test_confidence_clamped_for_jittery_rates() {
    // 速率剧烈抖动 → cv 大 → 置信度落在下限 0.3
    // Wildly jittery rates → large cv → confidence sits at the 0.3 floor
    let now = Utc::now();
    let mut events = Vec::new();
    for (i, count) in [100i64, 1, 100, 1, 100].iter().enumerate() {
      events.push(ReleaseEvent {
        activity_id: 7,
        tenant_id: "acme".to_string(),
        prev_seq: 0,
        new_seq: 0,
        release_count: *count,
        timestamp: now - ChronoDuration::seconds(10 * i as i64),
        release_rate: 1,
      });
    }
    let (_, confidence, method) = estimate(60, &events, &test_activity(5), now);
    assert_eq!(method, EtaMethod::Historical);
    assert!((0.3..=0.9).contains(&confidence));
  }
}
