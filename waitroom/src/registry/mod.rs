//! 活动目录模块
//! Activity registry module
//!
//! 活动元数据的持久目录以及队列进入审计记录的落库
//! Durable catalog of activity metadata plus the enqueue audit trail

use crate::activity::{ActivityConfig, NewActivity};
use crate::base::constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_RELEASE_RATE};
use crate::error::{Error, Result};

pub mod entity;
mod memory;
mod postgres;

pub use memory::MemoryRegistry;
pub use postgres::PostgresRegistry;

/// 校验时间窗口并填充省略的配置默认值
/// Validate the time window and fill in omitted config defaults
///
/// 零值字段视为省略：release_rate = 0 取默认 10/s，poll_interval = 0
/// 取默认 2000 ms。
/// Zero-valued fields count as omitted: release_rate = 0 takes the default
/// 10/s, poll_interval = 0 takes the default 2000 ms.
pub(crate) fn normalize_new_activity(activity: &NewActivity) -> Result<ActivityConfig> {
  if activity.end_at <= activity.start_at {
    return Err(Error::InvalidTimeRange);
  }
  if activity.tenant_id.trim().is_empty() {
    return Err(Error::MissingTenantId);
  }
  let mut config = activity.config.clone().unwrap_or_default();
  if config.release_rate == 0 {
    config.release_rate = DEFAULT_RELEASE_RATE;
  }
  if config.poll_interval == 0 {
    config.poll_interval = DEFAULT_POLL_INTERVAL_MS;
  }
  Ok(config)
}
