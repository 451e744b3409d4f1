//! 内存活动目录实现
//! In-memory activity registry implementation
//!
//! 用于测试和无外部依赖的本地运行
//! For tests and local runs without external dependencies

use super::normalize_new_activity;
use crate::activity::{Activity, ActivityStatus, ActivityUpdate, NewActivity, QueueEntry};
use crate::base::ActivityRegistry;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

/// 内存活动目录
/// In-memory activity registry
#[derive(Default)]
pub struct MemoryRegistry {
  activities: RwLock<HashMap<i64, Activity>>,
  /// 审计记录，键为 (activity_id, session_id)，与唯一索引对应
  /// Audit records keyed by (activity_id, session_id), mirroring the unique
  /// index
  entries: RwLock<HashMap<(i64, String), QueueEntry>>,
  next_id: AtomicI64,
}

impl MemoryRegistry {
  /// 创建新的内存目录实例
  /// Create a new in-memory registry instance
  pub fn new() -> Self {
    Self {
      activities: RwLock::new(HashMap::new()),
      entries: RwLock::new(HashMap::new()),
      next_id: AtomicI64::new(1),
    }
  }

  /// 读取某活动的审计记录数（测试辅助）
  /// Count audit records for one activity (test helper)
  pub async fn entry_count(&self, activity_id: i64) -> usize {
    self
      .entries
      .read()
      .await
      .keys()
      .filter(|(id, _)| *id == activity_id)
      .count()
  }
}

#[async_trait]
impl ActivityRegistry for MemoryRegistry {
  async fn create_activity(&self, activity: NewActivity) -> Result<Activity> {
    let config = normalize_new_activity(&activity)?;
    let now = Utc::now();
    let id = self.next_id.fetch_add(1, Ordering::SeqCst);

    let created = Activity {
      id,
      tenant_id: activity.tenant_id,
      name: activity.name,
      sku: activity.sku,
      initial_stock: activity.initial_stock,
      start_at: activity.start_at,
      end_at: activity.end_at,
      status: ActivityStatus::Draft,
      config,
      created_at: now,
      updated_at: now,
    };

    self.activities.write().await.insert(id, created.clone());
    Ok(created)
  }

  async fn get_activity(&self, activity_id: i64) -> Result<Activity> {
    self
      .activities
      .read()
      .await
      .get(&activity_id)
      .cloned()
      .ok_or(Error::ActivityNotFound { activity_id })
  }

  async fn list_activities(&self, tenant_id: &str) -> Result<Vec<Activity>> {
    if tenant_id.trim().is_empty() {
      return Err(Error::MissingTenantId);
    }
    let mut list: Vec<Activity> = self
      .activities
      .read()
      .await
      .values()
      .filter(|a| a.tenant_id == tenant_id)
      .cloned()
      .collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(list)
  }

  async fn list_live_activities(&self) -> Result<Vec<Activity>> {
    let now = Utc::now();
    Ok(
      self
        .activities
        .read()
        .await
        .values()
        .filter(|a| a.is_live(now))
        .cloned()
        .collect(),
    )
  }

  async fn update_activity(&self, activity_id: i64, update: ActivityUpdate) -> Result<()> {
    if update.is_empty() {
      return Err(Error::NoFieldsToUpdate);
    }
    let mut activities = self.activities.write().await;
    let activity = activities
      .get_mut(&activity_id)
      .ok_or(Error::ActivityNotFound { activity_id })?;

    if let Some(status) = update.status {
      activity.status = status;
    }
    if let Some(rate) = update.release_rate {
      activity.config.release_rate = rate;
    }
    activity.updated_at = Utc::now();
    Ok(())
  }

  async fn record_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
    self
      .entries
      .write()
      .await
      .entry((entry.activity_id, entry.session_id.clone()))
      .or_insert_with(|| entry.clone());
    Ok(())
  }
}
