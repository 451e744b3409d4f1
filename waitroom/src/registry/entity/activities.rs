//! 活动实体
//! Activity entity

use crate::activity::{Activity, ActivityConfig, ActivityStatus};
use sea_orm::entity::prelude::*;
use tracing::warn;

/// 活动生命周期状态枚举
/// Activity lifecycle state enum
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ActivityState {
  #[sea_orm(string_value = "draft")]
  Draft,
  #[sea_orm(string_value = "active")]
  Active,
  #[sea_orm(string_value = "paused")]
  Paused,
  #[sea_orm(string_value = "ended")]
  Ended,
}

impl From<ActivityStatus> for ActivityState {
  fn from(status: ActivityStatus) -> Self {
    match status {
      ActivityStatus::Draft => Self::Draft,
      ActivityStatus::Active => Self::Active,
      ActivityStatus::Paused => Self::Paused,
      ActivityStatus::Ended => Self::Ended,
    }
  }
}

impl From<ActivityState> for ActivityStatus {
  fn from(state: ActivityState) -> Self {
    match state {
      ActivityState::Draft => Self::Draft,
      ActivityState::Active => Self::Active,
      ActivityState::Paused => Self::Paused,
      ActivityState::Ended => Self::Ended,
    }
  }
}

/// 活动实体模型
/// Activity entity model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "activities")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  /// 租户 ID，限定所有键空间
  /// Tenant id scoping every keyspace
  pub tenant_id: String,
  pub name: String,
  pub sku: String,
  pub initial_stock: i32,
  pub start_at: DateTimeWithTimeZone,
  pub end_at: DateTimeWithTimeZone,
  pub status: ActivityState,
  pub config_json: Json,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
  /// 解析配置 JSON；解析失败时回退到默认配置
  /// Parse the config JSON; fall back to the default config on failure
  pub fn parse_config(&self) -> ActivityConfig {
    match serde_json::from_value(self.config_json.clone()) {
      Ok(config) => config,
      Err(e) => {
        warn!(
          activity_id = self.id,
          error = %e,
          "Failed to parse activity config JSON, using defaults"
        );
        ActivityConfig::default()
      }
    }
  }
}

impl From<Model> for Activity {
  fn from(model: Model) -> Self {
    let config = model.parse_config();
    Activity {
      id: model.id,
      tenant_id: model.tenant_id,
      name: model.name,
      sku: model.sku,
      initial_stock: model.initial_stock,
      start_at: model.start_at.to_utc(),
      end_at: model.end_at.to_utc(),
      status: model.status.into(),
      config,
      created_at: model.created_at.to_utc(),
      updated_at: model.updated_at.to_utc(),
    }
  }
}
