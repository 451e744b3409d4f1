//! PostgresSQL 活动目录实现
//! PostgresSQL activity registry implementation
//!
//! 使用 SeaORM 实现活动目录与队列进入审计落库
//! Implements the activity registry and the enqueue audit trail using SeaORM

use super::entity::{activities, queue_entries, Activities, QueueEntries};
use super::normalize_new_activity;
use crate::activity::{Activity, ActivityUpdate, NewActivity, QueueEntry};
use crate::base::ActivityRegistry;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
  ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
  DbErr, EntityTrait, NotSet, QueryFilter, QueryOrder, Schema, Set,
};

/// PostgresSQL 活动目录
/// PostgresSQL activity registry
pub struct PostgresRegistry {
  db: DatabaseConnection,
}

impl PostgresRegistry {
  /// 从连接字符串创建目录实例并初始化 schema
  /// Create a registry instance from a connection string and initialize the
  /// schema
  pub async fn new(database_url: &str) -> Result<Self> {
    let opt = ConnectOptions::new(database_url)
      .max_connections(10)
      .to_owned();
    let db = Database::connect(opt).await?;
    let registry = Self { db };
    registry.init_schema().await?;
    Ok(registry)
  }

  /// 从现有数据库连接创建目录实例
  /// Create a registry instance from an existing database connection
  pub fn from_connection(db: DatabaseConnection) -> Self {
    Self { db }
  }

  /// 获取数据库连接
  /// Get the database connection
  pub fn db(&self) -> &DatabaseConnection {
    &self.db
  }

  /// 初始化数据库 schema
  /// Initialize the database schema
  ///
  /// queue_entries 上的唯一索引是插入忽略语义的前提。
  /// The unique index on queue_entries is what makes the insert-ignore
  /// well-defined.
  pub async fn init_schema(&self) -> Result<()> {
    let backend = self.db.get_database_backend();
    let schema = Schema::new(backend);

    let stmt = schema.create_table_from_entity(Activities);
    let _ = self.db.execute(backend.build(&stmt)).await;

    let stmt = schema.create_table_from_entity(QueueEntries);
    let _ = self.db.execute(backend.build(&stmt)).await;

    let index_sql = r#"
      CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_entries_activity_session ON queue_entries(activity_id, session_id);
      CREATE INDEX IF NOT EXISTS idx_activities_tenant_id ON activities(tenant_id);
      CREATE INDEX IF NOT EXISTS idx_activities_live ON activities(status, start_at, end_at);
    "#;
    let _ = self
      .db
      .execute(sea_orm::Statement::from_string(backend, index_sql))
      .await;

    Ok(())
  }
}

#[async_trait]
impl ActivityRegistry for PostgresRegistry {
  async fn create_activity(&self, activity: NewActivity) -> Result<Activity> {
    let config = normalize_new_activity(&activity)?;
    let now = Utc::now().fixed_offset();

    let model = activities::ActiveModel {
      id: NotSet,
      tenant_id: Set(activity.tenant_id),
      name: Set(activity.name),
      sku: Set(activity.sku),
      initial_stock: Set(activity.initial_stock),
      start_at: Set(activity.start_at.fixed_offset()),
      end_at: Set(activity.end_at.fixed_offset()),
      status: Set(activities::ActivityState::Draft),
      config_json: Set(serde_json::to_value(&config)?),
      created_at: Set(now),
      updated_at: Set(now),
    }
    .insert(&self.db)
    .await?;

    Ok(model.into())
  }

  async fn get_activity(&self, activity_id: i64) -> Result<Activity> {
    let model = Activities::find_by_id(activity_id)
      .one(&self.db)
      .await?
      .ok_or(Error::ActivityNotFound { activity_id })?;
    Ok(model.into())
  }

  async fn list_activities(&self, tenant_id: &str) -> Result<Vec<Activity>> {
    if tenant_id.trim().is_empty() {
      return Err(Error::MissingTenantId);
    }
    let models = Activities::find()
      .filter(activities::Column::TenantId.eq(tenant_id))
      .order_by_desc(activities::Column::CreatedAt)
      .all(&self.db)
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }

  async fn list_live_activities(&self) -> Result<Vec<Activity>> {
    let now = Utc::now().fixed_offset();
    let models = Activities::find()
      .filter(activities::Column::Status.eq(activities::ActivityState::Active))
      .filter(activities::Column::StartAt.lte(now))
      .filter(activities::Column::EndAt.gt(now))
      .all(&self.db)
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }

  async fn update_activity(&self, activity_id: i64, update: ActivityUpdate) -> Result<()> {
    if update.is_empty() {
      return Err(Error::NoFieldsToUpdate);
    }

    let model = Activities::find_by_id(activity_id)
      .one(&self.db)
      .await?
      .ok_or(Error::ActivityNotFound { activity_id })?;

    let mut config = model.parse_config();
    let mut active: activities::ActiveModel = model.into();

    if let Some(status) = update.status {
      active.status = Set(status.into());
    }
    if let Some(rate) = update.release_rate {
      config.release_rate = rate;
      active.config_json = Set(serde_json::to_value(&config)?);
    }
    active.updated_at = Set(Utc::now().fixed_offset());
    active.update(&self.db).await?;

    Ok(())
  }

  async fn record_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
    let model = queue_entries::ActiveModel {
      id: NotSet,
      activity_id: Set(entry.activity_id),
      user_hash: Set(entry.user_hash.clone()),
      session_id: Set(entry.session_id.clone()),
      seq_number: Set(entry.seq_number),
      fingerprint: Set(entry.fingerprint.clone()),
      ip_hash: Set(entry.ip_hash.clone()),
      created_at: Set(entry.created_at.fixed_offset()),
    };

    let result = QueueEntries::insert(model)
      .on_conflict(
        OnConflict::columns([
          queue_entries::Column::ActivityId,
          queue_entries::Column::SessionId,
        ])
        .do_nothing()
        .to_owned(),
      )
      .exec(&self.db)
      .await;

    match result {
      Ok(_) => Ok(()),
      // 冲突时什么都不插入；重入不是错误
      // Nothing inserted on conflict; a rejoin is not an error
      Err(DbErr::RecordNotInserted) => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}
