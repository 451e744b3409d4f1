//! 队列进入审计记录实体
//! Enqueue audit record entity

use sea_orm::entity::prelude::*;

/// 队列进入记录模型
/// Queue entry record model
///
/// (activity_id, session_id) 上有唯一索引，插入冲突被静默忽略。
/// A unique index on (activity_id, session_id) backs the insert-ignore.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "queue_entries")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub activity_id: i64,
  pub user_hash: String,
  pub session_id: String,
  pub seq_number: i64,
  pub fingerprint: String,
  pub ip_hash: String,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
