//! Redis 配置和连接管理模块
//! Redis configuration and connection management module

use crate::error::Result;
use redis::{ConnectionInfo, IntoConnectionInfo};

/// Redis 连接类型
/// Redis connection type
///
/// 计数存储面向单实例 Redis；键空间没有跨槽事务需求，
/// 集群部署时由外层按租户分片。
/// The counter store targets a single Redis instance; the keyspace needs no
/// cross-slot transactions, and clustered deployments shard by tenant at an
/// outer layer.
#[derive(Clone)]
pub enum RedisConnectionType {
  /// 单机连接
  /// Standalone connection
  Single { connection_info: ConnectionInfo },
}

impl RedisConnectionType {
  /// 创建单机连接配置
  /// Create a standalone connection configuration
  pub fn single<T: IntoConnectionInfo>(connection_info: T) -> Result<Self> {
    Ok(Self::Single {
      connection_info: connection_info.into_connection_info()?,
    })
  }

  /// 建立多路复用异步连接
  /// Establish a multiplexed asynchronous connection
  pub async fn connect(&self) -> Result<redis::aio::MultiplexedConnection> {
    match self {
      Self::Single { connection_info } => {
        let client = redis::Client::open(connection_info.clone())?;
        Ok(client.get_multiplexed_async_connection().await?)
      }
    }
  }
}

impl std::fmt::Debug for RedisConnectionType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Single { connection_info } => f
        .debug_struct("Single")
        .field("addr", &connection_info.addr)
        .finish(),
    }
  }
}
