//! Redis 计数存储实现
//! Redis counter store implementation
//!
//! 基于一条多路复用异步连接实现 [`CounterStore`]；
//! 原子自增由 Redis 的 INCR 提供。
//! Implements [`CounterStore`] over one multiplexed asynchronous connection;
//! atomic increments come from Redis INCR.

use crate::base::CounterStore;
use crate::error::Result;
use crate::redis::RedisConnectionType;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

/// Redis 计数存储
/// Redis counter store
pub struct RedisStore {
  conn: MultiplexedConnection,
}

impl RedisStore {
  /// 从连接配置创建存储实例
  /// Create a store instance from a connection configuration
  pub async fn new(config: RedisConnectionType) -> Result<Self> {
    let conn = config.connect().await?;
    Ok(Self { conn })
  }

  /// 从已有连接创建存储实例
  /// Create a store instance from an existing connection
  pub fn from_connection(conn: MultiplexedConnection) -> Self {
    Self { conn }
  }

  fn connection(&self) -> MultiplexedConnection {
    // 多路复用连接克隆开销很小，每个操作各拿一份可变句柄
    // Cloning a multiplexed connection is cheap; every operation takes its
    // own mutable handle
    self.conn.clone()
  }
}

#[async_trait]
impl CounterStore for RedisStore {
  async fn ping(&self) -> Result<()> {
    let mut conn = self.connection();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
  }

  async fn incr(&self, key: &str) -> Result<i64> {
    let mut conn = self.connection();
    Ok(conn.incr(key, 1i64).await?)
  }

  async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
    let mut conn = self.connection();
    Ok(conn.incr(key, delta).await?)
  }

  async fn get_int(&self, key: &str) -> Result<Option<i64>> {
    let mut conn = self.connection();
    Ok(conn.get(key).await?)
  }

  async fn set_int(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()> {
    let mut conn = self.connection();
    match ttl {
      Some(ttl) => {
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
      }
      None => {
        let _: () = conn.set(key, value).await?;
      }
    }
    Ok(())
  }

  async fn set_str(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
    let mut conn = self.connection();
    match ttl {
      Some(ttl) => {
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
      }
      None => {
        let _: () = conn.set(key, value).await?;
      }
    }
    Ok(())
  }

  async fn get_str(&self, key: &str) -> Result<Option<String>> {
    let mut conn = self.connection();
    Ok(conn.get(key).await?)
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
    let mut conn = self.connection();
    let _: bool = conn.expire(key, ttl.as_secs() as i64).await?;
    Ok(())
  }

  async fn sadd(&self, key: &str, member: &str, ttl: Duration) -> Result<()> {
    let mut conn = self.connection();
    let _: () = conn.sadd(key, member).await?;
    let _: bool = conn.expire(key, ttl.as_secs() as i64).await?;
    Ok(())
  }

  async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
    let mut conn = self.connection();
    Ok(conn.sismember(key, member).await?)
  }

  async fn pfadd(&self, key: &str, element: &str) -> Result<()> {
    let mut conn = self.connection();
    let _: bool = conn.pfadd(key, element).await?;
    Ok(())
  }

  async fn pfcount(&self, key: &str) -> Result<i64> {
    let mut conn = self.connection();
    Ok(conn.pfcount(key).await?)
  }

  async fn push_event(&self, key: &str, payload: &str, keep: usize, ttl: Duration) -> Result<()> {
    let mut conn = self.connection();
    let _: () = redis::pipe()
      .lpush(key, payload)
      .ltrim(key, 0, keep as isize - 1)
      .expire(key, ttl.as_secs() as i64)
      .query_async(&mut conn)
      .await?;
    Ok(())
  }

  async fn recent_events(&self, key: &str, count: usize) -> Result<Vec<String>> {
    let mut conn = self.connection();
    Ok(conn.lrange(key, 0, count as isize - 1).await?)
  }

  async fn del(&self, key: &str) -> Result<()> {
    let mut conn = self.connection();
    let _: () = conn.del(key).await?;
    Ok(())
  }
}
