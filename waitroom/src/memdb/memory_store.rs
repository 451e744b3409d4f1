//! 内存计数存储实现
//! In-memory counter store implementation
//!
//! 使用内存数据结构实现 [`CounterStore`]，不依赖任何外部服务；
//! 过期在访问时惰性检查。
//! Implements [`CounterStore`] using in-memory data structures without any
//! external service dependencies; expiry is checked lazily on access.

use crate::base::CounterStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// 存储的值
/// Stored value
enum Value {
  Int(i64),
  Str(String),
  Set(HashSet<String>),
  /// 基数草图；内存实现存精确集合
  /// Cardinality sketch; the in-memory variant stores the exact set
  Sketch(HashSet<String>),
  List(VecDeque<String>),
}

struct Entry {
  value: Value,
  expires_at: Option<Instant>,
}

impl Entry {
  fn expired(&self, now: Instant) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

/// 内存计数存储
/// In-memory counter store
#[derive(Default)]
pub struct MemoryStore {
  data: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
  /// 创建新的内存存储实例
  /// Create a new in-memory store instance
  pub fn new() -> Self {
    Self::default()
  }

  fn wrong_type(key: &str) -> Error {
    Error::other(format!("wrong value type at key {key}"))
  }

  /// 移除已过期的条目
  /// Drop the entry if it has expired
  fn purge_expired(map: &mut HashMap<String, Entry>, key: &str) {
    let now = Instant::now();
    if map.get(key).is_some_and(|e| e.expired(now)) {
      map.remove(key);
    }
  }

  /// 清理过期后返回条目的可变引用
  /// Return a mutable reference to the entry after purging expiry
  fn live_entry<'a>(map: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    Self::purge_expired(map, key);
    map.get_mut(key)
  }

  /// 清理过期后取出或新建条目
  /// Fetch or create the entry after purging expiry
  fn entry_or<'a>(
    map: &'a mut HashMap<String, Entry>,
    key: &str,
    default: fn() -> Value,
  ) -> &'a mut Entry {
    Self::purge_expired(map, key);
    map.entry(key.to_string()).or_insert_with(|| Entry {
      value: default(),
      expires_at: None,
    })
  }
}

#[async_trait]
impl CounterStore for MemoryStore {
  async fn ping(&self) -> Result<()> {
    Ok(())
  }

  async fn incr(&self, key: &str) -> Result<i64> {
    self.incr_by(key, 1).await
  }

  async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
    let mut map = self.data.write().await;
    let entry = Self::entry_or(&mut map, key, || Value::Int(0));
    match &mut entry.value {
      Value::Int(v) => {
        *v += delta;
        Ok(*v)
      }
      _ => Err(Self::wrong_type(key)),
    }
  }

  async fn get_int(&self, key: &str) -> Result<Option<i64>> {
    let mut map = self.data.write().await;
    match Self::live_entry(&mut map, key) {
      Some(entry) => match &entry.value {
        Value::Int(v) => Ok(Some(*v)),
        _ => Err(Self::wrong_type(key)),
      },
      None => Ok(None),
    }
  }

  async fn set_int(&self, key: &str, value: i64, ttl: Option<Duration>) -> Result<()> {
    let mut map = self.data.write().await;
    map.insert(
      key.to_string(),
      Entry {
        value: Value::Int(value),
        expires_at: ttl.map(|d| Instant::now() + d),
      },
    );
    Ok(())
  }

  async fn set_str(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
    let mut map = self.data.write().await;
    map.insert(
      key.to_string(),
      Entry {
        value: Value::Str(value.to_string()),
        expires_at: ttl.map(|d| Instant::now() + d),
      },
    );
    Ok(())
  }

  async fn get_str(&self, key: &str) -> Result<Option<String>> {
    let mut map = self.data.write().await;
    match Self::live_entry(&mut map, key) {
      Some(entry) => match &entry.value {
        Value::Str(v) => Ok(Some(v.clone())),
        _ => Err(Self::wrong_type(key)),
      },
      None => Ok(None),
    }
  }

  async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
    let mut map = self.data.write().await;
    if let Some(entry) = Self::live_entry(&mut map, key) {
      entry.expires_at = Some(Instant::now() + ttl);
    }
    Ok(())
  }

  async fn sadd(&self, key: &str, member: &str, ttl: Duration) -> Result<()> {
    let mut map = self.data.write().await;
    let entry = Self::entry_or(&mut map, key, || Value::Set(HashSet::new()));
    match &mut entry.value {
      Value::Set(set) => {
        set.insert(member.to_string());
        entry.expires_at = Some(Instant::now() + ttl);
        Ok(())
      }
      _ => Err(Self::wrong_type(key)),
    }
  }

  async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
    let mut map = self.data.write().await;
    match Self::live_entry(&mut map, key) {
      Some(entry) => match &entry.value {
        Value::Set(set) => Ok(set.contains(member)),
        _ => Err(Self::wrong_type(key)),
      },
      None => Ok(false),
    }
  }

  async fn pfadd(&self, key: &str, element: &str) -> Result<()> {
    let mut map = self.data.write().await;
    let entry = Self::entry_or(&mut map, key, || Value::Sketch(HashSet::new()));
    match &mut entry.value {
      Value::Sketch(set) => {
        set.insert(element.to_string());
        Ok(())
      }
      _ => Err(Self::wrong_type(key)),
    }
  }

  async fn pfcount(&self, key: &str) -> Result<i64> {
    let mut map = self.data.write().await;
    match Self::live_entry(&mut map, key) {
      Some(entry) => match &entry.value {
        Value::Sketch(set) => Ok(set.len() as i64),
        _ => Err(Self::wrong_type(key)),
      },
      None => Ok(0),
    }
  }

  async fn push_event(&self, key: &str, payload: &str, keep: usize, ttl: Duration) -> Result<()> {
    let mut map = self.data.write().await;
    let entry = Self::entry_or(&mut map, key, || Value::List(VecDeque::new()));
    match &mut entry.value {
      Value::List(list) => {
        list.push_front(payload.to_string());
        list.truncate(keep);
        entry.expires_at = Some(Instant::now() + ttl);
        Ok(())
      }
      _ => Err(Self::wrong_type(key)),
    }
  }

  async fn recent_events(&self, key: &str, count: usize) -> Result<Vec<String>> {
    let mut map = self.data.write().await;
    match Self::live_entry(&mut map, key) {
      Some(entry) => match &entry.value {
        Value::List(list) => Ok(list.iter().take(count).cloned().collect()),
        _ => Err(Self::wrong_type(key)),
      },
      None => Ok(Vec::new()),
    }
  }

  async fn del(&self, key: &str) -> Result<()> {
    let mut map = self.data.write().await;
    map.remove(key);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_incr_is_monotonic() {
    let store = MemoryStore::new();
    assert_eq!(store.incr("queue:seq:acme:1").await.unwrap(), 1);
    assert_eq!(store.incr("queue:seq:acme:1").await.unwrap(), 2);
    assert_eq!(store.incr_by("queue:seq:acme:1", 5).await.unwrap(), 7);
  }

  #[tokio::test]
  async fn test_get_int_missing_key() {
    let store = MemoryStore::new();
    assert_eq!(store.get_int("nope").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_ttl_expiry() {
    let store = MemoryStore::new();
    store
      .set_int("k", 9, Some(Duration::from_millis(20)))
      .await
      .unwrap();
    assert_eq!(store.get_int("k").await.unwrap(), Some(9));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(store.get_int("k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_set_membership() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(60);
    assert!(!store.sismember("dedupe", "u1").await.unwrap());
    store.sadd("dedupe", "u1", ttl).await.unwrap();
    assert!(store.sismember("dedupe", "u1").await.unwrap());
    assert!(!store.sismember("dedupe", "u2").await.unwrap());
  }

  #[tokio::test]
  async fn test_sketch_counts_distinct() {
    let store = MemoryStore::new();
    store.pfadd("active", "s1").await.unwrap();
    store.pfadd("active", "s1").await.unwrap();
    store.pfadd("active", "s2").await.unwrap();
    assert_eq!(store.pfcount("active").await.unwrap(), 2);
  }

  #[tokio::test]
  async fn test_event_ring_is_bounded() {
    let store = MemoryStore::new();
    let ttl = Duration::from_secs(60);
    for i in 0..5 {
      store
        .push_event("events", &format!("e{i}"), 3, ttl)
        .await
        .unwrap();
    }
    let events = store.recent_events("events", 10).await.unwrap();
    assert_eq!(events, vec!["e4", "e3", "e2"]);
  }
}
