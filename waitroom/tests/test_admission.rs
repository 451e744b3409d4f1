//! 准入引擎集成测试，全部使用内存后端
//! Admission engine integration tests, all on the in-memory backends

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use waitroom::activity::{Activity, ActivityStatus, ActivityUpdate, NewActivity, QueueState};
use waitroom::admission::{AdmissionEngine, EnterRequest, StatusRequest};
use waitroom::base::{keys, ActivityRegistry, CounterStore};
use waitroom::config::QueueConfig;
use waitroom::error::Error;
use waitroom::memdb::MemoryStore;
use waitroom::registry::MemoryRegistry;

struct Harness {
  store: Arc<MemoryStore>,
  registry: Arc<MemoryRegistry>,
  engine: AdmissionEngine,
}

impl Harness {
  fn new() -> Self {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(MemoryRegistry::new());
    let engine = AdmissionEngine::new(store.clone(), registry.clone(), QueueConfig::default());
    Self {
      store,
      registry,
      engine,
    }
  }

  /// 创建一个立即可进入的活动
  /// Create an activity that is live right away
  async fn live_activity(&self, window: ChronoDuration) -> Activity {
    let now = Utc::now();
    let created = self
      .registry
      .create_activity(NewActivity {
        tenant_id: "acme".to_string(),
        name: "flash sale".to_string(),
        sku: "SKU-1".to_string(),
        initial_stock: 100,
        start_at: now - ChronoDuration::minutes(1),
        end_at: now + window,
        config: None,
      })
      .await
      .unwrap();
    self
      .registry
      .update_activity(
        created.id,
        ActivityUpdate {
          status: Some(ActivityStatus::Active),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    self.registry.get_activity(created.id).await.unwrap()
  }

  fn enter_request(&self, activity_id: i64, user: &str, ip: &str) -> EnterRequest {
    EnterRequest {
      activity_id,
      user_hash: user.to_string(),
      fingerprint: "fp".to_string(),
      ip: ip.to_string(),
    }
  }
}

#[tokio::test]
async fn test_basic_admission_assigns_increasing_seqs() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::hours(1)).await;

  let first = h
    .engine
    .enter(&h.enter_request(activity.id, "u1", "10.0.0.1"))
    .await
    .unwrap();
  let second = h
    .engine
    .enter(&h.enter_request(activity.id, "u2", "10.0.0.2"))
    .await
    .unwrap();

  assert_eq!(first.seq, 1);
  assert_eq!(second.seq, 2);
  assert!(first.seq < second.seq);
  assert_eq!(second.queue_length, 2);
  assert_eq!(first.polling_interval, 2000);
}

#[tokio::test]
async fn test_rejoin_is_idempotent() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::hours(1)).await;
  let req = h.enter_request(activity.id, "u1", "10.0.0.1");

  let first = h.engine.enter(&req).await.unwrap();
  let second = h.engine.enter(&req).await.unwrap();

  assert_eq!(first.seq, second.seq);
  assert_eq!(first.session_id, second.session_id);

  // 审计记录是异步落库的，稍等片刻再数
  // The audit record lands asynchronously, give it a moment before counting
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(h.registry.entry_count(activity.id).await, 1);

  // 队列序号没有被第二次调用消耗
  // The second call consumed no seq
  let queue_seq = h
    .store
    .get_int(&keys::queue_seq_key("acme", activity.id))
    .await
    .unwrap();
  assert_eq!(queue_seq, Some(1));
}

#[tokio::test]
async fn test_rejoin_never_trips_the_throttle() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::hours(1)).await;
  let req = h.enter_request(activity.id, "u1", "10.0.0.1");

  h.engine.enter(&req).await.unwrap();
  // 远超限流窗口额度的重入都应成功
  // Rejoins far beyond the throttle budget must all succeed
  for _ in 0..30 {
    h.engine.enter(&req).await.unwrap();
  }
}

#[tokio::test]
async fn test_dedupe_rejects_second_session_of_same_user() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::hours(1)).await;
  let req = h.enter_request(activity.id, "u1", "10.0.0.1");

  let first = h.engine.enter(&req).await.unwrap();

  // 模拟小时边界：原会话绑定消失，但去重集合仍然持有该用户
  // Simulate the hour boundary: the original session binding is gone while
  // the dedupe set still holds the user
  h.store
    .del(&keys::user_queue_key("acme", activity.id, &first.session_id))
    .await
    .unwrap();

  let err = h.engine.enter(&req).await.unwrap_err();
  assert!(matches!(err, Error::UserAlreadyInQueue));
  assert_eq!(err.code(), "USER_ALREADY_IN_QUEUE");
}

#[tokio::test]
async fn test_ip_throttle_limits_attempts_per_window() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::hours(1)).await;

  // 同一 IP 上 10 个不同用户进入成功
  // Ten distinct users from one IP succeed
  for i in 0..10 {
    h.engine
      .enter(&h.enter_request(activity.id, &format!("user-{i}"), "203.0.113.9"))
      .await
      .unwrap();
  }

  // 第 11 次触发限流
  // The 11th attempt trips the throttle
  let err = h
    .engine
    .enter(&h.enter_request(activity.id, "user-10", "203.0.113.9"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::RateLimitExceeded));

  // 窗口过期后（这里直接删除计数器模拟）再次成功
  // Succeeds again after the window expires (simulated by deleting the
  // counter)
  let ip_key_prefix = format!("throttle:ip:acme:{}:", activity.id);
  // 限流键含 IP 哈希，通过再次触发并观察错误确认之后清理
  // The throttle key embeds the IP hash; recover by clearing the window
  let hashed = {
    // 与引擎一致的盐值推导（默认配置 salt = "salt"）
    // Same salted derivation as the engine (default config salt = "salt")
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest("203.0.113.9salt"))[..16].to_string()
  };
  h.store
    .del(&format!("{ip_key_prefix}{hashed}"))
    .await
    .unwrap();
  h.engine
    .enter(&h.enter_request(activity.id, "user-10", "203.0.113.9"))
    .await
    .unwrap();
}

#[tokio::test]
async fn test_empty_ip_skips_throttle() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::hours(1)).await;

  for i in 0..15 {
    h.engine
      .enter(&h.enter_request(activity.id, &format!("user-{i}"), ""))
      .await
      .unwrap();
  }
}

#[tokio::test]
async fn test_enter_rejects_missing_and_inactive_activities() {
  let h = Harness::new();

  let err = h
    .engine
    .enter(&h.enter_request(999, "u1", "10.0.0.1"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ActivityNotFound { .. }));

  // 新建活动停留在 draft 状态，不可进入
  // A freshly created activity stays in draft and is not admitting
  let now = Utc::now();
  let draft = h
    .registry
    .create_activity(NewActivity {
      tenant_id: "acme".to_string(),
      name: "drop".to_string(),
      sku: "SKU-2".to_string(),
      initial_stock: 1,
      start_at: now,
      end_at: now + ChronoDuration::hours(1),
      config: None,
    })
    .await
    .unwrap();
  let err = h
    .engine
    .enter(&h.enter_request(draft.id, "u1", "10.0.0.1"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ActivityNotActive { .. }));
}

#[tokio::test]
async fn test_status_validates_session_binding() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::hours(1)).await;
  let entered = h
    .engine
    .enter(&h.enter_request(activity.id, "u1", "10.0.0.1"))
    .await
    .unwrap();

  // 提交的序号与绑定不一致
  // The submitted seq disagrees with the binding
  let err = h
    .engine
    .status(&StatusRequest {
      activity_id: activity.id,
      seq: entered.seq + 5,
      session_id: entered.session_id.clone(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidSequence));

  // 完全未知的会话
  // A session that never entered
  let err = h
    .engine
    .status(&StatusRequest {
      activity_id: activity.id,
      seq: 1,
      session_id: "0000000000000000".to_string(),
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidSequence));
}

#[tokio::test]
async fn test_status_state_machine() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::hours(1)).await;
  let entered = h
    .engine
    .enter(&h.enter_request(activity.id, "u1", "10.0.0.1"))
    .await
    .unwrap();
  let req = StatusRequest {
    activity_id: activity.id,
    seq: entered.seq,
    session_id: entered.session_id.clone(),
  };

  // 尚未释放：waiting，位置为 1
  // Not yet released: waiting at position 1
  let status = h.engine.status(&req).await.unwrap();
  assert_eq!(status.state, QueueState::Waiting);
  assert_eq!(status.position, 1);
  assert!(status.next_poll_ms > 0);
  assert!(status.release_seq <= status.queue_seq);

  // 游标推过该序号：eligible，立即可请求下游
  // Cursor advanced past the seq: eligible, may call downstream immediately
  h.store
    .set_int(&keys::release_seq_key("acme", activity.id), entered.seq, None)
    .await
    .unwrap();
  let status = h.engine.status(&req).await.unwrap();
  assert_eq!(status.state, QueueState::Eligible);
  assert_eq!(status.position, 0);
  assert_eq!(status.next_poll_ms, 0);
  assert_eq!(status.eta, 0);
}

#[tokio::test]
async fn test_status_expired_after_window_end() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::milliseconds(200)).await;
  let entered = h
    .engine
    .enter(&h.enter_request(activity.id, "u1", "10.0.0.1"))
    .await
    .unwrap();

  tokio::time::sleep(Duration::from_millis(250)).await;

  let status = h
    .engine
    .status(&StatusRequest {
      activity_id: activity.id,
      seq: entered.seq,
      session_id: entered.session_id,
    })
    .await
    .unwrap();
  assert_eq!(status.state, QueueState::Expired);
  assert_eq!(status.next_poll_ms, 0);
}

#[tokio::test]
async fn test_position_consistency() {
  let h = Harness::new();
  let activity = h.live_activity(ChronoDuration::hours(1)).await;

  let mut sessions = Vec::new();
  for i in 0..5 {
    let entered = h
      .engine
      .enter(&h.enter_request(activity.id, &format!("user-{i}"), ""))
      .await
      .unwrap();
    sessions.push(entered);
  }

  h.store
    .set_int(&keys::release_seq_key("acme", activity.id), 2, None)
    .await
    .unwrap();

  for entered in &sessions {
    let status = h
      .engine
      .status(&StatusRequest {
        activity_id: activity.id,
        seq: entered.seq,
        session_id: entered.session_id.clone(),
      })
      .await
      .unwrap();
    // position = p ≥ 0 且 release_seq = r 蕴含绑定序号 = p + r
    // position = p ≥ 0 with release_seq = r implies the bound seq = p + r
    if status.position > 0 {
      assert_eq!(status.position + status.release_seq, entered.seq);
    } else {
      assert!(entered.seq <= status.release_seq);
    }
  }
}
