//! 准入引擎模块
//! Admission engine module
//!
//! 负责分配序号并回答状态轮询。进入检查按固定顺序执行：
//! 活动校验 → 会话推导 → 幂等重入 → IP 节流 → 用户去重 →
//! 原子分配序号。重入在节流之前短路，反复轮询不会触发限流；
//! 节流在去重之前，单个 IP 的突发不会污染去重集合；INCR 是
//! 最后一个破坏性步骤，任何失败都不会损伤序号空间。
//! Assigns sequence numbers and answers status polls. Enter checks run in a
//! fixed order: activity validation → session derivation → idempotent rejoin
//! → IP throttle → user dedupe → atomic seq assignment. Rejoin
//! short-circuits before the throttle so repeat polling never trips rate
//! limits; the throttle precedes dedupe so a burst from one IP cannot poison
//! the dedupe set; the INCR is the last destructive step so no failure
//! damages the seq space.

use crate::activity::{Activity, QueueEntry, QueueState};
use crate::base::constants::{SESSION_BUCKET_SECS, THROTTLE_LIMIT, THROTTLE_WINDOW};
use crate::base::{keys, ActivityRegistry, CounterStore};
use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::eta::{EtaCalculator, EtaResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// 进入队列请求
/// Enter queue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterRequest {
  pub activity_id: i64,
  pub user_hash: String,
  #[serde(default)]
  pub fingerprint: String,
  /// 从请求头取得，不来自 body
  /// Taken from request headers, never from the body
  #[serde(skip)]
  pub ip: String,
}

/// 进入队列响应
/// Enter queue response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterResponse {
  pub request_id: String,
  pub seq: i64,
  pub session_id: String,
  pub polling_interval: u64,
  pub queue_length: i64,
  pub estimated_wait: i64,
}

/// 状态轮询请求
/// Status poll request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
  pub activity_id: i64,
  pub seq: i64,
  pub session_id: String,
}

/// 状态轮询响应
/// Status poll response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
  pub request_id: String,
  pub release_seq: i64,
  pub queue_seq: i64,
  pub position: i64,
  pub eta: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub eta_details: Option<EtaResult>,
  pub state: QueueState,
  pub queue_length: i64,
  pub next_poll_ms: u64,
}

/// 准入引擎
/// Admission engine
pub struct AdmissionEngine {
  store: Arc<dyn CounterStore>,
  registry: Arc<dyn ActivityRegistry>,
  eta: EtaCalculator,
  config: QueueConfig,
}

impl AdmissionEngine {
  /// 创建新的准入引擎
  /// Create a new admission engine
  pub fn new(
    store: Arc<dyn CounterStore>,
    registry: Arc<dyn ActivityRegistry>,
    config: QueueConfig,
  ) -> Self {
    let eta = EtaCalculator::new(store.clone());
    Self {
      store,
      registry,
      eta,
      config,
    }
  }

  /// 进入队列；对同一会话在其生命周期内幂等
  /// Enter the queue; idempotent for the same session within its lifetime
  pub async fn enter(&self, req: &EnterRequest) -> Result<EnterResponse> {
    let request_id = Uuid::new_v4().to_string();

    // 1. 活动必须存在且可进入
    // 1. The activity must exist and be live
    let activity = self.registry.get_activity(req.activity_id).await?;
    let now = Utc::now();
    if !activity.is_live(now) {
      return Err(Error::ActivityNotActive {
        activity_id: activity.id,
      });
    }

    // 2. 会话推导：同一用户在一个小时桶内得到稳定的会话 ID
    // 2. Session derivation: one user gets a stable session id within an
    //    hour bucket
    let session_id = session_id(&req.user_hash, activity.id, now);

    // 3. 幂等重入：绑定已存在则原样返回，无其他副作用
    // 3. Idempotent rejoin: return the existing binding as-is, no other side
    //    effects
    let binding_key = keys::user_queue_key(&activity.tenant_id, activity.id, &session_id);
    if let Some(existing_seq) = self.store.get_int(&binding_key).await? {
      if existing_seq > 0 {
        return self
          .enter_response(request_id, &activity, existing_seq, session_id)
          .await;
      }
    }

    // 4. IP 节流：60 秒窗口内同一 IP 最多 10 次尝试
    // 4. IP throttle: at most 10 attempts per IP within a 60 s window
    if !req.ip.is_empty() && activity.config.enable_throttle {
      let ip_hash = self.hash_ip(&req.ip);
      let throttle_key = keys::ip_throttle_key(&activity.tenant_id, activity.id, &ip_hash);
      let count = self.store.incr(&throttle_key).await?;
      if count == 1 {
        self.store.expire(&throttle_key, THROTTLE_WINDOW).await?;
      }
      if count > THROTTLE_LIMIT {
        return Err(Error::RateLimitExceeded);
      }
    }

    // 5. 用户去重：同一身份不能持有两个序号
    // 5. User dedupe: one identity cannot hold two seqs
    let dedupe_key = keys::user_dedupe_key(&activity.tenant_id, activity.id);
    if self.store.sismember(&dedupe_key, &req.user_hash).await? {
      return Err(Error::UserAlreadyInQueue);
    }
    self
      .store
      .sadd(&dedupe_key, &req.user_hash, self.config.session_ttl())
      .await?;

    // 6. 原子分配序号并绑定会话
    // 6. Atomically assign the seq and bind the session
    let seq_key = keys::queue_seq_key(&activity.tenant_id, activity.id);
    let seq = self.store.incr(&seq_key).await?;
    self
      .store
      .set_int(&binding_key, seq, Some(self.config.session_ttl()))
      .await?;
    let sketch_key = keys::active_users_key(&activity.tenant_id, activity.id);
    self.store.pfadd(&sketch_key, &session_id).await?;

    // 7. 持久审计记录，尽力而为；任务生命周期挂在进程上，
    //    不受调用方截止时间影响
    // 7. Best-effort durable audit record; the task's lifetime is tied to
    //    the process, not the caller's deadline
    let entry = QueueEntry {
      activity_id: activity.id,
      user_hash: req.user_hash.clone(),
      session_id: session_id.clone(),
      seq_number: seq,
      fingerprint: req.fingerprint.clone(),
      ip_hash: if req.ip.is_empty() {
        String::new()
      } else {
        self.hash_ip(&req.ip)
      },
      created_at: now,
    };
    let registry = self.registry.clone();
    tokio::spawn(async move {
      if let Err(e) = registry.record_queue_entry(&entry).await {
        warn!(
          activity_id = entry.activity_id,
          seq = entry.seq_number,
          error = %e,
          "Failed to record queue entry"
        );
      }
    });

    // 8. 指标，同样尽力而为
    // 8. Metrics, equally best-effort
    let store = self.store.clone();
    let metric_key = keys::metrics_key(&activity.tenant_id, activity.id, "enter_total");
    tokio::spawn(async move {
      if let Err(e) = store.incr(&metric_key).await {
        warn!(error = %e, "Failed to bump enter_total");
      } else {
        let _ = store
          .expire(&metric_key, crate::base::constants::METRICS_TTL)
          .await;
      }
    });

    self
      .enter_response(request_id, &activity, seq, session_id)
      .await
  }

  /// 回答状态轮询
  /// Answer a status poll
  pub async fn status(&self, req: &StatusRequest) -> Result<StatusResponse> {
    let request_id = Uuid::new_v4().to_string();

    let activity = self.registry.get_activity(req.activity_id).await?;

    // 会话绑定必须存在且与提交的序号一致
    // The session binding must exist and agree with the submitted seq
    let binding_key = keys::user_queue_key(&activity.tenant_id, activity.id, &req.session_id);
    let bound_seq = self.store.get_int(&binding_key).await?;
    if bound_seq != Some(req.seq) {
      return Err(Error::InvalidSequence);
    }

    let release_seq = self
      .store
      .get_int(&keys::release_seq_key(&activity.tenant_id, activity.id))
      .await?
      .unwrap_or(0);
    let queue_seq = self
      .store
      .get_int(&keys::queue_seq_key(&activity.tenant_id, activity.id))
      .await?
      .unwrap_or(0);

    let position = (req.seq - release_seq).max(0);
    let now = Utc::now();

    // 状态机每次调用重新求值；expired 优先于其他状态
    // The state machine is evaluated fresh per call; expired dominates
    let (state, eta, eta_details, next_poll_ms) = if now >= activity.end_at {
      (QueueState::Expired, 0, None, 0)
    } else if req.seq <= release_seq {
      (QueueState::Eligible, 0, None, 0)
    } else {
      let eta = self.eta.calculate(&activity, req.seq).await?;
      let seconds = eta.estimated_wait_seconds;
      let next_poll = eta.next_poll_interval_ms;
      (QueueState::Waiting, seconds, Some(eta), next_poll)
    };

    Ok(StatusResponse {
      request_id,
      release_seq,
      queue_seq,
      position,
      eta,
      eta_details,
      state,
      queue_length: (queue_seq - release_seq).max(0),
      next_poll_ms,
    })
  }

  /// 组装 enter 响应：当前队列长度 + 位置推导的等待估计
  /// Assemble the enter response: current queue length + position-derived
  /// wait estimate
  async fn enter_response(
    &self,
    request_id: String,
    activity: &Activity,
    seq: i64,
    session_id: String,
  ) -> Result<EnterResponse> {
    let queue_length = self.queue_length(activity).await?;
    let eta = self.eta.calculate(activity, seq).await?;
    Ok(EnterResponse {
      request_id,
      seq,
      session_id,
      polling_interval: activity.config.poll_interval,
      queue_length,
      estimated_wait: eta.estimated_wait_seconds,
    })
  }

  async fn queue_length(&self, activity: &Activity) -> Result<i64> {
    let queue_seq = self
      .store
      .get_int(&keys::queue_seq_key(&activity.tenant_id, activity.id))
      .await?
      .unwrap_or(0);
    let release_seq = self
      .store
      .get_int(&keys::release_seq_key(&activity.tenant_id, activity.id))
      .await?
      .unwrap_or(0);
    Ok((queue_seq - release_seq).max(0))
  }

  /// 哈希客户端 IP，只存散列不存原值
  /// Hash the client IP; only the digest is ever stored
  fn hash_ip(&self, ip: &str) -> String {
    let digest = Sha256::digest(format!("{ip}{}", self.config.ip_salt));
    hex::encode(digest)[..16].to_string()
  }
}

/// 从 (user_hash, activity_id, 小时桶) 推导 16 位十六进制会话 ID
/// Derive the 16-hex-char session id from (user_hash, activity_id, hour
/// bucket)
///
/// 桶边界附近重入可能推导出不同的会话 ID，从而撞上自己的去重
/// 记录；桶长是对外行为的一部分，保持 1 小时。
/// A rejoin near the bucket boundary can derive a different session id and
/// collide with the client's own dedupe entry; the bucket length is part of
/// the observable behavior and stays at one hour.
pub fn session_id(user_hash: &str, activity_id: i64, now: DateTime<Utc>) -> String {
  let bucket = now.timestamp() / SESSION_BUCKET_SECS;
  let digest = Sha256::digest(format!("{user_hash}:{activity_id}:{bucket}"));
  hex::encode(digest)[..16].to_string()
}
