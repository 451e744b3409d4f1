//! 释放调度器模块
//! Release scheduler module
//!
//! 一个监督者加上每个可进入活动一个的 ticker 任务。任务按
//! 时间预算推进释放游标：每个 tick 的额度是
//! floor(release_rate × 距上次释放的秒数)，下限 1，上限当前
//! 队列长度，因此延迟后会追赶但从不过冲。
//! A supervisor plus one ticker task per live activity. Tasks advance the
//! release cursor on a time budget: each tick's credit is
//! floor(release_rate × seconds since the last release), floored at 1 and
//! capped by the current queue length, so a delayed task catches up but
//! never overshoots.
//!
//! 同一时刻只有一个任务推进某个活动的 release_seq；监督者用
//! 按活动加锁的任务表保证这一点。跨进程多写者不受支持。
//! Exactly one task at a time advances a given activity's release_seq; the
//! supervisor enforces this with a guarded map keyed by activity.
//! Cross-process multi-writer operation is not supported.

use crate::activity::{Activity, ActivityUpdate, ReleaseEvent};
use crate::base::constants::{
  EVENT_RING_SIZE, EVENT_RING_TTL, HOURLY_METRICS_TTL, METRICS_SWEEP_INTERVAL, METRICS_TTL,
  MIN_TICK_INTERVAL, RECONCILE_INTERVAL, RELEASE_SEQ_TTL, SCHEDULER_STATUS_TTL,
};
use crate::base::{keys, ActivityRegistry, CounterStore};
use crate::error::{Error, Result};
use chrono::{DateTime, Timelike, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 一个活动的调度任务状态
/// Scheduler task state for one activity
pub struct SchedulerTask {
  pub activity_id: i64,
  pub tenant_id: String,
  /// 每秒释放速率；对账或手动控制可在运行中改写
  /// Release rate per second; patched live by reconciliation or manual
  /// control
  release_rate: AtomicU32,
  /// 已推进到的游标值，供指标汇报读取
  /// Cursor value advanced so far, read by the metrics sweep
  total_released: AtomicI64,
  /// 上次释放时间，额度计算的基准
  /// Time of the last release, the basis of credit computation
  last_release: std::sync::Mutex<DateTime<Utc>>,
  stopped: AtomicBool,
  stop_notify: Notify,
}

impl SchedulerTask {
  fn new(activity: &Activity, current_release_seq: i64) -> Self {
    Self {
      activity_id: activity.id,
      tenant_id: activity.tenant_id.clone(),
      release_rate: AtomicU32::new(activity.config.release_rate),
      total_released: AtomicI64::new(current_release_seq),
      last_release: std::sync::Mutex::new(Utc::now()),
      stopped: AtomicBool::new(false),
      stop_notify: Notify::new(),
    }
  }

  /// 当前速率
  /// Current rate
  pub fn release_rate(&self) -> u32 {
    self.release_rate.load(Ordering::Relaxed)
  }

  /// 已释放总数
  /// Total released so far
  pub fn total_released(&self) -> i64 {
    self.total_released.load(Ordering::Relaxed)
  }

  fn set_release_rate(&self, rate: u32) {
    self.release_rate.store(rate, Ordering::Relaxed);
  }

  fn is_stopped(&self) -> bool {
    self.stopped.load(Ordering::Relaxed)
  }

  /// 请求任务停止；下一个 tick 或停止信号先到者生效
  /// Request the task to stop; effective at the next tick or the stop
  /// signal, whichever first
  fn request_stop(&self) {
    self.stopped.store(true, Ordering::Relaxed);
    self.stop_notify.notify_one();
  }

  fn last_release(&self) -> DateTime<Utc> {
    *self.last_release.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn set_last_release(&self, at: DateTime<Utc>) {
    *self.last_release.lock().unwrap_or_else(|e| e.into_inner()) = at;
  }
}

struct RunningTask {
  task: Arc<SchedulerTask>,
  handle: JoinHandle<()>,
}

/// 释放调度器：监督者与任务集
/// Release scheduler: supervisor and task set
pub struct ReleaseScheduler {
  store: Arc<dyn CounterStore>,
  registry: Arc<dyn ActivityRegistry>,
  tasks: Arc<RwLock<HashMap<i64, RunningTask>>>,
  shutdown_tx: watch::Sender<bool>,
  running: AtomicBool,
  loops: Mutex<Vec<JoinHandle<()>>>,
  /// 调度器实例标识，只用于日志
  /// Scheduler instance id, used in logs only
  instance_id: String,
}

impl ReleaseScheduler {
  /// 创建新的释放调度器
  /// Create a new release scheduler
  pub fn new(store: Arc<dyn CounterStore>, registry: Arc<dyn ActivityRegistry>) -> Self {
    let (shutdown_tx, _) = watch::channel(false);
    let instance_id = format!(
      "{}:{}:{}",
      hostname::get().unwrap_or_default().to_string_lossy(),
      std::process::id(),
      Uuid::new_v4()
    );
    Self {
      store,
      registry,
      tasks: Arc::new(RwLock::new(HashMap::new())),
      shutdown_tx,
      running: AtomicBool::new(false),
      loops: Mutex::new(Vec::new()),
      instance_id,
    }
  }

  /// 启动监督者：装载可进入活动并拉起对账与指标循环
  /// Start the supervisor: load live activities and spin up the
  /// reconciliation and metrics loops
  pub async fn start(&self) -> Result<()> {
    if self.running.swap(true, Ordering::SeqCst) {
      return Ok(());
    }
    info!(instance_id = %self.instance_id, "Starting release scheduler");

    let live = self.registry.list_live_activities().await?;
    for activity in &live {
      if activity.config.release_rate > 0 {
        self.spawn_task(activity).await?;
      }
    }

    let mut handles = self.loops.lock().await;
    handles.push(self.spawn_reconcile_loop());
    handles.push(self.spawn_metrics_loop());

    info!(tasks = live.len(), "Release scheduler started");
    Ok(())
  }

  /// 关闭监督者并等待所有任务退出
  /// Shut down the supervisor and wait for every task to exit
  pub async fn stop(&self) {
    if !self.running.swap(false, Ordering::SeqCst) {
      return;
    }
    info!("Stopping release scheduler");
    let _ = self.shutdown_tx.send(true);

    let drained: Vec<RunningTask> = {
      let mut tasks = self.tasks.write().await;
      tasks.drain().map(|(_, t)| t).collect()
    };
    for running in drained {
      running.task.request_stop();
      let _ = running.handle.await;
    }

    let loops: Vec<JoinHandle<()>> = self.loops.lock().await.drain(..).collect();
    for handle in loops {
      let _ = handle.await;
    }
    info!("Release scheduler stopped");
  }

  /// 正在运行的任务数
  /// Number of running tasks
  pub async fn task_count(&self) -> usize {
    self.tasks.read().await.len()
  }

  /// 某活动是否有运行中的任务
  /// Whether an activity has a running task
  pub async fn has_task(&self, activity_id: i64) -> bool {
    self.tasks.read().await.contains_key(&activity_id)
  }

  /// 读取运行中任务的当前速率
  /// Read the current rate of a running task
  pub async fn task_rate(&self, activity_id: i64) -> Option<u32> {
    self
      .tasks
      .read()
      .await
      .get(&activity_id)
      .map(|r| r.task.release_rate())
  }

  /// 更新释放速率：持久化到目录并修补在运行的任务
  /// Update the release rate: persist to the registry and patch the live
  /// task
  pub async fn update_release_rate(&self, activity_id: i64, rate: u32) -> Result<()> {
    self
      .registry
      .update_activity(
        activity_id,
        ActivityUpdate {
          release_rate: Some(rate),
          ..Default::default()
        },
      )
      .await?;

    let tasks = self.tasks.read().await;
    match tasks.get(&activity_id) {
      Some(running) => {
        let old = running.task.release_rate();
        running.task.set_release_rate(rate);
        info!(activity_id, old_rate = old, new_rate = rate, "Updated release rate");
      }
      None => {
        warn!(activity_id, "No running task to patch; rate persisted only");
      }
    }
    Ok(())
  }

  /// 手动释放：一次计划外的游标推进，事件以 rate = -1 标记
  /// Manual release: one off-schedule cursor advance, logged with
  /// rate = -1
  pub async fn manual_release(&self, activity_id: i64, count: i64) -> Result<i64> {
    let tenant_id = {
      let tasks = self.tasks.read().await;
      let running = tasks
        .get(&activity_id)
        .ok_or_else(|| Error::other(format!("scheduler not running for activity {activity_id}")))?;
      running.task.tenant_id.clone()
    };

    let release_key = keys::release_seq_key(&tenant_id, activity_id);
    let release_seq = self.store.get_int(&release_key).await?.unwrap_or(0);
    let new_seq = release_seq + count;
    self
      .store
      .set_int(&release_key, new_seq, Some(RELEASE_SEQ_TTL))
      .await?;

    let event = ReleaseEvent {
      activity_id,
      tenant_id: tenant_id.clone(),
      prev_seq: release_seq,
      new_seq,
      release_count: count,
      timestamp: Utc::now(),
      release_rate: -1,
    };
    spawn_release_bookkeeping(self.store.clone(), event);

    info!(activity_id, count, new_seq, "Manual release");
    Ok(new_seq)
  }

  /// 为一个活动拉起调度任务；已存在时为空操作
  /// Spawn the scheduler task for one activity; a no-op when one exists
  async fn spawn_task(&self, activity: &Activity) -> Result<()> {
    spawn_for(
      &self.store,
      &self.registry,
      &self.tasks,
      &self.shutdown_tx,
      activity,
    )
    .await
  }

  /// 对账循环：每 30 秒把任务集同步到目录中的可进入活动
  /// Reconciliation loop: every 30 s sync the task set against the live
  /// activities in the registry
  fn spawn_reconcile_loop(&self) -> JoinHandle<()> {
    let store = self.store.clone();
    let registry = self.registry.clone();
    let tasks = self.tasks.clone();
    let shutdown_tx = self.shutdown_tx.clone();
    let mut shutdown_rx = self.shutdown_tx.subscribe();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // 第一个 tick 立即返回，跳过它
      // The first tick fires immediately, skip it
      ticker.tick().await;
      loop {
        tokio::select! {
          _ = ticker.tick() => {
            if let Err(e) = reconcile(&store, &registry, &tasks, &shutdown_tx).await {
              error!(error = %e, "Failed to sync scheduler tasks");
            }
          }
          _ = shutdown_rx.changed() => break,
        }
      }
    })
  }

  /// 指标循环：每 10 秒汇报任务状态到计数存储
  /// Metrics loop: every 10 s report task state into the counter store
  fn spawn_metrics_loop(&self) -> JoinHandle<()> {
    let store = self.store.clone();
    let tasks = self.tasks.clone();
    let mut shutdown_rx = self.shutdown_tx.subscribe();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(METRICS_SWEEP_INTERVAL);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      ticker.tick().await;
      loop {
        tokio::select! {
          _ = ticker.tick() => {
            if let Err(e) = sweep_metrics(&store, &tasks).await {
              warn!(error = %e, "Failed to report scheduler metrics");
            }
          }
          _ = shutdown_rx.changed() => break,
        }
      }
    })
  }
}

/// 单个活动的调度循环
/// The scheduling loop of one activity
async fn run_task(
  store: Arc<dyn CounterStore>,
  registry: Arc<dyn ActivityRegistry>,
  task: Arc<SchedulerTask>,
  tasks: Arc<RwLock<HashMap<i64, RunningTask>>>,
  mut shutdown_rx: watch::Receiver<bool>,
) {
  let period = tick_period(task.release_rate());
  let mut ticker = tokio::time::interval(period);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        if task.is_stopped() || *shutdown_rx.borrow() {
          break;
        }
        if let Err(e) = release_tick(&store, &registry, &task).await {
          // 失败的 tick 只记录，不终止任务；下一个 tick 重试
          // A failed tick only logs, never kills the task; the next tick
          // retries
          error!(activity_id = task.activity_id, error = %e, "Release tick failed");
        }
        if task.is_stopped() {
          break;
        }
      }
      _ = task.stop_notify.notified() => break,
      _ = shutdown_rx.changed() => break,
    }
  }

  tasks.write().await.remove(&task.activity_id);
  info!(activity_id = task.activity_id, "Stopped release task");
}

/// 一个 tick：活性检查 → 读计数 → 算额度 → 推进游标 → 异步记账
/// One tick: liveness check → read counters → compute credit → advance the
/// cursor → asynchronous bookkeeping
async fn release_tick(
  store: &Arc<dyn CounterStore>,
  registry: &Arc<dyn ActivityRegistry>,
  task: &Arc<SchedulerTask>,
) -> Result<()> {
  match registry.get_activity(task.activity_id).await {
    Ok(activity) if activity.is_live(Utc::now()) => {}
    Ok(_) | Err(Error::ActivityNotFound { .. }) => {
      info!(activity_id = task.activity_id, "Activity no longer live, stopping task");
      task.request_stop();
      return Ok(());
    }
    Err(e) => return Err(e),
  }

  let queue_seq = store
    .get_int(&keys::queue_seq_key(&task.tenant_id, task.activity_id))
    .await?
    .unwrap_or(0);
  let release_key = keys::release_seq_key(&task.tenant_id, task.activity_id);
  let release_seq = store.get_int(&release_key).await?.unwrap_or(0);

  let queue_length = queue_seq - release_seq;
  if queue_length <= 0 {
    return Ok(());
  }

  let now = Utc::now();
  let elapsed = (now - task.last_release())
    .to_std()
    .unwrap_or(Duration::ZERO)
    .as_secs_f64();
  let count = release_credit(task.release_rate(), elapsed, queue_length);
  if count <= 0 {
    return Ok(());
  }

  let new_seq = release_seq + count;
  // 只有本任务写这个游标，无需 CAS
  // Only this task writes this cursor, no CAS needed
  store
    .set_int(&release_key, new_seq, Some(RELEASE_SEQ_TTL))
    .await?;

  let event = ReleaseEvent {
    activity_id: task.activity_id,
    tenant_id: task.tenant_id.clone(),
    prev_seq: release_seq,
    new_seq,
    release_count: count,
    timestamp: now,
    release_rate: task.release_rate() as i64,
  };
  spawn_release_bookkeeping(store.clone(), event);

  task.set_last_release(now);
  task.total_released.store(new_seq, Ordering::Relaxed);

  debug!(
    activity_id = task.activity_id,
    released = count,
    release_seq = new_seq,
    "Advanced release cursor"
  );
  Ok(())
}

/// 事件环与释放指标的异步记账；失败只记日志
/// Asynchronous bookkeeping of the event ring and release metrics; failures
/// only log
fn spawn_release_bookkeeping(store: Arc<dyn CounterStore>, event: ReleaseEvent) {
  tokio::spawn(async move {
    let payload = match serde_json::to_string(&event) {
      Ok(payload) => payload,
      Err(e) => {
        warn!(error = %e, "Failed to encode release event");
        return;
      }
    };
    let events_key = keys::release_events_key(&event.tenant_id, event.activity_id);
    if let Err(e) = store
      .push_event(&events_key, &payload, EVENT_RING_SIZE, EVENT_RING_TTL)
      .await
    {
      warn!(error = %e, "Failed to push release event");
    }

    let total_key = keys::metrics_key(&event.tenant_id, event.activity_id, "release_total");
    if store.incr_by(&total_key, event.release_count).await.is_ok() {
      let _ = store.expire(&total_key, METRICS_TTL).await;
    }

    let hour = event.timestamp.hour();
    let hourly_key = keys::metrics_key(
      &event.tenant_id,
      event.activity_id,
      &keys::release_hourly_metric(hour),
    );
    if store.incr_by(&hourly_key, event.release_count).await.is_ok() {
      let _ = store.expire(&hourly_key, HOURLY_METRICS_TTL).await;
    }
  });
}

/// 对账：为缺任务的可进入活动拉起任务、同步速率、终止不再
/// 可进入的任务
/// Reconcile: spawn tasks for live activities lacking one, sync rates,
/// terminate tasks of activities no longer live
async fn reconcile(
  store: &Arc<dyn CounterStore>,
  registry: &Arc<dyn ActivityRegistry>,
  tasks: &Arc<RwLock<HashMap<i64, RunningTask>>>,
  shutdown_tx: &watch::Sender<bool>,
) -> Result<()> {
  let live = registry.list_live_activities().await?;
  let live_ids: HashSet<i64> = live.iter().map(|a| a.id).collect();

  for activity in &live {
    let existing_rate = {
      let guard = tasks.read().await;
      guard.get(&activity.id).map(|r| r.task.release_rate())
    };
    match existing_rate {
      None if activity.config.release_rate > 0 => {
        spawn_for(store, registry, tasks, shutdown_tx, activity).await?;
      }
      Some(rate) if rate != activity.config.release_rate => {
        let guard = tasks.read().await;
        if let Some(running) = guard.get(&activity.id) {
          info!(
            activity_id = activity.id,
            old_rate = rate,
            new_rate = activity.config.release_rate,
            "Reconciled release rate"
          );
          running.task.set_release_rate(activity.config.release_rate);
        }
      }
      _ => {}
    }
  }

  let stale: Vec<Arc<SchedulerTask>> = {
    let guard = tasks.read().await;
    guard
      .values()
      .filter(|r| !live_ids.contains(&r.task.activity_id))
      .map(|r| r.task.clone())
      .collect()
  };
  for task in stale {
    info!(activity_id = task.activity_id, "Terminating task for inactive activity");
    task.request_stop();
  }

  Ok(())
}

/// 拉起一个活动的调度循环并登记到任务表
/// Spawn the scheduling loop of one activity and register it in the task
/// map
async fn spawn_for(
  store: &Arc<dyn CounterStore>,
  registry: &Arc<dyn ActivityRegistry>,
  tasks: &Arc<RwLock<HashMap<i64, RunningTask>>>,
  shutdown_tx: &watch::Sender<bool>,
  activity: &Activity,
) -> Result<()> {
  let mut guard = tasks.write().await;
  if guard.contains_key(&activity.id) {
    return Ok(());
  }

  let release_key = keys::release_seq_key(&activity.tenant_id, activity.id);
  let current_seq = match store.get_int(&release_key).await {
    Ok(seq) => seq.unwrap_or(0),
    Err(e) => {
      warn!(activity_id = activity.id, error = %e, "Failed to read release seq, starting at 0");
      0
    }
  };

  let task = Arc::new(SchedulerTask::new(activity, current_seq));
  let handle = tokio::spawn(run_task(
    store.clone(),
    registry.clone(),
    task.clone(),
    tasks.clone(),
    shutdown_tx.subscribe(),
  ));
  guard.insert(activity.id, RunningTask { task, handle });

  info!(
    activity_id = activity.id,
    rate = activity.config.release_rate,
    "Started release task"
  );
  Ok(())
}

/// 指标汇报：逐任务写调度器状态与释放统计，外加全局任务数
/// Metrics report: per-task scheduler status and release stats, plus the
/// global task count
async fn sweep_metrics(
  store: &Arc<dyn CounterStore>,
  tasks: &Arc<RwLock<HashMap<i64, RunningTask>>>,
) -> Result<()> {
  let snapshot: Vec<(i64, String, u32, i64)> = {
    let guard = tasks.read().await;
    guard
      .values()
      .map(|r| {
        (
          r.task.activity_id,
          r.task.tenant_id.clone(),
          r.task.release_rate(),
          r.task.total_released(),
        )
      })
      .collect()
  };

  for (activity_id, tenant_id, rate, total) in &snapshot {
    let status_key = keys::metrics_key(tenant_id, *activity_id, "scheduler_status");
    store
      .set_str(&status_key, "running", Some(SCHEDULER_STATUS_TTL))
      .await?;
    // 仪表盘扫描器使用的第二命名空间同步保留
    // The second namespace used by the dashboard scanner is kept in sync
    let scan_key = keys::scheduler_status_scan_key(tenant_id, *activity_id);
    store
      .set_str(&scan_key, "running", Some(SCHEDULER_STATUS_TTL))
      .await?;

    let total_key = keys::metrics_key(tenant_id, *activity_id, "total_released");
    store
      .set_int(&total_key, *total, Some(SCHEDULER_STATUS_TTL))
      .await?;
    let rate_key = keys::metrics_key(tenant_id, *activity_id, "current_release_rate");
    store
      .set_int(&rate_key, *rate as i64, Some(SCHEDULER_STATUS_TTL))
      .await?;
  }

  store
    .set_int(
      keys::GLOBAL_ACTIVE_SCHEDULERS,
      snapshot.len() as i64,
      Some(SCHEDULER_STATUS_TTL),
    )
    .await?;
  Ok(())
}

/// tick 周期：1000 ms / rate，下限 10 ms
/// Tick period: 1000 ms / rate, floored at 10 ms
fn tick_period(release_rate: u32) -> Duration {
  let period = Duration::from_millis(1000 / release_rate.max(1) as u64);
  period.max(MIN_TICK_INTERVAL)
}

/// 本次 tick 的释放额度
/// Release credit for this tick
///
/// 额度随真实流逝时间累积（延迟后追赶），下限 1，上限队列长度
/// （从不过冲）。
/// Credit accrues with real elapsed time (catching up after a delay),
/// floored at 1 and capped by the queue length (never overshooting).
fn release_credit(release_rate: u32, elapsed_secs: f64, queue_length: i64) -> i64 {
  let expected = (release_rate as f64 * elapsed_secs).floor() as i64;
  expected.max(1).min(queue_length)
}
