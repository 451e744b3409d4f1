//! # Waitroom
//!
//! Multi-tenant virtual waiting room backed by Redis
//!
//! Waitroom 是一个多租户虚拟排队室：当稀缺资源（秒杀、票务、
//! 限量注册）的预期需求超过下游服务的承受能力时，客户端进入
//! FIFO 队列，按到达顺序获得单调递增的序号，再按配置或动态
//! 调整的速率被逐步放行。下游服务只会看到被放行的流量。
//! Waitroom is a multi-tenant virtual waiting room: when expected demand
//! for a scarce resource (flash sale, ticket drop, limited registration)
//! exceeds what the downstream service can absorb, clients are admitted
//! into a FIFO line, each receiving a monotonically increasing sequence
//! number, and are progressively released at a configured or dynamically
//! adjusted rate. The downstream service only ever sees traffic the
//! waiting room has let through.
//!
//! ## 特性
//! ## Features
//!
//! - 原子 INCR 建立的到达全序与幂等重入
//!   - Total arrival order via atomic INCR, with idempotent rejoin
//! - 每活动一个的速率预算释放任务，延迟后追赶、从不过冲
//!   - Per-activity rate-budgeted release tasks that catch up after delays
//!     and never overshoot
//! - 监督者每 30 秒将任务集与活动目录对账，支持运行中调速
//!   - A supervisor reconciling the task set against the registry every
//!     30 s, with live rate updates
//! - 基于释放事件环的带置信度等待估计与自适应轮询间隔
//!   - Confidence-scored wait estimates from the release event ring, with
//!     adaptive poll intervals
//! - IP 节流与用户去重，重入永不触发限流
//!   - IP throttling and user dedupe; rejoin never trips the rate limit
//! - Redis 或内存计数存储，PostgresSQL 或内存活动目录
//!   - Redis or in-memory counter store, PostgresSQL or in-memory registry
//!
//! ## 快速开始
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use waitroom::admission::{AdmissionEngine, EnterRequest};
//! use waitroom::config::QueueConfig;
//! use waitroom::memdb::MemoryStore;
//! use waitroom::registry::MemoryRegistry;
//! use waitroom::scheduler::ReleaseScheduler;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 内存后端，本地运行不依赖外部服务
//!     // In-memory backends, runs locally without external services
//!     let store = Arc::new(MemoryStore::new());
//!     let registry = Arc::new(MemoryRegistry::new());
//!
//!     let engine = AdmissionEngine::new(store.clone(), registry.clone(), QueueConfig::default());
//!     let scheduler = ReleaseScheduler::new(store, registry);
//!     scheduler.start().await?;
//!
//!     let response = engine
//!         .enter(&EnterRequest {
//!             activity_id: 1,
//!             user_hash: "user-1".to_string(),
//!             fingerprint: String::new(),
//!             ip: "203.0.113.7".to_string(),
//!         })
//!         .await?;
//!     println!("seq={} session={}", response.seq, response.session_id);
//!
//!     scheduler.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ### 使用 Redis 计数存储
//! ### Using the Redis counter store
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use waitroom::rdb::RedisStore;
//! use waitroom::redis::RedisConnectionType;
//!
//! # async fn example() -> waitroom::error::Result<()> {
//! let redis_config = RedisConnectionType::single("redis://127.0.0.1:6379")?;
//! let store = Arc::new(RedisStore::new(redis_config).await?);
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod admission;
pub mod base;
pub mod config;
pub mod error;
pub mod eta;
pub mod memdb;
pub mod rdb;
pub mod redis;
pub mod registry;
pub mod scheduler;
