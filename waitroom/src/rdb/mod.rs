//! Redis 后端模块
//! Redis backend module

mod redis_store;

pub use redis_store::RedisStore;
