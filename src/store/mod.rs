//! Redis store handle.

pub mod redis;

pub use redis::{KeyType, RedisStore};
