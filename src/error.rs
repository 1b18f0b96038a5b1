use thiserror::Error;

/// Errors surfaced by the cache layer.
///
/// Redis connectivity/protocol errors are mapped to [`CacheError::Backend`]
/// and propagated unchanged in meaning; nothing in this layer retries them.
/// Logical no-ops (removing a tag relation that does not exist, renaming a
/// tag that was never set) are not errors.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serde(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}
