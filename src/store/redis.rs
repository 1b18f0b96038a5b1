//! Shared Redis connection handle.
//!
//! Wraps the `redis` crate's [`ConnectionManager`]: a cloneable, thread-safe
//! multiplexer reused concurrently by any number of in-flight operations
//! without locking in this layer. Command ordering is guaranteed only within
//! a single pipeline; across operations the store's own processing order
//! decides.
//!
//! Also owns key prefixing (namespacing when sharing a Redis instance with
//! other applications) and the introspection probes the tag index needs:
//! key type (TYPE) and remaining TTL (PTTL), both pipelined for batches.

use redis::aio::ConnectionManager;
use redis::{cmd, pipe, Client};
use tracing::instrument;

use crate::error::CacheError;
use crate::retry::{retry, RetryConfig};

/// Native Redis type of a key, from the TYPE command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Key does not exist ("none").
    Missing,
    String,
    List,
    Set,
    ZSet,
    Hash,
    /// Stream, module type, or anything this layer has no branch for.
    Other,
}

impl KeyType {
    pub fn from_reply(reply: &str) -> KeyType {
        match reply {
            "none" => KeyType::Missing,
            "string" => KeyType::String,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::ZSet,
            "hash" => KeyType::Hash,
            _ => KeyType::Other,
        }
    }

    pub fn exists(self) -> bool {
        self != KeyType::Missing
    }
}

/// Redis connection + key prefix.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "myapp:" → "myapp:user.alice")
    prefix: String,
}

impl RedisStore {
    /// Connect without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, CacheError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Connect with an optional key prefix.
    ///
    /// The prefix is prepended to all keys, including tag set keys, enabling
    /// namespacing when sharing a Redis instance with other applications.
    pub async fn with_prefix(
        connection_string: &str,
        prefix: Option<&str>,
    ) -> Result<Self, CacheError> {
        let client =
            Client::open(connection_string).map_err(|e| CacheError::Backend(e.to_string()))?;

        // Use startup config: fast-fail after ~5s, don't hang forever
        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| CacheError::Backend(e.to_string()))?;

        Ok(Self {
            client,
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    /// Get a clone of the connection manager (cheap, shares the multiplexer).
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// The underlying client, for connections the manager cannot multiplex
    /// (pub/sub).
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Apply the prefix to a key.
    #[inline]
    pub fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Probe the native type of one (already prefixed) key.
    #[instrument(skip(self))]
    pub async fn key_type(&self, prefixed_key: &str) -> Result<KeyType, CacheError> {
        let mut conn = self.connection.clone();
        let reply: String = cmd("TYPE")
            .arg(prefixed_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to probe key type: {}", e)))?;
        Ok(KeyType::from_reply(&reply))
    }

    /// Probe the native types of several (already prefixed) keys in one
    /// round trip. Result order matches input order.
    pub async fn key_types(&self, prefixed_keys: &[String]) -> Result<Vec<KeyType>, CacheError> {
        if prefixed_keys.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = self.connection.clone();
        let mut pipeline = pipe();
        for key in prefixed_keys {
            pipeline.cmd("TYPE").arg(key);
        }
        let replies: Vec<String> = pipeline
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to probe key types: {}", e)))?;
        Ok(replies.iter().map(|r| KeyType::from_reply(r)).collect())
    }

    /// Remaining TTLs in milliseconds (raw PTTL replies: -2 missing,
    /// -1 persistent) for several keys in one round trip.
    pub async fn pttls(&self, prefixed_keys: &[String]) -> Result<Vec<i64>, CacheError> {
        if prefixed_keys.is_empty() {
            return Ok(vec![]);
        }
        let mut conn = self.connection.clone();
        let mut pipeline = pipe();
        for key in prefixed_keys {
            pipeline.cmd("PTTL").arg(key);
        }
        let replies: Vec<i64> = pipeline
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read TTLs: {}", e)))?;
        Ok(replies)
    }

    /// Incrementally SCAN the keyspace for keys matching `pattern`.
    ///
    /// Uses SCAN instead of KEYS to avoid blocking Redis; cost is
    /// proportional to the total keyspace, paged by `count`.
    pub async fn scan_keys(&self, pattern: &str, count: usize) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection.clone();
        let mut keys: Vec<String> = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (new_cursor, batch): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(format!("Failed to scan keys: {}", e)))?;

            keys.extend(batch);
            cursor = new_cursor;

            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}
