//! Typed Redis list.

use std::marker::PhantomData;

use redis::cmd;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;
use crate::serializer::{JsonSerializer, Serializer};
use crate::store::RedisStore;

/// A Redis list of serialized `T` values.
#[derive(Clone)]
pub struct RedisList<T, S: Serializer = JsonSerializer> {
    store: RedisStore,
    serializer: S,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S: Serializer> RedisList<T, S> {
    pub(crate) fn new(store: RedisStore, serializer: S, key: &str) -> Self {
        let key = store.prefixed_key(key);
        Self {
            store,
            serializer,
            key,
            _marker: PhantomData,
        }
    }

    /// RPUSH. Returns the list length after the push.
    pub async fn push_right(&self, value: &T) -> Result<i64, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(value)?;
        let mut conn = self.store.connection();
        cmd("RPUSH")
            .arg(&self.key)
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to push: {}", e)))
    }

    /// LPUSH. Returns the list length after the push.
    pub async fn push_left(&self, value: &T) -> Result<i64, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(value)?;
        let mut conn = self.store.connection();
        cmd("LPUSH")
            .arg(&self.key)
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to push: {}", e)))
    }

    /// LPOP.
    pub async fn pop_left(&self) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        self.pop("LPOP").await
    }

    /// RPOP.
    pub async fn pop_right(&self) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        self.pop("RPOP").await
    }

    async fn pop(&self, command: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.store.connection();
        let bytes: Option<Vec<u8>> = cmd(command)
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to pop: {}", e)))?;
        match bytes {
            Some(b) => Ok(Some(self.serializer.from_bytes(&b)?)),
            None => Ok(None),
        }
    }

    /// LRANGE. Negative indexes count from the tail, as in Redis.
    pub async fn range(&self, start: i64, stop: i64) -> Result<Vec<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.store.connection();
        let raw: Vec<Vec<u8>> = cmd("LRANGE")
            .arg(&self.key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to range: {}", e)))?;
        raw.iter().map(|b| self.serializer.from_bytes(b)).collect()
    }

    /// LLEN.
    pub async fn len(&self) -> Result<u64, CacheError> {
        let mut conn = self.store.connection();
        cmd("LLEN")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read length: {}", e)))
    }

    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }

    /// DEL the whole list.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.store.connection();
        let _: () = cmd("DEL")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to clear: {}", e)))?;
        Ok(())
    }
}
