//! Typed Redis set.

use std::marker::PhantomData;

use redis::{cmd, pipe};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;
use crate::serializer::{JsonSerializer, Serializer};
use crate::store::RedisStore;
use crate::tags::codec::TagRef;
use crate::tags::manager::TagIndex;

/// A Redis set of serialized `T` members.
#[derive(Clone)]
pub struct RedisSet<T, S: Serializer = JsonSerializer> {
    store: RedisStore,
    index: TagIndex,
    serializer: S,
    /// Caller-visible (unprefixed) key; tag references embed this form.
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S: Serializer> RedisSet<T, S> {
    pub(crate) fn new(store: RedisStore, index: TagIndex, serializer: S, key: &str) -> Self {
        Self {
            store,
            index,
            serializer,
            key: key.to_string(),
            _marker: PhantomData,
        }
    }

    fn prefixed(&self) -> String {
        self.store.prefixed_key(&self.key)
    }

    /// SADD. Returns whether the member was newly added.
    pub async fn add(&self, member: &T) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let mut conn = self.store.connection();
        let added: i64 = cmd("SADD")
            .arg(self.prefixed())
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to add member: {}", e)))?;
        Ok(added > 0)
    }

    /// SADD plus tag-index membership, in one pipeline.
    pub async fn add_with_tags(&self, member: &T, tags: &[&str]) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let pttls = if tags.is_empty() {
            vec![]
        } else {
            self.index.tag_ttls(tags).await?
        };

        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        pipeline.cmd("SADD").arg(self.prefixed()).arg(&bytes).ignore();
        if !tags.is_empty() {
            let reference = TagRef::SetMember {
                key: self.key.clone(),
                member: bytes.clone(),
            };
            self.index.stage_add(&mut pipeline, tags, &pttls, &reference, None);
        }
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to add member: {}", e)))
    }

    /// SREM. Returns whether the member was present. Tag references are
    /// not touched; the next cleanup-enabled read prunes them.
    pub async fn remove(&self, member: &T) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let mut conn = self.store.connection();
        let removed: i64 = cmd("SREM")
            .arg(self.prefixed())
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to remove member: {}", e)))?;
        Ok(removed > 0)
    }

    /// SISMEMBER.
    pub async fn contains(&self, member: &T) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let mut conn = self.store.connection();
        let n: i64 = cmd("SISMEMBER")
            .arg(self.prefixed())
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to check member: {}", e)))?;
        Ok(n > 0)
    }

    /// SMEMBERS.
    pub async fn members(&self) -> Result<Vec<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.store.connection();
        let raw: Vec<Vec<u8>> = cmd("SMEMBERS")
            .arg(self.prefixed())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to list members: {}", e)))?;
        raw.iter().map(|b| self.serializer.from_bytes(b)).collect()
    }

    /// SCARD.
    pub async fn len(&self) -> Result<u64, CacheError> {
        let mut conn = self.store.connection();
        cmd("SCARD")
            .arg(self.prefixed())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read cardinality: {}", e)))
    }

    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}
