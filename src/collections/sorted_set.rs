//! Typed Redis sorted set, including lexicographic range queries.

use std::marker::PhantomData;

use redis::{cmd, pipe};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;
use crate::serializer::{JsonSerializer, Serializer};
use crate::store::RedisStore;
use crate::tags::codec::TagRef;
use crate::tags::manager::TagIndex;

/// A Redis sorted set of serialized `T` members with f64 scores.
#[derive(Clone)]
pub struct RedisSortedSet<T, S: Serializer = JsonSerializer> {
    store: RedisStore,
    index: TagIndex,
    serializer: S,
    /// Caller-visible (unprefixed) key; tag references embed this form.
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S: Serializer> RedisSortedSet<T, S> {
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

    /// ZADD. Returns whether the member was newly added (a score update
    /// of an existing member returns `false`).
    pub async fn add(&self, score: f64, member: &T) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let mut conn = self.store.connection();
        let added: i64 = cmd("ZADD")
            .arg(self.prefixed())
            .arg(score)
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to add member: {}", e)))?;
        Ok(added > 0)
    }

    /// ZADD plus tag-index membership, in one pipeline.
    pub async fn add_with_tags(
        &self,
        score: f64,
        member: &T,
        tags: &[&str],
    ) -> Result<(), CacheError>
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
        pipeline
            .cmd("ZADD")
            .arg(self.prefixed())
            .arg(score)
            .arg(&bytes)
            .ignore();
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

    /// ZREM. Returns whether the member was present.
    pub async fn remove(&self, member: &T) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let mut conn = self.store.connection();
        let removed: i64 = cmd("ZREM")
            .arg(self.prefixed())
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to remove member: {}", e)))?;
        Ok(removed > 0)
    }

    /// ZSCORE.
    pub async fn score(&self, member: &T) -> Result<Option<f64>, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let mut conn = self.store.connection();
        cmd("ZSCORE")
            .arg(self.prefixed())
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read score: {}", e)))
    }

    /// ZRANK.
    pub async fn rank(&self, member: &T) -> Result<Option<u64>, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let mut conn = self.store.connection();
        cmd("ZRANK")
            .arg(self.prefixed())
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read rank: {}", e)))
    }

    /// ZRANGEBYSCORE.
    pub async fn range_by_score(&self, min: f64, max: f64) -> Result<Vec<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.store.connection();
        let raw: Vec<Vec<u8>> = cmd("ZRANGEBYSCORE")
            .arg(self.prefixed())
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to range: {}", e)))?;
        raw.iter().map(|b| self.serializer.from_bytes(b)).collect()
    }

    /// ZRANGEBYLEX over the raw serialized member bytes.
    ///
    /// Bounds use Redis lex syntax (`[`, `(`, `-`, `+`) and compare the
    /// serializer's byte output, not the logical value.
    pub async fn range_by_lex(&self, min: &str, max: &str) -> Result<Vec<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.store.connection();
        let raw: Vec<Vec<u8>> = cmd("ZRANGEBYLEX")
            .arg(self.prefixed())
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to lex range: {}", e)))?;
        raw.iter().map(|b| self.serializer.from_bytes(b)).collect()
    }

    /// ZCARD.
    pub async fn len(&self) -> Result<u64, CacheError> {
        let mut conn = self.store.connection();
        cmd("ZCARD")
            .arg(self.prefixed())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read cardinality: {}", e)))
    }

    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}
