//! Typed Redis hash (dictionary).

use std::marker::PhantomData;

use redis::{cmd, pipe};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;
use crate::serializer::{JsonSerializer, Serializer};
use crate::store::RedisStore;
use crate::tags::codec::TagRef;
use crate::tags::manager::TagIndex;

/// A Redis hash mapping string fields to serialized `T` values.
#[derive(Clone)]
pub struct RedisDictionary<T, S: Serializer = JsonSerializer> {
    store: RedisStore,
    index: TagIndex,
    serializer: S,
    /// Caller-visible (unprefixed) key; tag references embed this form.
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S: Serializer> RedisDictionary<T, S> {
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

    /// HSET a field.
    pub async fn set(&self, field: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        self.set_with_tags(field, value, &[]).await
    }

    /// HSET a field and record it under the given tags, in one pipeline.
    pub async fn set_with_tags(
        &self,
        field: &str,
        value: &T,
        tags: &[&str],
    ) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(value)?;
        let pttls = if tags.is_empty() {
            vec![]
        } else {
            self.index.tag_ttls(tags).await?
        };

        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        pipeline
            .cmd("HSET")
            .arg(self.prefixed())
            .arg(field)
            .arg(&bytes)
            .ignore();
        if !tags.is_empty() {
            let reference = TagRef::HashField {
                key: self.key.clone(),
                field: field.to_string(),
            };
            self.index.stage_add(&mut pipeline, tags, &pttls, &reference, None);
        }
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to set field: {}", e)))
    }

    /// HGET a field.
    pub async fn get(&self, field: &str) -> Result<Option<T>, CacheError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.store.connection();
        let bytes: Option<Vec<u8>> = cmd("HGET")
            .arg(self.prefixed())
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to get field: {}", e)))?;
        match bytes {
            Some(b) => Ok(Some(self.serializer.from_bytes(&b)?)),
            None => Ok(None),
        }
    }

    /// HDEL. Returns whether the field existed. Tag references to the
    /// field are not touched; the next cleanup-enabled read prunes them.
    pub async fn remove(&self, field: &str) -> Result<bool, CacheError> {
        let mut conn = self.store.connection();
        let removed: i64 = cmd("HDEL")
            .arg(self.prefixed())
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to delete field: {}", e)))?;
        Ok(removed > 0)
    }

    /// HEXISTS.
    pub async fn contains(&self, field: &str) -> Result<bool, CacheError> {
        let mut conn = self.store.connection();
        let n: i64 = cmd("HEXISTS")
            .arg(self.prefixed())
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to check field: {}", e)))?;
        Ok(n > 0)
    }

    /// HKEYS.
    pub async fn fields(&self) -> Result<Vec<String>, CacheError> {
        let mut conn = self.store.connection();
        cmd("HKEYS")
            .arg(self.prefixed())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to list fields: {}", e)))
    }

    /// HLEN.
    pub async fn len(&self) -> Result<u64, CacheError> {
        let mut conn = self.store.connection();
        cmd("HLEN")
            .arg(self.prefixed())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read length: {}", e)))
    }

    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}
