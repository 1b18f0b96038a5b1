// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The main cache facade.
//!
//! [`TagCache`] ties together the Redis store handle, the configured
//! serializer, and the tag index. Object and hash operations serialize
//! through the cache's [`Serializer`]; when tags are supplied, the value
//! write and the tag memberships go to Redis in a single pipelined round
//! trip (the TTL reads feeding the expiration merge are a separate,
//! preceding round trip).
//!
//! The facade is `Clone` and cheap to clone: clones share the underlying
//! connection multiplexer. All operations are stateless; concurrency is
//! whatever the caller's runtime provides.

use std::collections::HashSet;
use std::time::Duration;

use redis::{cmd, pipe};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::collections::{RedisDictionary, RedisGeo, RedisList, RedisSet, RedisSortedSet};
use crate::config::TagCacheConfig;
use crate::error::CacheError;
use crate::metrics;
use crate::serializer::{JsonSerializer, Serializer};
use crate::store::RedisStore;
use crate::tags::codec::TagRef;
use crate::tags::expiry::KeyTtl;
use crate::tags::manager::TagIndex;

/// Typed, tag-aware cache over Redis.
#[derive(Clone)]
pub struct TagCache<S: Serializer = JsonSerializer> {
    store: RedisStore,
    serializer: S,
    index: TagIndex,
}

impl TagCache<JsonSerializer> {
    /// Connect with the default JSON serializer.
    pub async fn connect(config: TagCacheConfig) -> Result<Self, CacheError> {
        Self::connect_with(config, JsonSerializer).await
    }
}

impl<S: Serializer> TagCache<S> {
    /// Connect with an explicit serializer.
    pub async fn connect_with(config: TagCacheConfig, serializer: S) -> Result<Self, CacheError> {
        let store = RedisStore::with_prefix(&config.redis_url, config.key_prefix.as_deref()).await?;
        let index = TagIndex::new(store.clone(), config.merge_policy, config.scan_page_size);
        Ok(Self {
            store,
            serializer,
            index,
        })
    }

    /// The underlying store handle.
    pub fn store(&self) -> &RedisStore {
        &self.store
    }

    /// The tag index manager.
    pub fn tags(&self) -> &TagIndex {
        &self.index
    }

    /// The configured serializer.
    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    // ── Object cache ────────────────────────────────────────────────────

    /// Serialize and SET a value, with optional TTL and tags.
    ///
    /// With tags, the SET and the tag memberships share one write pipeline.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> Result<(), CacheError> {
        let _timer = metrics::LatencyTimer::new("set");
        let bytes = self.serializer.to_bytes(value)?;
        let prefixed = self.store.prefixed_key(key);

        let pttls = if tags.is_empty() {
            vec![]
        } else {
            self.index.tag_ttls(tags).await?
        };

        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        let set_cmd = pipeline.cmd("SET").arg(&prefixed).arg(&bytes);
        if let Some(ttl) = ttl {
            set_cmd.arg("PX").arg(ttl.as_millis() as i64);
        }
        set_cmd.ignore();
        if !tags.is_empty() {
            self.index
                .stage_add(&mut pipeline, tags, &pttls, &TagRef::Key(key.to_string()), ttl);
        }
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to set key: {}", e)))?;

        metrics::record_operation("set", "success");
        Ok(())
    }

    /// GET and deserialize a value. `None` when the key does not exist.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let _timer = metrics::LatencyTimer::new("get");
        let mut conn = self.store.connection();
        let bytes: Option<Vec<u8>> = cmd("GET")
            .arg(self.store.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to get key: {}", e)))?;
        match bytes {
            Some(b) => Ok(Some(self.serializer.from_bytes(&b)?)),
            None => Ok(None),
        }
    }

    /// DEL a key. Returns whether it existed.
    ///
    /// This does not touch tag sets; a tagged key removed here leaves a
    /// stale reference behind, repaired by the next cleanup-enabled read.
    pub async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.store.connection();
        let removed: i64 = cmd("DEL")
            .arg(self.store.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to delete key: {}", e)))?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.store.connection();
        let n: i64 = cmd("EXISTS")
            .arg(self.store.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to check key: {}", e)))?;
        Ok(n > 0)
    }

    /// Remaining TTL of a key.
    pub async fn key_ttl(&self, key: &str) -> Result<KeyTtl, CacheError> {
        let pttls = self.store.pttls(&[self.store.prefixed_key(key)]).await?;
        Ok(KeyTtl::from_pttl(pttls[0]))
    }

    /// PEXPIRE a key. Returns whether the key exists.
    pub async fn expire_key(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.store.connection();
        let set: i64 = cmd("PEXPIRE")
            .arg(self.store.prefixed_key(key))
            .arg(ttl.as_millis() as i64)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to expire key: {}", e)))?;
        Ok(set > 0)
    }

    /// PERSIST a key (remove its expiration). Returns whether an
    /// expiration was removed.
    pub async fn persist_key(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.store.connection();
        let persisted: i64 = cmd("PERSIST")
            .arg(self.store.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to persist key: {}", e)))?;
        Ok(persisted > 0)
    }

    // ── Hash facade ─────────────────────────────────────────────────────

    /// Serialize and HSET a field, with optional TTL (applied to the hash
    /// key) and tags (recorded as hash-field references).
    pub async fn hash_set<T: Serialize>(
        &self,
        key: &str,
        field: &str,
        value: &T,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> Result<(), CacheError> {
        let _timer = metrics::LatencyTimer::new("hash_set");
        let bytes = self.serializer.to_bytes(value)?;
        let prefixed = self.store.prefixed_key(key);

        let pttls = if tags.is_empty() {
            vec![]
        } else {
            self.index.tag_ttls(tags).await?
        };

        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        pipeline.cmd("HSET").arg(&prefixed).arg(field).arg(&bytes).ignore();
        if let Some(ttl) = ttl {
            pipeline
                .cmd("PEXPIRE")
                .arg(&prefixed)
                .arg(ttl.as_millis() as i64)
                .ignore();
        }
        if !tags.is_empty() {
            let reference = TagRef::HashField {
                key: key.to_string(),
                field: field.to_string(),
            };
            self.index.stage_add(&mut pipeline, tags, &pttls, &reference, ttl);
        }
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to set hash field: {}", e)))?;

        metrics::record_operation("hash_set", "success");
        Ok(())
    }

    /// HGET and deserialize a field.
    pub async fn hash_get<T: DeserializeOwned>(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<T>, CacheError> {
        let mut conn = self.store.connection();
        let bytes: Option<Vec<u8>> = cmd("HGET")
            .arg(self.store.prefixed_key(key))
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to get hash field: {}", e)))?;
        match bytes {
            Some(b) => Ok(Some(self.serializer.from_bytes(&b)?)),
            None => Ok(None),
        }
    }

    /// HDEL a field. Returns whether it existed.
    pub async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        let mut conn = self.store.connection();
        let removed: i64 = cmd("HDEL")
            .arg(self.store.prefixed_key(key))
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to delete hash field: {}", e)))?;
        Ok(removed > 0)
    }

    // ── Tag surface ─────────────────────────────────────────────────────

    /// Tag an existing (or future) string key.
    pub async fn add_tags_to_key(&self, key: &str, tags: &[&str]) -> Result<(), CacheError> {
        self.index
            .add_refs(tags, &TagRef::Key(key.to_string()), None)
            .await
    }

    /// Tag a hash field.
    pub async fn add_tags_to_hash_field(
        &self,
        key: &str,
        field: &str,
        tags: &[&str],
    ) -> Result<(), CacheError> {
        let reference = TagRef::HashField {
            key: key.to_string(),
            field: field.to_string(),
        };
        self.index.add_refs(tags, &reference, None).await
    }

    /// Tag a set / sorted-set / geo member. The member is serialized with
    /// the cache's serializer, which must match the bytes stored in the
    /// collection itself.
    pub async fn add_tags_to_set_member<T: Serialize>(
        &self,
        key: &str,
        member: &T,
        tags: &[&str],
    ) -> Result<(), CacheError> {
        let reference = TagRef::SetMember {
            key: key.to_string(),
            member: self.serializer.to_bytes(member)?,
        };
        self.index.add_refs(tags, &reference, None).await
    }

    /// Untag a string key. Silent no-op for tags that never held it.
    pub async fn remove_tags_from_key(&self, key: &str, tags: &[&str]) -> Result<(), CacheError> {
        self.index
            .remove_refs(tags, &TagRef::Key(key.to_string()))
            .await
    }

    pub async fn remove_tags_from_hash_field(
        &self,
        key: &str,
        field: &str,
        tags: &[&str],
    ) -> Result<(), CacheError> {
        let reference = TagRef::HashField {
            key: key.to_string(),
            field: field.to_string(),
        };
        self.index.remove_refs(tags, &reference).await
    }

    pub async fn remove_tags_from_set_member<T: Serialize>(
        &self,
        key: &str,
        member: &T,
        tags: &[&str],
    ) -> Result<(), CacheError> {
        let reference = TagRef::SetMember {
            key: key.to_string(),
            member: self.serializer.to_bytes(member)?,
        };
        self.index.remove_refs(tags, &reference).await
    }

    /// Move a key's membership from one tag to another. Returns `false`
    /// (leaving both tags unchanged) if the key was not under `old_tag`.
    pub async fn rename_tag_for_key(
        &self,
        key: &str,
        old_tag: &str,
        new_tag: &str,
    ) -> Result<bool, CacheError> {
        self.index
            .rename_ref(old_tag, new_tag, &TagRef::Key(key.to_string()))
            .await
    }

    pub async fn rename_tag_for_hash_field(
        &self,
        key: &str,
        field: &str,
        old_tag: &str,
        new_tag: &str,
    ) -> Result<bool, CacheError> {
        let reference = TagRef::HashField {
            key: key.to_string(),
            field: field.to_string(),
        };
        self.index.rename_ref(old_tag, new_tag, &reference).await
    }

    pub async fn rename_tag_for_set_member<T: Serialize>(
        &self,
        key: &str,
        member: &T,
        old_tag: &str,
        new_tag: &str,
    ) -> Result<bool, CacheError> {
        let reference = TagRef::SetMember {
            key: key.to_string(),
            member: self.serializer.to_bytes(member)?,
        };
        self.index.rename_ref(old_tag, new_tag, &reference).await
    }

    /// All encoded references under the given tags, as display strings.
    ///
    /// With `cleanup=false` (fast path) stale references may be included;
    /// with `cleanup=true` every reference is verified and dead ones are
    /// pruned from their tag sets before being excluded from the result.
    pub async fn get_keys_by_tag(
        &self,
        tags: &[&str],
        cleanup: bool,
    ) -> Result<HashSet<String>, CacheError> {
        let refs = self.index.enumerate(tags, cleanup).await?;
        Ok(refs
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect())
    }

    /// Deserialize every live value under the given tags, in no guaranteed
    /// order. References whose read fails or whose bytes do not decode as
    /// `T` are silently skipped.
    pub async fn get_objects_by_tag<T: DeserializeOwned>(
        &self,
        tags: &[&str],
    ) -> Result<Vec<T>, CacheError> {
        let raw = self.index.read_values(tags).await?;
        let mut values = Vec::with_capacity(raw.len());
        for bytes in raw {
            match self.serializer.from_bytes(&bytes) {
                Ok(v) => values.push(v),
                Err(e) => debug!("skipping undecodable tagged value: {}", e),
            }
        }
        Ok(values)
    }

    /// Delete everything the given tags point to, plus the tags themselves.
    pub async fn invalidate_keys_by_tag(&self, tags: &[&str]) -> Result<(), CacheError> {
        self.index.invalidate(tags).await
    }

    /// Every tag name currently present in the store.
    pub async fn get_all_tags(&self) -> Result<Vec<String>, CacheError> {
        self.index.all_tag_names().await
    }

    // ── Typed collections ───────────────────────────────────────────────

    pub fn list<T>(&self, key: &str) -> RedisList<T, S> {
        RedisList::new(self.store.clone(), self.serializer.clone(), key)
    }

    pub fn dictionary<T>(&self, key: &str) -> RedisDictionary<T, S> {
        RedisDictionary::new(
            self.store.clone(),
            self.index.clone(),
            self.serializer.clone(),
            key,
        )
    }

    pub fn set_of<T>(&self, key: &str) -> RedisSet<T, S> {
        RedisSet::new(
            self.store.clone(),
            self.index.clone(),
            self.serializer.clone(),
            key,
        )
    }

    pub fn sorted_set<T>(&self, key: &str) -> RedisSortedSet<T, S> {
        RedisSortedSet::new(
            self.store.clone(),
            self.index.clone(),
            self.serializer.clone(),
            key,
        )
    }

    pub fn geo<T>(&self, key: &str) -> RedisGeo<T, S> {
        RedisGeo::new(
            self.store.clone(),
            self.index.clone(),
            self.serializer.clone(),
            key,
        )
    }
}
