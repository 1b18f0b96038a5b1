//! Typed Redis geospatial index.
//!
//! A geo index is a sorted set under the hood, so tagged geo members use
//! the same set-member reference encoding as sorted sets. Geospatial math
//! (distances, radius queries) is Redis-native; this wrapper only delegates.

use std::marker::PhantomData;

use redis::{cmd, pipe};
use serde::Serialize;

use crate::error::CacheError;
use crate::serializer::{JsonSerializer, Serializer};
use crate::store::RedisStore;
use crate::tags::codec::TagRef;
use crate::tags::manager::TagIndex;

/// Unit argument for GEODIST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoUnit {
    Meters,
    Kilometers,
    Miles,
    Feet,
}

impl GeoUnit {
    fn as_arg(self) -> &'static str {
        match self {
            GeoUnit::Meters => "m",
            GeoUnit::Kilometers => "km",
            GeoUnit::Miles => "mi",
            GeoUnit::Feet => "ft",
        }
    }
}

/// A Redis geo index of serialized `T` members.
#[derive(Clone)]
pub struct RedisGeo<T, S: Serializer = JsonSerializer> {
    store: RedisStore,
    index: TagIndex,
    serializer: S,
    /// Caller-visible (unprefixed) key; tag references embed this form.
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S: Serializer> RedisGeo<T, S> {
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

    /// GEOADD. Returns whether the member was newly added.
    pub async fn add(&self, longitude: f64, latitude: f64, member: &T) -> Result<bool, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let mut conn = self.store.connection();
        let added: i64 = cmd("GEOADD")
            .arg(self.prefixed())
            .arg(longitude)
            .arg(latitude)
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to add geo member: {}", e)))?;
        Ok(added > 0)
    }

    /// GEOADD plus tag-index membership, in one pipeline.
    pub async fn add_with_tags(
        &self,
        longitude: f64,
        latitude: f64,
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
            .cmd("GEOADD")
            .arg(self.prefixed())
            .arg(longitude)
            .arg(latitude)
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
            .map_err(|e| CacheError::Backend(format!("Failed to add geo member: {}", e)))
    }

    /// GEOPOS. `None` when the member is absent.
    pub async fn position(&self, member: &T) -> Result<Option<(f64, f64)>, CacheError>
    where
        T: Serialize,
    {
        let bytes = self.serializer.to_bytes(member)?;
        let mut conn = self.store.connection();
        let mut positions: Vec<Option<(f64, f64)>> = cmd("GEOPOS")
            .arg(self.prefixed())
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read position: {}", e)))?;
        Ok(positions.pop().flatten())
    }

    /// GEODIST. `None` when either member is absent.
    pub async fn distance(
        &self,
        from: &T,
        to: &T,
        unit: GeoUnit,
    ) -> Result<Option<f64>, CacheError>
    where
        T: Serialize,
    {
        let from_bytes = self.serializer.to_bytes(from)?;
        let to_bytes = self.serializer.to_bytes(to)?;
        let mut conn = self.store.connection();
        cmd("GEODIST")
            .arg(self.prefixed())
            .arg(&from_bytes)
            .arg(&to_bytes)
            .arg(unit.as_arg())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read distance: {}", e)))
    }
}
