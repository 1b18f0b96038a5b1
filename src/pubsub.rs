// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed pub/sub helpers.
//!
//! Messages are serialized with the cache's configured serializer; the
//! subscriber supplies the expected type at the receive call site, so no
//! runtime type sniffing happens on the wire. Pub/sub needs a dedicated
//! connection (the multiplexer cannot carry subscriber state), taken from
//! the store's underlying client per subscription.

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::TagCache;
use crate::error::CacheError;
use crate::serializer::Serializer;

/// An active subscription on one or more channels.
pub struct Subscription<S: Serializer> {
    pubsub: redis::aio::PubSub,
    serializer: S,
}

impl<S: Serializer> Subscription<S> {
    /// Await the next message and deserialize it as `T`.
    ///
    /// `None` when the connection closes. A payload that does not decode
    /// as `T` is an error for that message only; the subscription stays
    /// usable.
    pub async fn next_message<T: DeserializeOwned>(
        &mut self,
    ) -> Option<Result<(String, T), CacheError>> {
        let msg = self.pubsub.on_message().next().await?;
        let channel = msg.get_channel_name().to_string();
        let decoded = self.serializer.from_bytes(msg.get_payload_bytes());
        Some(decoded.map(|value| (channel, value)))
    }
}

impl<S: Serializer> TagCache<S> {
    /// PUBLISH a serialized message. Returns the number of receivers.
    pub async fn publish<T: Serialize>(
        &self,
        channel: &str,
        message: &T,
    ) -> Result<u64, CacheError> {
        let bytes = self.serializer().to_bytes(message)?;
        let mut conn = self.store().connection();
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(&bytes)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to publish: {}", e)))
    }

    /// SUBSCRIBE to the given channels on a dedicated connection.
    pub async fn subscribe(&self, channels: &[&str]) -> Result<Subscription<S>, CacheError> {
        let mut pubsub = self
            .store()
            .client()
            .get_async_pubsub()
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to open pub/sub: {}", e)))?;
        for channel in channels {
            pubsub
                .subscribe(channel)
                .await
                .map_err(|e| CacheError::Backend(format!("Failed to subscribe: {}", e)))?;
        }
        Ok(Subscription {
            pubsub,
            serializer: self.serializer().clone(),
        })
    }
}
