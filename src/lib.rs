//! # tagcache
//!
//! Typed, tag-aware object caching over Redis.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TagCache Facade                        │
//! │  • Typed object / hash operations via Serializer            │
//! │  • Typed collections: list, dict, set, sorted set, geo      │
//! │  • Typed pub/sub helpers                                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Tag Index                             │
//! │  • One native Redis SET per tag name                        │
//! │  • Members encode key / hash-field / set-member references  │
//! │  • TTL merge keeps a tag alive as long as its items         │
//! │  • Enumerate / invalidate / cleanup in pipelined batches    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Redis Store                           │
//! │  • Shared ConnectionManager multiplexer                     │
//! │  • Key prefixing, TYPE/PTTL probes, SCAN, pipelines         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tagcache::{TagCache, TagCacheConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TagCacheConfig {
//!         redis_url: "redis://localhost:6379".into(),
//!         ..Default::default()
//!     };
//!     let cache = TagCache::connect(config).await.expect("Failed to connect");
//!
//!     // Cache a value under two tags
//!     cache.set("apple", &"Gala".to_string(), None, &["red", "fruit"])
//!         .await
//!         .expect("Failed to set");
//!
//!     // Everything tagged "red", in one shot
//!     let reds: Vec<String> = cache.get_objects_by_tag(&["red"]).await.unwrap();
//!     println!("{:?}", reds);
//!
//!     // Delete every "red" item plus the tag itself
//!     cache.invalidate_keys_by_tag(&["red"]).await.unwrap();
//! }
//! ```
//!
//! ## Consistency model
//!
//! The library composes multiple Redis primitives into higher-level,
//! atomic-feeling operations without multi-key transactions (the target may
//! be a cluster). Multi-step sequences are pipelined best-effort batches;
//! tag indexes are eventually consistent with the data they describe, and
//! the opt-in cleanup path on enumeration is the repair mechanism. See
//! [`tags::manager`] for the exact guarantees.
//!
//! ## Modules
//!
//! - [`cache`]: the main [`TagCache`] facade
//! - [`tags`]: the tag-indexing subsystem (codec, TTL merge, manager)
//! - [`collections`]: typed list / dict / set / sorted-set / geo wrappers
//! - [`pubsub`]: typed publish/subscribe
//! - [`store`]: the shared Redis connection handle
//! - [`serializer`]: pluggable value encoding
//! - [`metrics`]: `metrics`-crate instrumentation

pub mod cache;
pub mod collections;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pubsub;
pub mod retry;
pub mod serializer;
pub mod store;
pub mod tags;

pub use cache::TagCache;
pub use collections::{RedisDictionary, RedisGeo, RedisList, RedisSet, RedisSortedSet};
pub use collections::geo::GeoUnit;
pub use config::TagCacheConfig;
pub use error::CacheError;
pub use pubsub::Subscription;
pub use serializer::{JsonSerializer, Serializer};
pub use store::{KeyType, RedisStore};
pub use tags::{ExpireAction, KeyTtl, MergePolicy, TagIndex, TagRef};
pub use metrics::LatencyTimer;
