//! Configuration for the tag cache.
//!
//! # Example
//!
//! ```
//! use tagcache::TagCacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = TagCacheConfig::default();
//! assert_eq!(config.scan_page_size, 100);
//!
//! // Full config
//! let config = TagCacheConfig {
//!     redis_url: "redis://localhost:6379".into(),
//!     key_prefix: Some("myapp:".into()),
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

use crate::tags::expiry::MergePolicy;

/// Configuration for [`TagCache`](crate::TagCache).
///
/// All fields except `redis_url` have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct TagCacheConfig {
    /// Redis connection string (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Optional key prefix for namespacing when sharing a Redis instance
    /// (e.g., "myapp:" -> "myapp:user.alice"). Applied to tag set keys too.
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// How a tagged write with no requested TTL treats a tag set that
    /// already carries an expiration. See [`MergePolicy`].
    #[serde(default)]
    pub merge_policy: MergePolicy,

    /// COUNT hint for incremental SCAN when listing tag names.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_scan_page_size() -> usize { 100 }

impl Default for TagCacheConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            key_prefix: None,
            merge_policy: MergePolicy::default(),
            scan_page_size: default_scan_page_size(),
        }
    }
}
