//! Pluggable value serialization.
//!
//! Every typed value crossing the Redis boundary (cached objects, hash
//! fields, set/sorted-set members, pub/sub payloads) goes through a
//! [`Serializer`]. The serializer is an explicit constructor argument of
//! [`TagCache`](crate::TagCache) rather than process-global state, so two
//! caches in one process can use different encodings.
//!
//! [`JsonSerializer`] is the default and encodes with `serde_json`. Member
//! bytes produced here are also what gets embedded into encoded tag
//! references, so the serializer must be stable across writer and reader.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Value <-> byte encoding capability.
pub trait Serializer: Send + Sync + Clone {
    fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError>;
    fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError>;
}

/// Default serializer: compact JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(value).map_err(|e| CacheError::Serde(e.to_string()))
    }

    fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Serde(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let s = JsonSerializer;
        let bytes = s.to_bytes(&("Gala".to_string(), 42u32)).unwrap();
        let (name, n): (String, u32) = s.from_bytes(&bytes).unwrap();
        assert_eq!(name, "Gala");
        assert_eq!(n, 42);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let s = JsonSerializer;
        let result: Result<String, _> = s.from_bytes(b"\xff\xfe not json");
        assert!(result.is_err());
    }
}
