// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed collection wrappers.
//!
//! Thin, command-by-command delegates to Redis, sharing the cache's store
//! handle and serializer. The tag-aware add paths stage the membership
//! write and the tag index write into one pipeline. Everything else is
//! plain passthrough: the collections add no semantics of their own.

pub mod dict;
pub mod geo;
pub mod list;
pub mod set;
pub mod sorted_set;

pub use dict::RedisDictionary;
pub use geo::RedisGeo;
pub use list::RedisList;
pub use set::RedisSet;
pub use sorted_set::RedisSortedSet;
