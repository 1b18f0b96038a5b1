//! The tag-indexing subsystem.
//!
//! - [`codec`]: encodes key / hash-field / set-member references into the
//!   single value space of a tag's Redis SET;
//! - [`expiry`]: merges TTLs so a tag set outlives every item it indexes;
//! - [`manager`]: add / remove / rename / enumerate / cleanup / invalidate
//!   over pipelined store batches.

pub mod codec;
pub mod expiry;
pub mod manager;

pub use codec::TagRef;
pub use expiry::{ExpireAction, KeyTtl, MergePolicy};
pub use manager::TagIndex;
