// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Expiration merging for tag set keys.
//!
//! A tag set must outlive every item tagged into it, or Redis would evict
//! the index while live items still reference it. On every tagged write the
//! tag set's remaining TTL is read back and merged with the requested TTL;
//! the merged result only ever lengthens the tag's lifetime.
//!
//! Two historical behaviors exist for "key already has a TTL, caller
//! requested none": treat it as an explicit persist, or leave the
//! expiration untouched. Both are implemented as [`MergePolicy`] variants;
//! the default leaves expiration untouched, so a TTL-less write never
//! silently strips an existing expiration.

use std::time::Duration;
use serde::Deserialize;

/// Remaining time-to-live of a Redis key, as reported by PTTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist (PTTL -2).
    Missing,
    /// Key exists with no expiration (PTTL -1).
    Persistent,
    /// Key expires after this duration (PTTL >= 0).
    Remaining(Duration),
}

impl KeyTtl {
    /// Interpret a raw PTTL reply.
    pub fn from_pttl(millis: i64) -> KeyTtl {
        match millis {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Remaining(Duration::from_millis(ms.max(0) as u64)),
        }
    }
}

/// What a tagged write with no requested TTL does to a tag set that already
/// carries an expiration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Leave the current expiration untouched.
    #[default]
    KeepCurrent,
    /// Remove the expiration entirely (legacy behavior).
    PersistOnNone,
}

/// The expiration command to issue after merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireAction {
    /// Do not touch the key's expiration.
    Skip,
    /// PEXPIRE the key to this duration.
    Set(Duration),
    /// PERSIST the key (remove its expiration).
    Persist,
}

/// Merge the tag set's current TTL with a newly requested one.
///
/// The result never shortens the key's lifetime:
/// - missing key: the requested TTL applies as-is (or nothing);
/// - both present: the longer of the two wins, and an equal-or-shorter
///   request is skipped rather than rewritten;
/// - already persistent: nothing can outlive forever, skip;
/// - existing TTL, no request: decided by `policy`.
pub fn merge(existing: KeyTtl, requested: Option<Duration>, policy: MergePolicy) -> ExpireAction {
    match (existing, requested) {
        (KeyTtl::Missing, Some(ttl)) => ExpireAction::Set(ttl),
        (KeyTtl::Missing, None) => ExpireAction::Skip,
        (KeyTtl::Persistent, _) => ExpireAction::Skip,
        (KeyTtl::Remaining(current), Some(ttl)) => {
            if ttl > current {
                ExpireAction::Set(ttl)
            } else {
                ExpireAction::Skip
            }
        }
        (KeyTtl::Remaining(_), None) => match policy {
            MergePolicy::KeepCurrent => ExpireAction::Skip,
            MergePolicy::PersistOnNone => ExpireAction::Persist,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S100: Duration = Duration::from_secs(100);
    const S50: Duration = Duration::from_secs(50);
    const S200: Duration = Duration::from_secs(200);

    #[test]
    fn test_pttl_interpretation() {
        assert_eq!(KeyTtl::from_pttl(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_pttl(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_pttl(1500),
            KeyTtl::Remaining(Duration::from_millis(1500))
        );
        assert_eq!(KeyTtl::from_pttl(0), KeyTtl::Remaining(Duration::ZERO));
    }

    #[test]
    fn test_missing_key_takes_request_verbatim() {
        assert_eq!(
            merge(KeyTtl::Missing, Some(S50), MergePolicy::KeepCurrent),
            ExpireAction::Set(S50)
        );
        assert_eq!(
            merge(KeyTtl::Missing, None, MergePolicy::KeepCurrent),
            ExpireAction::Skip
        );
    }

    #[test]
    fn test_longer_request_extends() {
        assert_eq!(
            merge(KeyTtl::Remaining(S100), Some(S200), MergePolicy::KeepCurrent),
            ExpireAction::Set(S200)
        );
    }

    #[test]
    fn test_shorter_request_never_shortens() {
        assert_eq!(
            merge(KeyTtl::Remaining(S100), Some(S50), MergePolicy::KeepCurrent),
            ExpireAction::Skip
        );
        // Equal is a no-op too.
        assert_eq!(
            merge(KeyTtl::Remaining(S100), Some(S100), MergePolicy::KeepCurrent),
            ExpireAction::Skip
        );
    }

    #[test]
    fn test_persistent_key_is_never_touched() {
        assert_eq!(
            merge(KeyTtl::Persistent, Some(S200), MergePolicy::KeepCurrent),
            ExpireAction::Skip
        );
        assert_eq!(
            merge(KeyTtl::Persistent, None, MergePolicy::PersistOnNone),
            ExpireAction::Skip
        );
    }

    #[test]
    fn test_no_request_policy_variants() {
        assert_eq!(
            merge(KeyTtl::Remaining(S100), None, MergePolicy::KeepCurrent),
            ExpireAction::Skip
        );
        assert_eq!(
            merge(KeyTtl::Remaining(S100), None, MergePolicy::PersistOnNone),
            ExpireAction::Persist
        );
    }
}
