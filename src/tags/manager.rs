// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tag index orchestration.
//!
//! Maintains, for each tag name, a native Redis SET whose members are
//! encoded references (see [`crate::tags::codec`]). All multi-step
//! sequences are pipelined best-effort batches, never transactions: the
//! target store may be a cluster where multi-key atomicity is unavailable
//! across shards. The accepted consequences:
//!
//! - the TTL read feeding the expiration merge happens outside the write
//!   batch, so two concurrent writers may leave the tag's TTL below the
//!   theoretical maximum;
//! - rename is remove-then-add; a crash between the two can lose the
//!   reference from both tags;
//! - invalidate is enumerate-then-delete; a reference added in the window
//!   survives as an orphan (not indexed, not deleted).
//!
//! None of these are retried or repaired automatically. The opt-in
//! `cleanup` enumeration path prunes references whose items expired or were
//! deleted behind the index's back.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use redis::{cmd, pipe, Value};
use tracing::debug;

use crate::error::CacheError;
use crate::metrics;
use crate::store::{KeyType, RedisStore};
use crate::tags::codec::{tag_name_from_key, tag_set_key, TagRef};
use crate::tags::expiry::{self, ExpireAction, KeyTtl, MergePolicy};

/// Manager for tag membership, enumeration, invalidation, and cleanup.
#[derive(Clone)]
pub struct TagIndex {
    store: RedisStore,
    policy: MergePolicy,
    scan_page_size: usize,
}

/// One liveness probe issued during cleanup, paired with how to read its
/// reply. EXISTS/HEXISTS/SISMEMBER answer 0/1; ZRANK answers nil-or-rank,
/// where rank 0 is alive.
enum LivenessProbe {
    CountNonZero,
    NotNil,
}

impl TagIndex {
    pub fn new(store: RedisStore, policy: MergePolicy, scan_page_size: usize) -> Self {
        Self {
            store,
            policy,
            scan_page_size,
        }
    }

    fn tag_key(&self, tag: &str) -> String {
        tag_set_key(self.store.prefix(), tag)
    }

    /// Record a reference under every given tag, merging each tag set's
    /// expiration with `ttl` so the tag outlives the item.
    ///
    /// One PTTL round trip (outside the write batch, accepted race), then
    /// one write pipeline: SADD per tag plus the merged PEXPIRE/PERSIST.
    pub async fn add_refs(
        &self,
        tags: &[&str],
        reference: &TagRef,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        if tags.is_empty() {
            return Ok(());
        }
        let _timer = metrics::LatencyTimer::new("add_tags");

        let pttls = self.tag_ttls(tags).await?;

        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        self.stage_add(&mut pipeline, tags, &pttls, reference, ttl);
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to add tag refs: {}", e)))?;

        metrics::record_operation("add_tags", "success");
        Ok(())
    }

    /// Current PTTLs of the given tags' set keys, in one round trip. Feeds
    /// [`TagIndex::stage_add`]; the read deliberately happens outside the
    /// write batch.
    pub(crate) async fn tag_ttls(&self, tags: &[&str]) -> Result<Vec<i64>, CacheError> {
        let tag_keys: Vec<String> = tags.iter().map(|t| self.tag_key(t)).collect();
        self.store.pttls(&tag_keys).await
    }

    /// Append the SADD + merged expiration commands for one reference to an
    /// existing pipeline, so a facade can write the value and its tag
    /// memberships in a single batched round trip.
    pub(crate) fn stage_add(
        &self,
        pipeline: &mut redis::Pipeline,
        tags: &[&str],
        pttls: &[i64],
        reference: &TagRef,
        ttl: Option<Duration>,
    ) {
        let encoded = reference.encode();
        for (tag, pttl) in tags.iter().zip(pttls) {
            let tag_key = self.tag_key(tag);
            pipeline.cmd("SADD").arg(&tag_key).arg(&encoded).ignore();
            match expiry::merge(KeyTtl::from_pttl(*pttl), ttl, self.policy) {
                ExpireAction::Skip => {}
                ExpireAction::Set(d) => {
                    pipeline
                        .cmd("PEXPIRE")
                        .arg(&tag_key)
                        .arg(d.as_millis() as i64)
                        .ignore();
                }
                ExpireAction::Persist => {
                    pipeline.cmd("PERSIST").arg(&tag_key).ignore();
                }
            }
        }
    }

    /// Drop a reference from every given tag set. Silent no-op for tags
    /// that never held it.
    pub async fn remove_refs(&self, tags: &[&str], reference: &TagRef) -> Result<(), CacheError> {
        if tags.is_empty() {
            return Ok(());
        }
        let encoded = reference.encode();
        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        for tag in tags {
            pipeline
                .cmd("SREM")
                .arg(self.tag_key(tag))
                .arg(&encoded)
                .ignore();
        }
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to remove tag refs: {}", e)))?;

        metrics::record_operation("remove_tags", "success");
        Ok(())
    }

    /// Move a reference from one tag to another.
    ///
    /// Remove-then-add, two sequential store ops; the add happens only when
    /// the remove actually found the reference. Returns whether the rename
    /// took effect — `false` means the reference was never under `old_tag`
    /// and nothing changed (intentional idempotent-rename semantics).
    pub async fn rename_ref(
        &self,
        old_tag: &str,
        new_tag: &str,
        reference: &TagRef,
    ) -> Result<bool, CacheError> {
        let encoded = reference.encode();
        let mut conn = self.store.connection();

        let removed: i64 = cmd("SREM")
            .arg(self.tag_key(old_tag))
            .arg(&encoded)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to remove from old tag: {}", e)))?;

        if removed == 0 {
            debug!(old_tag, new_tag, "rename no-op: reference not present");
            return Ok(false);
        }

        let _: () = cmd("SADD")
            .arg(self.tag_key(new_tag))
            .arg(&encoded)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to add to new tag: {}", e)))?;

        metrics::record_operation("rename_tag", "success");
        Ok(true)
    }

    /// Union of encoded references across the given tags.
    ///
    /// A tag whose store key is not of set type (absent, or clobbered by a
    /// different type) contributes nothing. With `cleanup=false` the raw
    /// membership is returned without liveness checks — it may contain
    /// stale references to items that expired or were deleted behind the
    /// index's back. With `cleanup=true` every reference is verified
    /// against the live store and confirmed-dead ones are pruned from
    /// their tag sets before only the live ones are returned.
    pub async fn enumerate(
        &self,
        tags: &[&str],
        cleanup: bool,
    ) -> Result<HashSet<Vec<u8>>, CacheError> {
        let _timer = metrics::LatencyTimer::new(if cleanup { "cleanup" } else { "enumerate" });

        let (union, membership) = self.read_tag_sets(tags).await?;
        metrics::record_enumerated_refs(union.len());

        if !cleanup || union.is_empty() {
            return Ok(union);
        }

        let dead = self.find_dead_refs(&union).await?;
        if dead.is_empty() {
            return Ok(union);
        }

        // Prune confirmed-dead references from every tag set that held them.
        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        for encoded in &dead {
            if let Some(tag_keys) = membership.get(encoded) {
                for tag_key in tag_keys {
                    pipeline.cmd("SREM").arg(tag_key).arg(encoded).ignore();
                }
            }
        }
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to prune stale refs: {}", e)))?;

        debug!(pruned = dead.len(), "cleanup pruned stale tag references");
        metrics::record_cleanup_pruned(dead.len());

        let mut live = union;
        for d in &dead {
            live.remove(d);
        }
        Ok(live)
    }

    /// Read the value behind every live reference under the given tags.
    ///
    /// String keys are GET, hash fields are HGET, and set/sorted-set
    /// members ARE their value — the member bytes decode directly. A
    /// reference whose read comes back empty is silently skipped; this is
    /// the fast path, no tag-set pruning happens here.
    pub async fn read_values(&self, tags: &[&str]) -> Result<Vec<Vec<u8>>, CacheError> {
        let (union, _) = self.read_tag_sets(tags).await?;
        if union.is_empty() {
            return Ok(vec![]);
        }

        let refs: Vec<TagRef> = union.iter().map(|b| TagRef::decode(b)).collect();
        let key_types = self.probe_key_types(&refs).await?;

        // One read pipeline for everything that needs a store read.
        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        let mut reads = 0usize;
        for reference in &refs {
            match reference {
                TagRef::Key(key) => {
                    pipeline.cmd("GET").arg(self.store.prefixed_key(key));
                    reads += 1;
                }
                TagRef::HashField { key, field } => {
                    pipeline
                        .cmd("HGET")
                        .arg(self.store.prefixed_key(key))
                        .arg(field);
                    reads += 1;
                }
                TagRef::SetMember { .. } => {}
            }
        }

        let mut replies: std::vec::IntoIter<Option<Vec<u8>>> = if reads > 0 {
            let replies: Vec<Option<Vec<u8>>> = pipeline
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(format!("Failed to read tagged values: {}", e)))?;
            replies.into_iter()
        } else {
            Vec::new().into_iter()
        };

        let mut values = Vec::new();
        for reference in &refs {
            match reference {
                TagRef::Key(_) | TagRef::HashField { .. } => {
                    if let Some(Some(bytes)) = replies.next() {
                        values.push(bytes);
                    }
                }
                TagRef::SetMember { key, member } => {
                    // Only yield members whose parent set still exists.
                    let live = key_types
                        .get(key.as_str())
                        .map(|t| matches!(t, KeyType::Set | KeyType::ZSet))
                        .unwrap_or(false);
                    if live {
                        values.push(member.clone());
                    }
                }
            }
        }
        Ok(values)
    }

    /// Delete everything the given tags currently point to, plus the tags
    /// themselves.
    ///
    /// Enumerate (fast path), probe each referenced key's live type, then
    /// one pipeline: DEL for string keys, HDEL for fields of keys still of
    /// hash type, SREM/ZREM for members of keys still of set/sorted-set
    /// type, and finally DEL of every tag set key. Batched, not atomic: a
    /// crash mid-batch can leave partial state.
    pub async fn invalidate(&self, tags: &[&str]) -> Result<(), CacheError> {
        let _timer = metrics::LatencyTimer::new("invalidate");

        let union = self.enumerate(tags, false).await?;
        let refs: Vec<TagRef> = union.iter().map(|b| TagRef::decode(b)).collect();
        let key_types = self.probe_key_types(&refs).await?;

        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        for reference in &refs {
            let live_type = key_types
                .get(reference.key())
                .copied()
                .unwrap_or(KeyType::Missing);
            match reference {
                TagRef::Key(key) => {
                    pipeline.cmd("DEL").arg(self.store.prefixed_key(key)).ignore();
                }
                TagRef::HashField { key, field } => {
                    if live_type == KeyType::Hash {
                        pipeline
                            .cmd("HDEL")
                            .arg(self.store.prefixed_key(key))
                            .arg(field)
                            .ignore();
                    }
                }
                TagRef::SetMember { key, member } => match live_type {
                    KeyType::Set => {
                        pipeline
                            .cmd("SREM")
                            .arg(self.store.prefixed_key(key))
                            .arg(member)
                            .ignore();
                    }
                    KeyType::ZSet => {
                        pipeline
                            .cmd("ZREM")
                            .arg(self.store.prefixed_key(key))
                            .arg(member)
                            .ignore();
                    }
                    _ => {}
                },
            }
        }
        for tag in tags {
            pipeline.cmd("DEL").arg(self.tag_key(tag)).ignore();
        }
        pipeline
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to invalidate tags: {}", e)))?;

        debug!(tags = ?tags, items = refs.len(), "invalidated tags");
        metrics::record_invalidated(refs.len());
        metrics::record_operation("invalidate", "success");
        Ok(())
    }

    /// Every tag name currently present in the store.
    ///
    /// Incremental SCAN over the tag-key pattern; cost proportional to the
    /// keyspace, paged to avoid blocking the store under load.
    pub async fn all_tag_names(&self) -> Result<Vec<String>, CacheError> {
        let pattern = format!("{}*", tag_set_key(self.store.prefix(), ""));
        let keys = self.store.scan_keys(&pattern, self.scan_page_size).await?;
        Ok(keys
            .iter()
            .filter_map(|k| tag_name_from_key(self.store.prefix(), k))
            .map(str::to_string)
            .collect())
    }

    /// SMEMBERS every set-typed tag key; returns the de-duplicated union
    /// plus, per encoded reference, which tag keys held it (needed when
    /// cleanup prunes).
    async fn read_tag_sets(
        &self,
        tags: &[&str],
    ) -> Result<(HashSet<Vec<u8>>, HashMap<Vec<u8>, Vec<String>>), CacheError> {
        let mut union: HashSet<Vec<u8>> = HashSet::new();
        let mut membership: HashMap<Vec<u8>, Vec<String>> = HashMap::new();
        if tags.is_empty() {
            return Ok((union, membership));
        }

        let tag_keys: Vec<String> = tags.iter().map(|t| self.tag_key(t)).collect();
        let types = self.store.key_types(&tag_keys).await?;

        let set_keys: Vec<&String> = tag_keys
            .iter()
            .zip(&types)
            .filter(|(_, t)| **t == KeyType::Set)
            .map(|(k, _)| k)
            .collect();
        if set_keys.is_empty() {
            return Ok((union, membership));
        }

        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        for key in &set_keys {
            pipeline.cmd("SMEMBERS").arg(key.as_str());
        }
        let replies: Vec<Vec<Vec<u8>>> = pipeline
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Backend(format!("Failed to read tag sets: {}", e)))?;

        for (tag_key, members) in set_keys.iter().zip(replies) {
            for member in members {
                membership
                    .entry(member.clone())
                    .or_default()
                    .push((*tag_key).clone());
                union.insert(member);
            }
        }
        Ok((union, membership))
    }

    /// TYPE-probe every distinct key the given references point at.
    async fn probe_key_types(
        &self,
        refs: &[TagRef],
    ) -> Result<HashMap<String, KeyType>, CacheError> {
        let mut keys: Vec<String> = refs.iter().map(|r| r.key().to_string()).collect();
        keys.sort();
        keys.dedup();

        let prefixed: Vec<String> = keys.iter().map(|k| self.store.prefixed_key(k)).collect();
        let types = self.store.key_types(&prefixed).await?;
        Ok(keys.into_iter().zip(types).collect())
    }

    /// Verify every reference against the live store and return the dead
    /// ones. A key whose type changed since tagging (deleted and recreated
    /// as something else) counts as dead for field/member references.
    async fn find_dead_refs(
        &self,
        union: &HashSet<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, CacheError> {
        let refs: Vec<(&Vec<u8>, TagRef)> =
            union.iter().map(|b| (b, TagRef::decode(b))).collect();
        let decoded: Vec<TagRef> = refs.iter().map(|(_, r)| r.clone()).collect();
        let key_types = self.probe_key_types(&decoded).await?;

        // Build one membership-check pipeline; references already known
        // dead from the type probe skip it.
        let mut conn = self.store.connection();
        let mut pipeline = pipe();
        let mut plan: Vec<Option<LivenessProbe>> = Vec::with_capacity(refs.len());
        for (_, reference) in &refs {
            let live_type = key_types
                .get(reference.key())
                .copied()
                .unwrap_or(KeyType::Missing);
            let probe = match reference {
                TagRef::Key(key) => {
                    pipeline.cmd("EXISTS").arg(self.store.prefixed_key(key));
                    Some(LivenessProbe::CountNonZero)
                }
                TagRef::HashField { key, field } => {
                    if live_type == KeyType::Hash {
                        pipeline
                            .cmd("HEXISTS")
                            .arg(self.store.prefixed_key(key))
                            .arg(field);
                        Some(LivenessProbe::CountNonZero)
                    } else {
                        None
                    }
                }
                TagRef::SetMember { key, member } => match live_type {
                    KeyType::Set => {
                        pipeline
                            .cmd("SISMEMBER")
                            .arg(self.store.prefixed_key(key))
                            .arg(member);
                        Some(LivenessProbe::CountNonZero)
                    }
                    KeyType::ZSet => {
                        pipeline
                            .cmd("ZRANK")
                            .arg(self.store.prefixed_key(key))
                            .arg(member);
                        Some(LivenessProbe::NotNil)
                    }
                    _ => None,
                },
            };
            plan.push(probe);
        }

        let issued = plan.iter().filter(|p| p.is_some()).count();
        let replies: Vec<Value> = if issued > 0 {
            pipeline
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::Backend(format!("Failed liveness checks: {}", e)))?
        } else {
            vec![]
        };

        let mut reply_iter = replies.into_iter();
        let mut dead = Vec::new();
        for ((encoded, _), probe) in refs.iter().zip(plan) {
            let alive = match probe {
                None => false,
                Some(kind) => match reply_iter.next() {
                    Some(value) => Self::interpret_probe(&kind, &value),
                    None => false,
                },
            };
            if !alive {
                dead.push((*encoded).clone());
            }
        }
        Ok(dead)
    }

    fn interpret_probe(kind: &LivenessProbe, value: &Value) -> bool {
        match kind {
            LivenessProbe::CountNonZero => matches!(value, Value::Int(n) if *n > 0),
            LivenessProbe::NotNil => !matches!(value, Value::Nil),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_count_probe() {
        assert!(TagIndex::interpret_probe(
            &LivenessProbe::CountNonZero,
            &Value::Int(1)
        ));
        assert!(!TagIndex::interpret_probe(
            &LivenessProbe::CountNonZero,
            &Value::Int(0)
        ));
        assert!(!TagIndex::interpret_probe(
            &LivenessProbe::CountNonZero,
            &Value::Nil
        ));
    }

    #[test]
    fn test_interpret_rank_probe_rank_zero_is_alive() {
        assert!(TagIndex::interpret_probe(&LivenessProbe::NotNil, &Value::Int(0)));
        assert!(!TagIndex::interpret_probe(&LivenessProbe::NotNil, &Value::Nil));
    }
}
