//! Integration Tests for tagcache
//!
//! These tests require a real Redis and use testcontainers for portability -
//! no external docker-compose required.
//!
//! # Running Tests
//! ```bash
//! # Run all integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//!
//! # Run only happy-path tests
//! cargo test --test integration happy -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: tagging, enumeration, invalidation, TTL merge
//! - `failure_*` - Error surfacing and stale-index repair

use std::time::Duration;

use tagcache::tags::codec::tag_set_key;
use tagcache::{GeoUnit, KeyTtl, TagCache, TagCacheConfig};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Container Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

async fn cache_at(port: u16) -> TagCache {
    let config = TagCacheConfig {
        redis_url: format!("redis://127.0.0.1:{}", port),
        ..Default::default()
    };
    TagCache::connect(config).await.expect("Failed to connect")
}

/// Remaining TTL of a tag's set key, in milliseconds (-2 missing, -1 persistent).
async fn tag_pttl(cache: &TagCache, tag: &str) -> i64 {
    let key = tag_set_key(cache.store().prefix(), tag);
    cache.store().pttls(&[key]).await.expect("Failed to read tag TTL")[0]
}

// =============================================================================
// Happy Path Tests - Tagging
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_round_trip_key_tagging() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache
        .set("apple", &"Gala".to_string(), None, &["red"])
        .await
        .expect("Failed to set");

    let keys = cache.get_keys_by_tag(&["red"], false).await.unwrap();
    assert!(keys.contains("apple"), "tagged key missing from tag: {:?}", keys);

    let value: Option<String> = cache.get("apple").await.unwrap();
    assert_eq!(value.as_deref(), Some("Gala"));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_add_tags_is_idempotent() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache.set("apple", &"Gala".to_string(), None, &[]).await.unwrap();
    cache.add_tags_to_key("apple", &["red"]).await.unwrap();
    cache.add_tags_to_key("apple", &["red"]).await.unwrap();

    let keys = cache.get_keys_by_tag(&["red"], false).await.unwrap();
    assert_eq!(keys.len(), 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_rename_moves_membership() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache.set("apple", &"Gala".to_string(), None, &["a"]).await.unwrap();

    let renamed = cache.rename_tag_for_key("apple", "a", "b").await.unwrap();
    assert!(renamed);

    let a = cache.get_keys_by_tag(&["a"], false).await.unwrap();
    let b = cache.get_keys_by_tag(&["b"], false).await.unwrap();
    assert!(a.is_empty(), "tag a should be empty: {:?}", a);
    assert!(b.contains("apple"));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_rename_of_untagged_key_is_noop() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache.set("pear", &"Conference".to_string(), None, &["b"]).await.unwrap();

    // "apple" was never tagged "a": neither tag may change.
    let renamed = cache.rename_tag_for_key("apple", "a", "b").await.unwrap();
    assert!(!renamed);

    let a = cache.get_keys_by_tag(&["a"], false).await.unwrap();
    let b = cache.get_keys_by_tag(&["b"], false).await.unwrap();
    assert!(a.is_empty());
    assert_eq!(b.len(), 1);
    assert!(b.contains("pear"));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_remove_tags_is_silent_noop_when_absent() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    // Removing a relation that was never set succeeds with no change.
    cache.remove_tags_from_key("ghost", &["nope"]).await.unwrap();
    assert!(cache.get_keys_by_tag(&["nope"], false).await.unwrap().is_empty());
}

// =============================================================================
// Happy Path Tests - Enumeration, Invalidation, Cleanup
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_invalidate_clears_items_and_tag() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache.set("apple", &"Gala".to_string(), None, &["a"]).await.unwrap();

    cache.invalidate_keys_by_tag(&["a"]).await.unwrap();

    assert!(!cache.exists("apple").await.unwrap(), "item must be deleted");
    assert!(
        cache.get_keys_by_tag(&["a"], false).await.unwrap().is_empty(),
        "tag must be gone"
    );
    assert!(cache.get_all_tags().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_cleanup_prunes_dangling_refs() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache.set("apple", &"Gala".to_string(), None, &["a"]).await.unwrap();

    // Delete directly, bypassing tag-aware removal.
    assert!(cache.remove("apple").await.unwrap());

    // Fast path still returns the stale reference.
    let stale = cache.get_keys_by_tag(&["a"], false).await.unwrap();
    assert!(stale.contains("apple"));

    // Cleanup path returns nothing and prunes the tag set.
    let live = cache.get_keys_by_tag(&["a"], true).await.unwrap();
    assert!(live.is_empty());

    let after = cache.get_keys_by_tag(&["a"], false).await.unwrap();
    assert!(after.is_empty(), "stale ref must be pruned: {:?}", after);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_cleanup_treats_type_change_as_dead() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache
        .hash_set("fruit1", "color", &"red-ish".to_string(), None, &["a"])
        .await
        .unwrap();

    // Key deleted and recreated as a plain string: the hash-field
    // reference now points at the wrong type and must count as dead.
    assert!(cache.remove("fruit1").await.unwrap());
    cache.set("fruit1", &"not a hash".to_string(), None, &[]).await.unwrap();

    let live = cache.get_keys_by_tag(&["a"], true).await.unwrap();
    assert!(live.is_empty(), "type-changed ref must be dead: {:?}", live);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_enumeration_unions_tags_without_duplicates() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache.set("apple", &"Gala".to_string(), None, &["a", "b"]).await.unwrap();
    cache.set("pear", &"Conference".to_string(), None, &["b"]).await.unwrap();

    let keys = cache.get_keys_by_tag(&["a", "b", "missing"], false).await.unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains("apple"));
    assert!(keys.contains("pear"));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_concrete_red_scenario() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    // Tag "red" on a string key and on a hash field.
    cache.set("apple", &"Gala".to_string(), None, &["red"]).await.unwrap();
    cache
        .hash_set("fruit1", "color", &"red-ish".to_string(), None, &["red"])
        .await
        .unwrap();

    let refs = cache.get_keys_by_tag(&["red"], false).await.unwrap();
    assert_eq!(refs.len(), 2, "both encoded references expected: {:?}", refs);

    let mut values: Vec<String> = cache.get_objects_by_tag(&["red"]).await.unwrap();
    values.sort();
    assert_eq!(values, vec!["Gala".to_string(), "red-ish".to_string()]);

    cache.invalidate_keys_by_tag(&["red"]).await.unwrap();

    assert!(!cache.exists("apple").await.unwrap());
    let color: Option<String> = cache.hash_get("fruit1", "color").await.unwrap();
    assert!(color.is_none(), "field must be HDEL'd");
    assert!(cache.get_keys_by_tag(&["red"], false).await.unwrap().is_empty());
}

// =============================================================================
// Happy Path Tests - Expiration merge
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_expiration_merge_is_monotonic() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    // First tagged write sets the tag's TTL to 100s.
    cache
        .set("k1", &1u32, Some(Duration::from_secs(100)), &["a"])
        .await
        .unwrap();
    let t1 = tag_pttl(&cache, "a").await;
    assert!(t1 > 95_000 && t1 <= 100_000, "tag TTL ~100s, got {}ms", t1);

    // A shorter request must not reduce it.
    cache
        .set("k2", &2u32, Some(Duration::from_secs(50)), &["a"])
        .await
        .unwrap();
    let t2 = tag_pttl(&cache, "a").await;
    assert!(t2 > 95_000, "tag TTL must stay ~100s, got {}ms", t2);

    // A longer request must raise it.
    cache
        .set("k3", &3u32, Some(Duration::from_secs(200)), &["a"])
        .await
        .unwrap();
    let t3 = tag_pttl(&cache, "a").await;
    assert!(t3 > 195_000, "tag TTL must be raised to ~200s, got {}ms", t3);

    // Default policy: a TTL-less tagged write leaves the expiration alone.
    cache.set("k4", &4u32, None, &["a"]).await.unwrap();
    let t4 = tag_pttl(&cache, "a").await;
    assert!(t4 > 0, "tag TTL must not be stripped, got {}ms", t4);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_item_ttl_applies_to_key() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache
        .set("ephemeral", &1u32, Some(Duration::from_secs(60)), &[])
        .await
        .unwrap();
    match cache.key_ttl("ephemeral").await.unwrap() {
        KeyTtl::Remaining(d) => assert!(d <= Duration::from_secs(60)),
        other => panic!("expected remaining TTL, got {:?}", other),
    }

    assert!(cache.persist_key("ephemeral").await.unwrap());
    assert_eq!(cache.key_ttl("ephemeral").await.unwrap(), KeyTtl::Persistent);
}

// =============================================================================
// Happy Path Tests - Collections and set-member tagging
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_set_member_tagging_and_cleanup() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    let basket = cache.set_of::<String>("basket");
    basket.add_with_tags(&"Gala".to_string(), &["red"]).await.unwrap();

    let values: Vec<String> = cache.get_objects_by_tag(&["red"]).await.unwrap();
    assert_eq!(values, vec!["Gala".to_string()]);

    // Member removed behind the index's back: cleanup prunes it.
    assert!(basket.remove(&"Gala".to_string()).await.unwrap());
    let live = cache.get_keys_by_tag(&["red"], true).await.unwrap();
    assert!(live.is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_sorted_set_member_tagging_uses_zrank() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    let ranking = cache.sorted_set::<String>("ranking");
    // Rank 0 member must still count as alive during cleanup.
    ranking.add_with_tags(0.0, &"first".to_string(), &["ranked"]).await.unwrap();
    ranking.add_with_tags(1.0, &"second".to_string(), &["ranked"]).await.unwrap();

    let live = cache.get_keys_by_tag(&["ranked"], true).await.unwrap();
    assert_eq!(live.len(), 2, "both members alive: {:?}", live);

    assert_eq!(ranking.rank(&"first".to_string()).await.unwrap(), Some(0));
    assert_eq!(ranking.score(&"second".to_string()).await.unwrap(), Some(1.0));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_invalidate_removes_members_by_live_type() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    let basket = cache.set_of::<String>("basket");
    basket.add_with_tags(&"Gala".to_string(), &["red"]).await.unwrap();
    basket.add(&"Granny".to_string()).await.unwrap();

    cache.invalidate_keys_by_tag(&["red"]).await.unwrap();

    // Only the tagged member is SREM'd; the set itself survives.
    assert!(!basket.contains(&"Gala".to_string()).await.unwrap());
    assert!(basket.contains(&"Granny".to_string()).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_list_and_dict_round_trip() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    let queue = cache.list::<u32>("queue");
    queue.push_right(&1).await.unwrap();
    queue.push_right(&2).await.unwrap();
    queue.push_left(&0).await.unwrap();
    assert_eq!(queue.range(0, -1).await.unwrap(), vec![0, 1, 2]);
    assert_eq!(queue.pop_left().await.unwrap(), Some(0));
    assert_eq!(queue.len().await.unwrap(), 2);

    let prices = cache.dictionary::<f64>("prices");
    prices.set("apple", &1.25).await.unwrap();
    prices.set_with_tags("cherry", &4.50, &["expensive"]).await.unwrap();
    assert_eq!(prices.get("apple").await.unwrap(), Some(1.25));
    assert!(prices.contains("cherry").await.unwrap());
    assert_eq!(prices.len().await.unwrap(), 2);

    let values: Vec<f64> = cache.get_objects_by_tag(&["expensive"]).await.unwrap();
    assert_eq!(values, vec![4.50]);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_geo_members_are_taggable() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    let cities = cache.geo::<String>("cities");
    cities
        .add_with_tags(-0.1278, 51.5074, &"london".to_string(), &["uk"])
        .await
        .unwrap();
    cities.add(-2.2426, 53.4808, &"manchester".to_string()).await.unwrap();

    let pos = cities.position(&"london".to_string()).await.unwrap();
    assert!(pos.is_some());

    let dist = cities
        .distance(&"london".to_string(), &"manchester".to_string(), GeoUnit::Kilometers)
        .await
        .unwrap();
    assert!(dist.unwrap() > 200.0);

    // Geo members live in a zset, so cleanup goes through the ZRANK probe.
    let live = cache.get_keys_by_tag(&["uk"], true).await.unwrap();
    assert_eq!(live.len(), 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_get_all_tags_lists_every_tag() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache.set("a", &1u32, None, &["t1", "t2"]).await.unwrap();
    cache.set("b", &2u32, None, &["t3"]).await.unwrap();

    let mut tags = cache.get_all_tags().await.unwrap();
    tags.sort();
    assert_eq!(tags, vec!["t1", "t2", "t3"]);
}

// =============================================================================
// Happy Path Tests - Pub/sub
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_pubsub_round_trip() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    let mut subscription = cache.subscribe(&["events"]).await.unwrap();

    // Give the subscriber a moment to register before publishing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    cache.publish("events", &"hello".to_string()).await.unwrap();

    let received = tokio::time::timeout(
        Duration::from_secs(5),
        subscription.next_message::<String>(),
    )
    .await
    .expect("timed out waiting for message")
    .expect("subscription closed")
    .expect("message failed to decode");

    assert_eq!(received, ("events".to_string(), "hello".to_string()));
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_wrong_type_read_surfaces_backend_error() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    cache.hash_set("h", "f", &1u32, None, &[]).await.unwrap();

    // GET on a hash key: Redis WRONGTYPE propagates, untranslated.
    let result: Result<Option<u32>, _> = cache.get("h").await;
    assert!(result.is_err());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_tag_key_clobbered_by_other_type_contributes_nothing() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = cache_at(redis.get_host_port_ipv4(6379)).await;

    // An application key occupying a tag's key slot with a non-set type.
    let tag_key = tag_set_key(cache.store().prefix(), "squatted");
    cache.set(&tag_key, &"oops".to_string(), None, &[]).await.unwrap();

    let keys = cache.get_keys_by_tag(&["squatted"], false).await.unwrap();
    assert!(keys.is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_key_prefix_namespaces_tags_too() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let prefixed = TagCache::connect(TagCacheConfig {
        redis_url: format!("redis://127.0.0.1:{}", port),
        key_prefix: Some("app1:".into()),
        ..Default::default()
    })
    .await
    .unwrap();
    let other = TagCache::connect(TagCacheConfig {
        redis_url: format!("redis://127.0.0.1:{}", port),
        key_prefix: Some("app2:".into()),
        ..Default::default()
    })
    .await
    .unwrap();

    prefixed.set("apple", &"Gala".to_string(), None, &["red"]).await.unwrap();

    assert!(other.get_keys_by_tag(&["red"], false).await.unwrap().is_empty());
    assert!(other.get_all_tags().await.unwrap().is_empty());
    assert_eq!(prefixed.get_all_tags().await.unwrap(), vec!["red"]);
}
