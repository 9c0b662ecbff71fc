//! Unit tests for the policy decision cache

use std::sync::Arc;
use std::time::Duration;

use availability_operator::cache::{CacheConfig, ListScope, PolicyCache};
use availability_operator::clock::ManualClock;
use availability_operator::crd::AvailabilityClass;
use availability_operator::policy::ObjectKey;

use crate::common::*;

fn new_cache(config: CacheConfig) -> (PolicyCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(test_start()));
    (PolicyCache::new(config, clock.clone()), clock)
}

fn ns1() -> ListScope {
    ListScope::Namespace("ns1".to_string())
}

#[tokio::test]
async fn test_expired_entries_read_as_misses() {
    let (cache, clock) = new_cache(CacheConfig::default());
    let key = ObjectKey::new("ns1", "p1");
    cache
        .set_policy(key.clone(), PolicyBuilder::new("ns1", "p1").build())
        .await;

    clock.advance(Duration::from_secs(299));
    assert!(cache.get_policy(&key).await.is_some());
    clock.advance(Duration::from_secs(1));
    assert!(cache.get_policy(&key).await.is_none());

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    // Reads never remove
    assert_eq!(stats.policies, 1);
}

#[tokio::test]
async fn test_maintenance_partition_has_its_own_ttl() {
    let (cache, clock) = new_cache(CacheConfig::default());
    let workload = ObjectKey::new("ns1", "api");
    cache.set_maintenance(workload.clone(), false).await;
    cache.set_list(ns1(), Vec::new()).await;

    clock.advance(Duration::from_secs(61));
    assert_eq!(cache.get_maintenance(&workload).await, None);
    assert!(cache.get_list(&ns1()).await.is_some());
}

#[tokio::test]
async fn test_set_list_primes_policy_partition() {
    let (cache, _) = new_cache(CacheConfig::default());
    let policies = vec![
        PolicyBuilder::new("ns1", "a").build(),
        PolicyBuilder::new("ns1", "b").build(),
    ];
    cache.set_list(ns1(), policies).await;

    for name in ["a", "b"] {
        let cached = cache.get_policy(&ObjectKey::new("ns1", name)).await;
        assert_eq!(cached.map(|p| p.metadata.name), Some(Some(name.to_string())));
    }
}

#[tokio::test]
async fn test_list_larger_than_bound_still_serves_members() {
    let (cache, _) = new_cache(CacheConfig {
        max_size: 2,
        ..CacheConfig::default()
    });
    let policies: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| PolicyBuilder::new("ns1", *name).build())
        .collect();
    cache.set_list(ns1(), policies).await;
    assert_eq!(cache.stats().await.policies, 2);

    for name in ["a", "b", "c"] {
        assert!(
            cache.get_policy(&ObjectKey::new("ns1", name)).await.is_some(),
            "{} missing",
            name
        );
    }
    let stats = cache.stats().await;
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 0);
}

#[tokio::test]
async fn test_list_fetched_before_invalidation_is_dropped() {
    let (cache, _) = new_cache(CacheConfig::default());
    let epoch = cache.epoch();
    let fetched = vec![PolicyBuilder::new("ns1", "a").build()];

    cache.invalidate_policy(&ObjectKey::new("ns1", "a")).await;
    assert_ne!(cache.epoch(), epoch);
    assert!(!cache.set_list_if_current(ns1(), fetched.clone(), epoch).await);
    assert!(cache.get_list(&ns1()).await.is_none());
    assert!(cache.get_policy(&ObjectKey::new("ns1", "a")).await.is_none());

    // A fetch started after the invalidation is kept
    let epoch = cache.epoch();
    assert!(cache.set_list_if_current(ns1(), fetched, epoch).await);
    assert!(cache.get_list(&ns1()).await.is_some());
}

#[tokio::test]
async fn test_namespace_invalidation_advances_epoch() {
    let (cache, _) = new_cache(CacheConfig::default());
    let epoch = cache.epoch();
    cache.invalidate_namespace("ns2").await;
    assert!(!cache.set_list_if_current(ns1(), Vec::new(), epoch).await);

    // Maintenance-only invalidations leave policy lists alone
    let epoch = cache.epoch();
    cache.invalidate_workload(&ObjectKey::new("ns1", "api")).await;
    cache.invalidate_maintenance_namespace("ns1").await;
    assert_eq!(cache.epoch(), epoch);
}

#[tokio::test]
async fn test_returned_lists_are_copies() {
    let (cache, _) = new_cache(CacheConfig::default());
    cache
        .set_list(ns1(), vec![PolicyBuilder::new("ns1", "a").build()])
        .await;

    let mut first = cache.get_list(&ns1()).await.unwrap();
    first[0].spec.availability_class = AvailabilityClass::NonCritical;
    first.clear();

    let second = cache.get_list(&ns1()).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(
        second[0].spec.availability_class,
        AvailabilityClass::HighAvailability
    );
}

#[tokio::test]
async fn test_invalidate_policy_drops_lists_and_maintenance() {
    let (cache, _) = new_cache(CacheConfig::default());
    let key = ObjectKey::new("ns1", "a");
    let other = ObjectKey::new("ns1", "b");
    cache
        .set_list(
            ns1(),
            vec![
                PolicyBuilder::new("ns1", "a").build(),
                PolicyBuilder::new("ns1", "b").build(),
            ],
        )
        .await;
    cache
        .set_list(ListScope::AllNamespaces, Vec::new())
        .await;
    cache
        .set_maintenance(ObjectKey::new("ns2", "api"), true)
        .await;

    cache.invalidate_policy(&key).await;

    assert!(cache.get_policy(&key).await.is_none());
    assert!(cache.get_policy(&other).await.is_some());
    assert!(cache.get_list(&ns1()).await.is_none());
    assert!(cache.get_list(&ListScope::AllNamespaces).await.is_none());
    assert!(
        cache
            .get_maintenance(&ObjectKey::new("ns2", "api"))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_invalidate_namespace() {
    let (cache, _) = new_cache(CacheConfig::default());
    cache
        .set_policy(ObjectKey::new("ns1", "a"), PolicyBuilder::new("ns1", "a").build())
        .await;
    cache
        .set_policy(ObjectKey::new("ns2", "a"), PolicyBuilder::new("ns2", "a").build())
        .await;
    cache.set_list(ns1(), Vec::new()).await;
    cache.set_maintenance(ObjectKey::new("ns1", "api"), true).await;

    cache.invalidate_namespace("ns1").await;

    assert!(cache.get_policy(&ObjectKey::new("ns1", "a")).await.is_none());
    assert!(cache.get_policy(&ObjectKey::new("ns2", "a")).await.is_some());
    assert!(cache.get_list(&ns1()).await.is_none());
    assert_eq!(
        cache.get_maintenance(&ObjectKey::new("ns1", "api")).await,
        Some(true)
    );
}

#[tokio::test]
async fn test_full_partition_evicts_oldest_first() {
    let (cache, clock) = new_cache(CacheConfig {
        max_size: 2,
        ..CacheConfig::default()
    });
    for name in ["a", "b", "c"] {
        cache
            .set_policy(ObjectKey::new("ns1", name), PolicyBuilder::new("ns1", name).build())
            .await;
        clock.advance(Duration::from_secs(1));
    }

    assert!(cache.get_policy(&ObjectKey::new("ns1", "a")).await.is_none());
    assert!(cache.get_policy(&ObjectKey::new("ns1", "b")).await.is_some());
    assert!(cache.get_policy(&ObjectKey::new("ns1", "c")).await.is_some());
    assert_eq!(cache.stats().await.evictions, 1);
}

#[tokio::test]
async fn test_sweep_removes_expired_entries() {
    let (cache, clock) = new_cache(CacheConfig::default());
    cache
        .set_policy(ObjectKey::new("ns1", "a"), PolicyBuilder::new("ns1", "a").build())
        .await;
    cache.set_maintenance(ObjectKey::new("ns1", "api"), false).await;

    clock.advance(Duration::from_secs(120));
    assert_eq!(cache.sweep().await, 1);

    let stats = cache.stats().await;
    assert_eq!(stats.policies, 1);
    assert_eq!(stats.maintenance, 0);
}

#[test]
fn test_sweep_interval_is_half_the_shortest_ttl() {
    let (cache, _) = new_cache(CacheConfig::default());
    assert_eq!(cache.sweep_interval(), Duration::from_secs(30));

    let (cache, _) = new_cache(CacheConfig {
        policy_ttl: Duration::from_secs(1),
        ..CacheConfig::default()
    });
    assert_eq!(cache.sweep_interval(), Duration::from_secs(1));
}
