//! Policy decision cache
//!
//! Three partitions with their own TTLs:
//! - policies, keyed by `namespace/name`
//! - policy lists, keyed by namespace (or all namespaces)
//! - maintenance evaluations, keyed by workload
//!
//! Reads take the shared lock and never remove anything; expired entries are
//! reported as misses and left for the sweeper. Writes, invalidations and
//! sweeps take the exclusive lock. Hit/miss/eviction counters are atomics.
//!
//! Policy invalidations advance an epoch. A list fetched from the API server
//! is stored with the epoch read before the fetch, and the store is dropped
//! when an invalidation happened in between.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::clock::{Clock, elapsed_between};
use crate::crd::AvailabilityPolicy;
use crate::policy::ObjectKey;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entry bound applied to each partition
    pub max_size: usize,
    pub policy_ttl: Duration,
    pub maintenance_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            policy_ttl: Duration::from_secs(300),
            maintenance_ttl: Duration::from_secs(60),
        }
    }
}

/// Key of the list partition
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ListScope {
    Namespace(String),
    AllNamespaces,
}

impl fmt::Display for ListScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListScope::Namespace(ns) => f.write_str(ns),
            ListScope::AllNamespaces => f.write_str("*"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub policies: usize,
    pub lists: usize,
    pub maintenance: usize,
}

struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

#[derive(Default)]
struct Partitions {
    policies: HashMap<ObjectKey, Entry<AvailabilityPolicy>>,
    lists: HashMap<ListScope, Entry<Vec<AvailabilityPolicy>>>,
    maintenance: HashMap<ObjectKey, Entry<bool>>,
}

pub struct PolicyCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    partitions: RwLock<Partitions>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    /// Advanced under the write lock by policy invalidations
    epoch: AtomicU64,
}

impl fmt::Debug for PolicyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyCache")
            .field("config", &self.config)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn is_fresh<V>(entry: &Entry<V>, ttl: Duration, now: DateTime<Utc>) -> bool {
    elapsed_between(entry.inserted_at, now) < ttl
}

/// Insert, evicting the oldest entries first when the map is full.
/// Returns the number of evictions.
fn insert_bounded<K, V>(map: &mut HashMap<K, Entry<V>>, key: K, entry: Entry<V>, max: usize) -> u64
where
    K: Eq + Hash + Clone,
{
    let mut evicted = 0;
    if !map.contains_key(&key) {
        while map.len() >= max.max(1) {
            let Some(oldest) = map
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            map.remove(&oldest);
            evicted += 1;
        }
    }
    map.insert(key, entry);
    evicted
}

impl PolicyCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            partitions: RwLock::new(Partitions::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    /// Current invalidation epoch, read before fetching a list to cache
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn record<T>(&self, found: Option<T>) -> Option<T> {
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Policy by key
    ///
    /// Falls back to the cached lists, so members of a list larger than the
    /// partition bound still read as hits.
    pub async fn get_policy(&self, key: &ObjectKey) -> Option<AvailabilityPolicy> {
        let now = self.clock.now();
        let ttl = self.config.policy_ttl;
        let partitions = self.partitions.read().await;
        let found = partitions
            .policies
            .get(key)
            .filter(|e| is_fresh(e, ttl, now))
            .map(|e| e.value.clone())
            .or_else(|| {
                partitions
                    .lists
                    .values()
                    .filter(|e| is_fresh(e, ttl, now))
                    .flat_map(|e| e.value.iter())
                    .find(|p| ObjectKey::of(*p).as_ref() == Some(key))
                    .cloned()
            });
        self.record(found)
    }

    pub async fn set_policy(&self, key: ObjectKey, policy: AvailabilityPolicy) {
        let entry = Entry {
            value: policy,
            inserted_at: self.clock.now(),
        };
        let mut partitions = self.partitions.write().await;
        let evicted = insert_bounded(&mut partitions.policies, key, entry, self.config.max_size);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    pub async fn get_list(&self, scope: &ListScope) -> Option<Vec<AvailabilityPolicy>> {
        let now = self.clock.now();
        let partitions = self.partitions.read().await;
        let found = partitions
            .lists
            .get(scope)
            .filter(|e| is_fresh(e, self.config.policy_ttl, now))
            .map(|e| e.value.clone());
        self.record(found)
    }

    /// Cache a list and prime the policy partition with its members
    pub async fn set_list(&self, scope: ListScope, policies: Vec<AvailabilityPolicy>) {
        let mut partitions = self.partitions.write().await;
        self.store_list(&mut partitions, scope, policies);
    }

    /// `set_list` for a list fetched at `epoch`
    ///
    /// Returns false and stores nothing when a policy invalidation happened
    /// since `epoch` was read.
    pub async fn set_list_if_current(
        &self,
        scope: ListScope,
        policies: Vec<AvailabilityPolicy>,
        epoch: u64,
    ) -> bool {
        let mut partitions = self.partitions.write().await;
        if self.epoch.load(Ordering::Acquire) != epoch {
            debug!(scope = %scope, "Dropping policy list fetched before an invalidation");
            return false;
        }
        self.store_list(&mut partitions, scope, policies);
        true
    }

    fn store_list(
        &self,
        partitions: &mut Partitions,
        scope: ListScope,
        policies: Vec<AvailabilityPolicy>,
    ) {
        let now = self.clock.now();
        let mut evicted = 0;

        for policy in &policies {
            let Some(key) = ObjectKey::of(policy) else {
                continue;
            };
            let entry = Entry {
                value: policy.clone(),
                inserted_at: now,
            };
            evicted += insert_bounded(&mut partitions.policies, key, entry, self.config.max_size);
        }

        let entry = Entry {
            value: policies,
            inserted_at: now,
        };
        evicted += insert_bounded(&mut partitions.lists, scope, entry, self.config.max_size);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    pub async fn get_maintenance(&self, workload: &ObjectKey) -> Option<bool> {
        let now = self.clock.now();
        let partitions = self.partitions.read().await;
        let found = partitions
            .maintenance
            .get(workload)
            .filter(|e| is_fresh(e, self.config.maintenance_ttl, now))
            .map(|e| e.value);
        self.record(found)
    }

    pub async fn set_maintenance(&self, workload: ObjectKey, active: bool) {
        let entry = Entry {
            value: active,
            inserted_at: self.clock.now(),
        };
        let mut partitions = self.partitions.write().await;
        let evicted = insert_bounded(
            &mut partitions.maintenance,
            workload,
            entry,
            self.config.max_size,
        );
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Drop a policy, every list, and every maintenance evaluation
    pub async fn invalidate_policy(&self, key: &ObjectKey) {
        let mut partitions = self.partitions.write().await;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        partitions.policies.remove(key);
        partitions.lists.clear();
        partitions.maintenance.clear();
        debug!(policy = %key, "Invalidated cached policy");
    }

    /// Drop the namespace's policies and every list
    pub async fn invalidate_namespace(&self, namespace: &str) {
        let mut partitions = self.partitions.write().await;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        partitions.policies.retain(|k, _| k.namespace != namespace);
        partitions.lists.clear();
        debug!(namespace = %namespace, "Invalidated cached policies for namespace");
    }

    pub async fn invalidate_maintenance_namespace(&self, namespace: &str) {
        let mut partitions = self.partitions.write().await;
        partitions.maintenance.retain(|k, _| k.namespace != namespace);
    }

    pub async fn invalidate_workload(&self, workload: &ObjectKey) {
        let mut partitions = self.partitions.write().await;
        partitions.maintenance.remove(workload);
    }

    pub async fn stats(&self) -> CacheStats {
        let partitions = self.partitions.read().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            policies: partitions.policies.len(),
            lists: partitions.lists.len(),
            maintenance: partitions.maintenance.len(),
        }
    }

    /// Remove expired entries; returns how many were removed
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let policy_ttl = self.config.policy_ttl;
        let maintenance_ttl = self.config.maintenance_ttl;

        let mut partitions = self.partitions.write().await;
        let before =
            partitions.policies.len() + partitions.lists.len() + partitions.maintenance.len();
        partitions.policies.retain(|_, e| is_fresh(e, policy_ttl, now));
        partitions.lists.retain(|_, e| is_fresh(e, policy_ttl, now));
        partitions
            .maintenance
            .retain(|_, e| is_fresh(e, maintenance_ttl, now));
        let after =
            partitions.policies.len() + partitions.lists.len() + partitions.maintenance.len();

        before - after
    }

    /// Half the shortest TTL, never below one second
    pub fn sweep_interval(&self) -> Duration {
        (self.config.policy_ttl.min(self.config.maintenance_ttl) / 2).max(Duration::from_secs(1))
    }

    /// Periodic sweep until `shutdown` fires
    pub async fn run_sweeper(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Cache sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let removed = self.sweep().await;
                    trace!(removed, "Swept policy cache");
                }
            }
        }
    }
}
