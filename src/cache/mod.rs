//! Bounded cache of loaded partitions
//!
//! The cache is the single source of truth for which partitions are resident.
//! Misses load from disk through the [`PartitionManager`]; when nothing is
//! persisted the first miss triggers a full rebuild.

mod lru_map;

pub use lru_map::LruMap;

use crate::error::{CaseIndexError, Result};
use crate::model::PartitionKey;
use crate::partition::{CategoryPartition, PartitionManager};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

pub const DEFAULT_CAPACITY: usize = 5;

/// Outcome of [`IndexCache::get_or_load`]
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Partition(Arc<CategoryPartition>),
    /// The category has no embedded cases. Not an error.
    NoData,
}

impl CacheLookup {
    pub fn partition(&self) -> Option<&Arc<CategoryPartition>> {
        match self {
            CacheLookup::Partition(partition) => Some(partition),
            CacheLookup::NoData => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, CacheLookup::NoData)
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub loads: u64,
    pub rebuilds: u64,
    pub evictions: u64,
    pub no_data: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    loads: AtomicU64,
    rebuilds: AtomicU64,
    evictions: AtomicU64,
    no_data: AtomicU64,
}

/// Strict-LRU cache of partitions in front of a [`PartitionManager`]
///
/// Residency lives behind an `RwLock` that is only held for map operations.
/// Disk loads and rebuilds run under a separate mutex, so hits on resident
/// partitions never wait on a rebuild.
pub struct IndexCache {
    manager: Arc<PartitionManager>,
    entries: RwLock<LruMap<PartitionKey, Arc<CategoryPartition>>>,
    /// Held while loading or rebuilding; the flag records whether the full
    /// rebuild fallback already ran since the cache was created or cleared
    build: Mutex<bool>,
    counters: Counters,
}

impl IndexCache {
    pub fn new(manager: Arc<PartitionManager>, capacity: usize) -> Self {
        Self {
            manager,
            entries: RwLock::new(LruMap::new(capacity)),
            build: Mutex::new(false),
            counters: Counters::default(),
        }
    }

    pub fn manager(&self) -> &Arc<PartitionManager> {
        &self.manager
    }

    /// Serve a partition from memory, disk, or a full rebuild
    pub fn get_or_load(&self, key: PartitionKey) -> Result<CacheLookup> {
        if let Some(partition) = self.write_entries().get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit for partition {}", key);
            return Ok(CacheLookup::Partition(partition));
        }

        let mut rebuilt = self.lock_build();

        // Another caller may have loaded it while we waited
        if let Some(partition) = self.write_entries().get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(CacheLookup::Partition(partition));
        }

        let loaded = match self.manager.load_partition(key) {
            Ok(partition) => {
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                Some(partition)
            }
            Err(CaseIndexError::PartitionNotFound { .. }) if *rebuilt => None,
            Err(CaseIndexError::CorruptPartition { reason, .. }) if *rebuilt => {
                warn!("Partition {} is corrupt ({}), rebuilding it alone", key, reason);
                self.counters.rebuilds.fetch_add(1, Ordering::Relaxed);
                self.manager.build_partition(key)?
            }
            Err(e @ CaseIndexError::PartitionNotFound { .. })
            | Err(e @ CaseIndexError::CorruptPartition { .. }) => {
                info!("{}; falling back to a full partition rebuild", e);
                self.counters.rebuilds.fetch_add(1, Ordering::Relaxed);
                // A failed rebuild leaves the fallback armed for the next miss
                let mut partitions = self.manager.build_all_partitions()?;
                *rebuilt = true;
                partitions.remove(&key)
            }
            Err(e) => return Err(e),
        };
        drop(rebuilt);

        match loaded {
            Some(partition) => {
                let partition = Arc::new(partition);
                self.insert(key, partition.clone());
                Ok(CacheLookup::Partition(partition))
            }
            None => {
                self.counters.no_data.fetch_add(1, Ordering::Relaxed);
                debug!("No data for partition {}", key);
                Ok(CacheLookup::NoData)
            }
        }
    }

    /// Rebuild one partition from the store and replace the resident copy
    pub fn refresh(&self, key: PartitionKey) -> Result<CacheLookup> {
        let _guard = self.lock_build();
        self.counters.rebuilds.fetch_add(1, Ordering::Relaxed);

        match self.manager.build_partition(key)? {
            Some(partition) => {
                let partition = Arc::new(partition);
                self.insert(key, partition.clone());
                Ok(CacheLookup::Partition(partition))
            }
            None => {
                self.write_entries().remove(&key);
                Ok(CacheLookup::NoData)
            }
        }
    }

    pub fn contains(&self, key: PartitionKey) -> bool {
        self.read_entries().contains(&key)
    }

    /// Resident keys, most-recently-used first
    pub fn resident_keys(&self) -> Vec<PartitionKey> {
        self.read_entries().keys_by_recency()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.read_entries().capacity()
    }

    /// Drop a resident partition; the next access reloads it
    pub fn invalidate(&self, key: PartitionKey) -> bool {
        self.write_entries().remove(&key).is_some()
    }

    /// Drop everything and re-arm the rebuild fallback
    pub fn clear(&self) {
        let mut rebuilt = self.lock_build();
        self.write_entries().clear();
        *rebuilt = false;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            rebuilds: self.counters.rebuilds.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            no_data: self.counters.no_data.load(Ordering::Relaxed),
        }
    }

    fn insert(&self, key: PartitionKey, partition: Arc<CategoryPartition>) {
        if let Some((evicted, _)) = self.write_entries().insert(key, partition) {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            info!("Evicted partition {} from cache", evicted);
        }
    }

    // A panic while holding a guard cannot leave the map half-updated, so poisoning is ignored
    fn read_entries(&self) -> RwLockReadGuard<'_, LruMap<PartitionKey, Arc<CategoryPartition>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, LruMap<PartitionKey, Arc<CategoryPartition>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_build(&self) -> MutexGuard<'_, bool> {
        self.build.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaseCategory, PartyShape, SpecialCase};
    use crate::partition::BuildParams;
    use crate::storage::test_support::SwitchableStore;
    use crate::storage::SqliteCaseStore;
    use std::thread;
    use tempfile::TempDir;

    fn category_key(shape: PartyShape) -> PartitionKey {
        PartitionKey::Category(CaseCategory::Party(shape))
    }

    fn seeded_store(temp: &TempDir) -> Arc<SqliteCaseStore> {
        let store = Arc::new(SqliteCaseStore::open(&temp.path().join("cases.db")).unwrap());
        let mut id = 0;
        for shape in PartyShape::ALL {
            for j in 0..3 {
                let vector = vec![id as f32, j as f32];
                store
                    .insert_case(id, CaseCategory::Party(shape), "text", Some(&vector))
                    .unwrap();
                id += 1;
            }
        }
        store
    }

    fn setup(temp: &TempDir, capacity: usize) -> IndexCache {
        let manager = PartitionManager::new(
            seeded_store(temp),
            temp.path().join("indexes"),
            BuildParams::default(),
        )
        .unwrap();
        IndexCache::new(Arc::new(manager), capacity)
    }

    #[test]
    fn test_cold_miss_rebuilds_once() {
        let temp = TempDir::new().unwrap();
        let cache = setup(&temp, 5);

        let first = cache.get_or_load(category_key(PartyShape::SinglePair)).unwrap();
        assert_eq!(first.partition().unwrap().len(), 3);
        assert_eq!(cache.stats().rebuilds, 1);

        // Persisted by the rebuild, so this one is a disk load
        cache.get_or_load(category_key(PartyShape::MultipleBoth)).unwrap();
        let stats = cache.stats();
        assert_eq!(stats.rebuilds, 1);
        assert_eq!(stats.loads, 1);
    }

    #[test]
    fn test_hit_after_load() {
        let temp = TempDir::new().unwrap();
        let cache = setup(&temp, 5);

        let key = category_key(PartyShape::MultiplePlaintiffs);
        let a = cache.get_or_load(key).unwrap();
        let b = cache.get_or_load(key).unwrap();

        assert!(Arc::ptr_eq(a.partition().unwrap(), b.partition().unwrap()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_capacity_bound_evicts_lru() {
        let temp = TempDir::new().unwrap();
        let cache = setup(&temp, 3);

        let keys: Vec<PartitionKey> = PartyShape::ALL.into_iter().map(category_key).collect();
        for key in &keys {
            cache.get_or_load(*key).unwrap();
        }

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(keys[0]));
        assert_eq!(cache.resident_keys(), vec![keys[3], keys[2], keys[1]]);
        assert_eq!(cache.stats().evictions, 1);

        // Re-access is a reload, not a hit
        let before = cache.stats();
        cache.get_or_load(keys[0]).unwrap();
        let after = cache.stats();
        assert_eq!(after.hits, before.hits);
        assert_eq!(after.loads, before.loads + 1);
        assert!(!cache.contains(keys[1]));
    }

    #[test]
    fn test_no_data_category() {
        let temp = TempDir::new().unwrap();
        let cache = setup(&temp, 5);

        let animal = PartitionKey::Category(CaseCategory::Special(SpecialCase::AnimalCaused));
        assert!(cache.get_or_load(animal).unwrap().is_no_data());
        // Second miss does not rescan the store
        assert!(cache.get_or_load(animal).unwrap().is_no_data());

        let stats = cache.stats();
        assert_eq!(stats.rebuilds, 1);
        assert_eq!(stats.no_data, 2);
        assert!(!cache.contains(animal));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let temp = TempDir::new().unwrap();
        let cache = setup(&temp, 5);
        let key = PartitionKey::Global;

        cache.get_or_load(key).unwrap();
        assert!(cache.invalidate(key));
        assert!(!cache.invalidate(key));

        cache.get_or_load(key).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 5);
    }

    #[test]
    fn test_refresh_replaces_resident_copy() {
        let temp = TempDir::new().unwrap();
        let cache = setup(&temp, 5);
        let key = category_key(PartyShape::SinglePair);

        let before = cache.get_or_load(key).unwrap();
        let after = cache.refresh(key).unwrap();
        assert!(!Arc::ptr_eq(before.partition().unwrap(), after.partition().unwrap()));
        assert_eq!(cache.resident_keys()[0], key);
    }

    #[test]
    fn test_store_outage_is_not_no_data() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SwitchableStore::new(seeded_store(&temp)));
        let manager =
            PartitionManager::new(store.clone(), temp.path().join("indexes"), BuildParams::default())
                .unwrap();
        let cache = IndexCache::new(Arc::new(manager), 5);
        let key = category_key(PartyShape::SinglePair);

        store.set_available(false);
        for _ in 0..2 {
            assert!(matches!(
                cache.get_or_load(key),
                Err(CaseIndexError::StoreUnavailable(_))
            ));
        }
        assert_eq!(cache.stats().no_data, 0);
        assert!(cache.is_empty());

        // The rebuild fallback is still armed once the store is back
        store.set_available(true);
        let lookup = cache.get_or_load(key).unwrap();
        assert_eq!(lookup.partition().unwrap().len(), 3);
    }

    #[test]
    fn test_concurrent_loads_respect_capacity() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(setup(&temp, 2));
        let keys: Vec<PartitionKey> = PartyShape::ALL.into_iter().map(category_key).collect();

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = cache.clone();
                let keys = keys.clone();
                thread::spawn(move || {
                    for round in 0..20 {
                        let key = keys[(worker + round) % keys.len()];
                        if round % 5 == 0 {
                            cache.refresh(key).unwrap();
                        } else {
                            let lookup = cache.get_or_load(key).unwrap();
                            let partition = lookup.partition().unwrap();
                            assert_eq!(partition.key(), key);
                            assert_eq!(partition.len(), 3);
                        }
                        assert!(cache.len() <= 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 2);
        let resident = cache.resident_keys();
        assert_eq!(resident.len(), cache.len());
        assert!(resident.iter().all(|key| keys.contains(key)));
        assert!(cache.stats().rebuilds >= 1);
    }
}
