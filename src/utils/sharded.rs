use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock};

const DEFAULT_SHARDS: usize = 32;

/// Hash map split into independently locked shards, so that work on one key
/// never waits on an unrelated key that hashes elsewhere.
pub struct ShardedMap<K, V> {
    shards: Box<[RwLock<HashMap<K, V>>]>,
}

impl<K: Hash + Eq, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl<K: Hash + Eq, V> ShardedMap<K, V> {
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    fn shard(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Runs `f` against the shard owning `key` under its read lock.
    pub fn read<R>(&self, key: &K, f: impl FnOnce(&HashMap<K, V>) -> R) -> R {
        let guard = self.shard(key).read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Runs `f` against the shard owning `key` under its write lock.
    pub fn write<R>(&self, key: &K, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let mut guard = self.shard(key).write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties every shard and hands back what was in them.
    pub fn drain_all(&self) -> Vec<V> {
        self.shards
            .iter()
            .flat_map(|s| {
                let mut guard = s.write().unwrap_or_else(PoisonError::into_inner);
                guard.drain().map(|(_, v)| v).collect::<Vec<_>>()
            })
            .collect()
    }

    /// Sums `f` over every value, one shard locked at a time. Not a snapshot.
    pub fn sum_by(&self, f: impl Fn(&V) -> usize) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).values().map(&f).sum::<usize>())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_land_in_a_stable_shard() {
        let map: ShardedMap<u64, &str> = ShardedMap::new(4);
        for k in 0..64 {
            map.write(&k, |m| m.insert(k, "v"));
        }
        assert_eq!(map.len(), 64);
        for k in 0..64 {
            assert_eq!(map.read(&k, |m| m.get(&k).copied()), Some("v"));
        }
    }

    #[test]
    fn zero_shards_falls_back_to_one() {
        let map: ShardedMap<u64, u64> = ShardedMap::new(0);
        map.write(&1, |m| m.insert(1, 2));
        assert!(!map.is_empty());
    }

    #[test]
    fn drain_all_empties_every_shard() {
        let map: ShardedMap<u64, u64> = ShardedMap::new(4);
        for k in 0..10 {
            map.write(&k, |m| m.insert(k, k * 2));
        }
        let mut drained = map.drain_all();
        drained.sort_unstable();
        assert_eq!(drained, (0..10).map(|k| k * 2).collect::<Vec<_>>());
        assert!(map.is_empty());
    }
}
