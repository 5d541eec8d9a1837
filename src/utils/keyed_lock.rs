use std::hash::Hash;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::sharded::ShardedMap;

/// Prune dead entries from a shard once it holds this many keys.
const PRUNE_THRESHOLD: usize = 256;

/// Single-writer-per-key async locks.
///
/// Each key maps to a weakly held mutex: the mutex lives exactly as long as
/// someone holds or waits on it, so the table never grows with the number of
/// keys ever seen.
pub struct KeyedLocks<K> {
    slots: ShardedMap<K, Weak<Mutex<()>>>,
}

impl<K: Hash + Eq + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: ShardedMap::default(),
        }
    }
}

impl<K: Hash + Eq + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let slot = self.slots.write(&key, |slots| {
            if let Some(existing) = slots.get(&key).and_then(Weak::upgrade) {
                return existing;
            }
            if slots.len() >= PRUNE_THRESHOLD {
                slots.retain(|_, weak| weak.strong_count() > 0);
            }
            let fresh = Arc::new(Mutex::new(()));
            slots.insert(key.clone(), Arc::downgrade(&fresh));
            fresh
        });
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::<u64>::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock(7).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = KeyedLocks::<u64>::new();
        let _a = locks.lock(1).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(2)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_slots_are_reused_not_leaked() {
        let locks = KeyedLocks::<u64>::new();
        {
            let _g = locks.lock(3).await;
        }
        let _g = locks.lock(3).await;
        assert_eq!(locks.slots.len(), 1);
    }
}
