//! Per-key async locking, shared by the Coordinator and the Scan Cache
//! for their "serialize mutation through a keyed lock" discipline: one
//! entry per key guarded by a single outer lock, never one lock per
//! logical operation.

use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

pub struct KeyedLocks<K> {
    locks: SyncMutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: SyncMutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating its entry if absent. The
    /// returned guard's drop releases the per-key lock only — the outer
    /// map lock is never held across an `.await`.
    pub async fn lock(&self, key: K) -> tokio::sync::OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.locks.lock();
            map.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        entry.lock_owned().await
    }

    /// Drop the map entry for `key` if no one else holds a reference,
    /// preventing unbounded growth across a long-lived process.
    pub fn sweep(&self, key: &K) {
        let mut map = self.locks.lock();
        if let Some(lock) = map.get(key) {
            if Arc::strong_count(lock) == 1 {
                map.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_concurrent_lock_blocks_on_first() {
        let locks: Arc<KeyedLocks<&'static str>> = Arc::new(KeyedLocks::new());
        let order = Arc::new(SyncMutex::new(Vec::new()));

        let guard = locks.lock("k").await;
        let locks2 = locks.clone();
        let order2 = order.clone();
        let handle = tokio::spawn(async move {
            let _g = locks2.lock("k").await;
            order2.lock().push(2);
        });

        tokio::task::yield_now().await;
        order.lock().push(1);
        drop(guard);
        handle.await.unwrap();

        assert_eq!(*order.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn independent_keys_do_not_block_each_other() {
        let locks: Arc<KeyedLocks<u32>> = Arc::new(KeyedLocks::new());
        let _g1 = locks.lock(1).await;
        let g2 = locks.lock(2).await;
        drop(g2);
    }
}
