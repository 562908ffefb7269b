//! Scan Cache — fingerprinted result cache with at-most-one in-flight
//! build per key, TTL freshness, and bounded-size LRU eviction. The
//! at-most-one-build guarantee reuses `sentryscan_core::KeyedLocks`; LRU
//! bookkeeping is a plain access-order `VecDeque` rather than an external
//! LRU crate.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sentryscan_core::keyed_lock::KeyedLocks;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

struct Entry {
    value: Vec<u8>,
    inserted_at: DateTime<Utc>,
    ttl_secs: u64,
}

impl Entry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.inserted_at).num_seconds() < self.ttl_secs as i64
    }
}

struct Store {
    entries: HashMap<String, Entry>,
    access_order: VecDeque<String>,
}

/// Computes a cache-key fingerprint: hash(target || sorted ports || the
/// option subset that affects results).
pub fn fingerprint(target: &str, sorted_ports: &[u16], result_affecting_options: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(target.as_bytes());
    hasher.update(b"\0");
    for port in sorted_ports {
        hasher.update(port.to_le_bytes());
    }
    hasher.update(b"\0");
    hasher.update(result_affecting_options.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct ScanCache {
    store: Mutex<Store>,
    locks: KeyedLocks<String>,
    max_entries: usize,
    max_value_bytes: usize,
}

impl ScanCache {
    pub fn new(max_entries: usize, max_value_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(Store {
                entries: HashMap::new(),
                access_order: VecDeque::new(),
            }),
            locks: KeyedLocks::new(),
            max_entries,
            max_value_bytes,
        })
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut store = self.store.lock();
        let now = Utc::now();
        let fresh = store.entries.get(key).map(|e| e.is_fresh(now)).unwrap_or(false);
        if !fresh {
            store.entries.remove(key);
            return None;
        }
        Self::touch(&mut store, key);
        let bytes = &store.entries.get(key)?.value;
        serde_json::from_slice(bytes).ok()
    }

    pub fn set<T: serde::Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Ok(bytes) = serde_json::to_vec(value) else {
            return;
        };
        if bytes.len() > self.max_value_bytes {
            return;
        }
        let mut store = self.store.lock();
        store.entries.insert(
            key.to_string(),
            Entry {
                value: bytes,
                inserted_at: Utc::now(),
                ttl_secs,
            },
        );
        Self::touch(&mut store, key);
        self.evict_if_needed(&mut store);
    }

    pub fn invalidate(&self, key: &str) {
        let mut store = self.store.lock();
        store.entries.remove(key);
        store.access_order.retain(|k| k != key);
    }

    /// Fetch `key`; if absent or stale, run `build` with at-most-one
    /// concurrent execution per key and cache the result. A second caller
    /// racing on the same key blocks until the first finishes, then reads
    /// the value the first call produced rather than re-building.
    pub async fn get_or_build<T, F, Fut, E>(
        &self,
        key: &str,
        ttl_secs: u64,
        build: F,
    ) -> Result<T, E>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }

        let _guard = self.lock_key(key).await;

        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }

        let value = build().await?;
        self.set(key, &value, ttl_secs);
        Ok(value)
    }

    /// Acquire the per-key build lock directly, for callers that need to
    /// interleave side effects (e.g. publishing progress events) between
    /// the cache re-check and the build, and so cannot express the whole
    /// sequence as a single `get_or_build` closure.
    pub async fn lock_key(&self, key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        self.locks.lock(key.to_string()).await
    }

    fn touch(store: &mut Store, key: &str) {
        store.access_order.retain(|k| k != key);
        store.access_order.push_back(key.to_string());
    }

    fn evict_if_needed(&self, store: &mut Store) {
        while store.entries.len() > self.max_entries {
            if let Some(oldest) = store.access_order.pop_front() {
                store.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fingerprint_is_stable_for_same_inputs() {
        let a = fingerprint("10.0.0.1", &[22, 80], "");
        let b = fingerprint("10.0.0.1", &[22, 80], "");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_on_option_subset() {
        let a = fingerprint("10.0.0.1", &[22, 80], "allow_private=true");
        let b = fingerprint("10.0.0.1", &[22, 80], "allow_private=false");
        assert_ne!(a, b);
    }

    #[test]
    fn stale_entry_is_treated_as_absent() {
        let cache = ScanCache::new(10, 1_000_000);
        cache.set("k", &42u32, 0);
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(cache.get::<u32>("k"), None);
    }

    #[test]
    fn lru_eviction_drops_oldest_entry_first() {
        let cache = ScanCache::new(2, 1_000_000);
        cache.set("a", &1u32, 60);
        cache.set("b", &2u32, 60);
        cache.set("c", &3u32, 60);
        assert_eq!(cache.get::<u32>("a"), None);
        assert_eq!(cache.get::<u32>("b"), Some(2));
        assert_eq!(cache.get::<u32>("c"), Some(3));
    }

    #[tokio::test]
    async fn concurrent_get_or_build_runs_builder_once() {
        let cache = ScanCache::new(10, 1_000_000);
        let build_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let build_count = build_count.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build::<u32, _, _, std::convert::Infallible>("key", 60, || {
                        let build_count = build_count.clone();
                        async move {
                            build_count.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok(7)
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(build_count.load(Ordering::SeqCst), 1);
    }
}
