//! Generic two-tier TTL store backing every cache namespace.
//!
//! One [`Store`] owns one namespace directory: a memory map in front of one
//! JSON file per key. Reads prefer memory, fall back to disk (repopulating
//! memory), and silently delete anything stale. Writes go to both tiers;
//! every disk failure is swallowed: the cache is advisory and must never
//! break the pipeline above it. The tiers expire independently: memory is a
//! possibly-stale subset of disk and that is fine.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

/// Injectable millisecond clock, shared across a cache's stores.
pub type NowFn = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Wall-clock milliseconds since the Unix epoch.
#[must_use]
pub fn system_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// On-disk record shape. Unknown sibling fields are ignored on read so the
/// format can grow without invalidating old entries.
#[derive(Debug, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiskRecord<T> {
    fetched_at: u64,
    value: T,
}

#[derive(Debug, Clone)]
struct MemEntry<T> {
    fetched_at: u64,
    value: T,
}

/// One namespace of the two-tier cache.
pub struct Store<T> {
    name: &'static str,
    dir: PathBuf,
    ttl_ms: u64,
    disabled: bool,
    now: NowFn,
    memory: RwLock<HashMap<String, MemEntry<T>>>,
}

impl<T> Store<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    pub(crate) fn new(
        name: &'static str,
        dir: PathBuf,
        ttl_ms: u64,
        disabled: bool,
        now: NowFn,
    ) -> Self {
        Self {
            name,
            dir,
            ttl_ms,
            disabled,
            now,
            memory: RwLock::new(HashMap::new()),
        }
    }

    /// Namespace name (the directory name under the cache root).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The namespace's TTL in milliseconds.
    #[must_use]
    pub const fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    fn fresh(&self, fetched_at: u64) -> bool {
        (self.now)().saturating_sub(fetched_at) <= self.ttl_ms
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Look up a key. Freshness is checked on every read; a stale entry is
    /// deleted (best-effort) and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<T> {
        if self.disabled {
            return None;
        }

        let mem_hit = {
            let memory = read_lock(&self.memory);
            memory.get(key).map(|entry| (entry.fetched_at, entry.value.clone()))
        };
        match mem_hit {
            Some((fetched_at, value)) if self.fresh(fetched_at) => {
                trace!(namespace = self.name, key, "memory hit");
                return Some(value);
            },
            Some(_) => {
                write_lock(&self.memory).remove(key);
            },
            None => {},
        }

        let path = self.path_for(key);
        let bytes = tokio::fs::read(&path).await.ok()?;
        let record: DiskRecord<T> = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                debug!(namespace = self.name, key, error = %e, "dropping unreadable cache file");
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            },
        };

        if self.fresh(record.fetched_at) {
            trace!(namespace = self.name, key, "disk hit");
            write_lock(&self.memory).insert(
                key.to_string(),
                MemEntry {
                    fetched_at: record.fetched_at,
                    value: record.value.clone(),
                },
            );
            Some(record.value)
        } else {
            trace!(namespace = self.name, key, "stale entry deleted");
            let _ = tokio::fs::remove_file(&path).await;
            None
        }
    }

    /// Store a value under a key at the current clock reading.
    ///
    /// Memory is written first; the disk write is best-effort and any
    /// failure is logged at debug and swallowed.
    pub async fn set(&self, key: &str, value: &T) {
        if self.disabled {
            return;
        }
        let fetched_at = (self.now)();

        write_lock(&self.memory).insert(
            key.to_string(),
            MemEntry {
                fetched_at,
                value: value.clone(),
            },
        );

        let record = DiskRecord {
            fetched_at,
            value: value.clone(),
        };
        let Ok(json) = serde_json::to_vec(&record) else {
            debug!(namespace = self.name, key, "value failed to serialize; memory-only");
            return;
        };
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            debug!(namespace = self.name, error = %e, "cache dir create failed");
            return;
        }
        if let Err(e) = tokio::fs::write(self.path_for(key), json).await {
            debug!(namespace = self.name, key, error = %e, "cache write failed");
        }
    }

    /// Drop a key from both tiers (best-effort on disk).
    pub async fn remove(&self, key: &str) {
        if self.disabled {
            return;
        }
        write_lock(&self.memory).remove(key);
        let _ = tokio::fs::remove_file(self.path_for(key)).await;
    }

    /// Drop every memory-tier entry. Disk is untouched.
    pub(crate) fn clear_memory(&self) {
        write_lock(&self.memory).clear();
    }

    /// Count entries currently on disk for this namespace.
    pub async fn disk_entries(&self) -> usize {
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        count
    }
}

// Lock poisoning only happens if a writer panicked mid-operation; the map
// contents are still structurally sound (entries are inserted atomically),
// so continue with the inner value.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    fn manual_clock() -> (Arc<AtomicU64>, NowFn) {
        let tick = Arc::new(AtomicU64::new(0));
        let clock = Arc::clone(&tick);
        let now: NowFn = Arc::new(move || clock.load(Ordering::SeqCst));
        (tick, now)
    }

    fn store_in(dir: &TempDir, ttl_ms: u64, now: NowFn) -> Store<String> {
        Store::new("test", dir.path().join("test"), ttl_ms, false, now)
    }

    #[tokio::test]
    async fn round_trips_through_memory() {
        let dir = TempDir::new().unwrap();
        let (_, now) = manual_clock();
        let store = store_in(&dir, 1000, now);

        assert_eq!(store.get("k").await, None);
        store.set("k", &"hello".to_string()).await;
        assert_eq!(store.get("k").await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn disk_tier_survives_memory_clear() {
        let dir = TempDir::new().unwrap();
        let (_, now) = manual_clock();
        let store = store_in(&dir, 1000, now);

        store.set("k", &"persisted".to_string()).await;
        store.clear_memory();
        assert_eq!(store.get("k").await, Some("persisted".to_string()));
    }

    #[tokio::test]
    async fn ttl_boundary_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let (tick, now) = manual_clock();
        let store = store_in(&dir, 1000, now);

        store.set("k", &"v".to_string()).await;

        tick.store(999, Ordering::SeqCst);
        assert_eq!(store.get("k").await, Some("v".to_string()));

        tick.store(1000, Ordering::SeqCst);
        assert_eq!(store.get("k").await, Some("v".to_string()));

        tick.store(1001, Ordering::SeqCst);
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn stale_disk_entry_is_deleted() {
        let dir = TempDir::new().unwrap();
        let (tick, now) = manual_clock();
        let store = store_in(&dir, 1000, now);

        store.set("k", &"v".to_string()).await;
        let path = dir.path().join("test").join("k.json");
        assert!(path.exists());

        tick.store(5000, Ordering::SeqCst);
        assert_eq!(store.get("k").await, None);
        assert!(!path.exists(), "stale file should be removed on read");
    }

    #[tokio::test]
    async fn stale_memory_falls_back_to_disk_state() {
        let dir = TempDir::new().unwrap();
        let (tick, now) = manual_clock();
        let store = store_in(&dir, 1000, now);

        store.set("k", &"v".to_string()).await;
        tick.store(2000, Ordering::SeqCst);
        // Memory and disk are both stale now; both must report miss and the
        // memory entry must be evicted.
        assert_eq!(store.get("k").await, None);
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn corrupt_disk_entry_is_dropped() {
        let dir = TempDir::new().unwrap();
        let (_, now) = manual_clock();
        let store = store_in(&dir, 1000, now);

        let ns = dir.path().join("test");
        std::fs::create_dir_all(&ns).unwrap();
        std::fs::write(ns.join("bad.json"), b"{nonsense").unwrap();

        assert_eq!(store.get("bad").await, None);
        assert!(!ns.join("bad.json").exists());
    }

    #[tokio::test]
    async fn unknown_disk_fields_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let (_, now) = manual_clock();
        let store = store_in(&dir, 1000, now);

        let ns = dir.path().join("test");
        std::fs::create_dir_all(&ns).unwrap();
        std::fs::write(
            ns.join("k.json"),
            br#"{"fetchedAt":0,"value":"forward","futureField":true}"#,
        )
        .unwrap();

        assert_eq!(store.get("k").await, Some("forward".to_string()));
    }

    #[tokio::test]
    async fn disabled_store_is_inert() {
        let dir = TempDir::new().unwrap();
        let (_, now) = manual_clock();
        let store: Store<String> =
            Store::new("test", dir.path().join("test"), 1000, true, now);

        store.set("k", &"v".to_string()).await;
        assert_eq!(store.get("k").await, None);
        assert!(!dir.path().join("test").exists());
    }

    #[tokio::test]
    async fn remove_clears_both_tiers() {
        let dir = TempDir::new().unwrap();
        let (_, now) = manual_clock();
        let store = store_in(&dir, 1000, now);

        store.set("k", &"v".to_string()).await;
        store.remove("k").await;
        assert_eq!(store.get("k").await, None);
        assert!(!dir.path().join("test").join("k.json").exists());
    }

    #[tokio::test]
    async fn disk_entries_counts_json_files() {
        let dir = TempDir::new().unwrap();
        let (_, now) = manual_clock();
        let store = store_in(&dir, 1000, now);

        assert_eq!(store.disk_entries().await, 0);
        store.set("a", &"1".to_string()).await;
        store.set("b", &"2".to_string()).await;
        assert_eq!(store.disk_entries().await, 2);
    }
}
