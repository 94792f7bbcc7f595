//! Two-tier package cache (C4): a bounded in-memory LRU in front of a
//! content-addressed persistent store, both keyed by `name@version` with
//! scoped names' `/` escaped to `__`. Grounded on the teacher's manual
//! hash-map caches (`global_cache.rs`, `binary_cache.rs`); the corpus has no
//! `lru` crate dependency anywhere, so the LRU ordering here is hand-rolled
//! with a `VecDeque` recency list rather than an unsafe intrusive
//! doubly-linked list.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::PmError;
use crate::extract::ExtractedPackage;
use crate::log;

/// The persistent cache capability (spec §6): a named key-value store. The
/// native implementation (`DiskStore`) backs it with a directory of files; a
/// WASM host backs it with OPFS. Failures here are never fatal to the
/// cache — they only drop it to memory-only behaviour.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, bytes: Vec<u8>) -> Result<(), PmError>;
    fn remove(&self, key: &str);
    fn keys(&self) -> Vec<String>;
}

/// A directory-backed `PersistentStore`: one file per cache key.
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PmError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| PmError::TarballError { message: e.to_string() })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl PersistentStore for DiskStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, bytes: Vec<u8>) -> Result<(), PmError> {
        fs::write(self.path_for(key), bytes).map_err(|e| PmError::TarballError { message: e.to_string() })
    }

    fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.path_for(key));
    }

    fn keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(key) = name.strip_suffix(".json") {
                        out.push(key.to_string());
                    }
                }
            }
        }
        out
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    name: String,
    version: String,
    tarball_url: String,
    integrity: String,
    manifest: serde_json::Value,
    total_size: u64,
    files: Vec<(String, String)>,
}

fn to_persisted(pkg: &ExtractedPackage) -> PersistedEntry {
    PersistedEntry {
        name: pkg.name.clone(),
        version: pkg.version.clone(),
        tarball_url: pkg.tarball_url.clone(),
        integrity: pkg.integrity.clone(),
        manifest: pkg.manifest.clone(),
        total_size: pkg.total_size,
        files: pkg.files.iter().map(|(path, bytes)| (path.clone(), BASE64.encode(bytes))).collect(),
    }
}

fn from_persisted(entry: PersistedEntry) -> Option<ExtractedPackage> {
    let mut files = HashMap::new();
    for (path, encoded) in entry.files {
        let bytes = BASE64.decode(encoded).ok()?;
        files.insert(path, bytes);
    }
    let now = Instant::now();
    Some(ExtractedPackage {
        name: entry.name,
        version: entry.version,
        tarball_url: entry.tarball_url,
        integrity: entry.integrity,
        files,
        manifest: entry.manifest,
        total_size: entry.total_size,
        cached_at: now,
        last_used: now,
    })
}

/// Cache key for `name@version`, escaping scoped-package slashes.
pub fn cache_key(name: &str, version: &str) -> String {
    format!("{}@{}", name, version).replace('/', "__")
}

struct MemoryCache {
    entries: HashMap<String, ExtractedPackage>,
    order: VecDeque<String>,
    max_entries: usize,
    max_bytes: u64,
    current_bytes: u64,
}

impl MemoryCache {
    fn new(max_entries: usize, max_bytes: u64) -> Self {
        Self { entries: HashMap::new(), order: VecDeque::new(), max_entries, max_bytes, current_bytes: 0 }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn evict_until_fits(&mut self, incoming_bytes: u64) {
        while self.entries.len() >= self.max_entries
            || (self.current_bytes + incoming_bytes) > self.max_bytes
        {
            let Some(victim) = self.order.pop_front() else { break };
            if let Some(pkg) = self.entries.remove(&victim) {
                self.current_bytes = self.current_bytes.saturating_sub(pkg.total_size);
            }
            if self.entries.is_empty() {
                break;
            }
        }
    }

    fn insert(&mut self, key: String, pkg: ExtractedPackage) {
        if let Some(old) = self.entries.remove(&key) {
            self.current_bytes = self.current_bytes.saturating_sub(old.total_size);
            if let Some(pos) = self.order.iter().position(|k| k == &key) {
                self.order.remove(pos);
            }
        }
        self.evict_until_fits(pkg.total_size);
        self.current_bytes += pkg.total_size;
        self.order.push_back(key.clone());
        self.entries.insert(key, pkg);
    }

    fn get(&mut self, key: &str, ttl: Duration) -> Option<ExtractedPackage> {
        let expired = self.entries.get(key).map(|p| p.cached_at.elapsed() >= ttl).unwrap_or(false);
        if expired {
            self.remove(key);
            return None;
        }
        if let Some(pkg) = self.entries.get_mut(key) {
            pkg.last_used = Instant::now();
            let result = pkg.clone();
            self.touch(key);
            Some(result)
        } else {
            None
        }
    }

    fn has(&mut self, key: &str, ttl: Duration) -> bool {
        self.get(key, ttl).is_some()
    }

    fn remove(&mut self, key: &str) {
        if let Some(pkg) = self.entries.remove(key) {
            self.current_bytes = self.current_bytes.saturating_sub(pkg.total_size);
        }
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

/// Point-in-time counters for the cache (entry count, bytes, hit/miss
/// totals), useful for `doctor`-style diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

/// The two-tier package cache: a bounded in-memory LRU in front of an
/// optional persistent store. A persistent-store failure degrades the cache
/// to memory-only and logs a warning rather than failing the operation.
pub struct PackageCache {
    memory: Mutex<MemoryCache>,
    persistent: Option<Box<dyn PersistentStore>>,
    package_ttl: Duration,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
}

const DEFAULT_MAX_ENTRIES: usize = 200;
const DEFAULT_MAX_BYTES: u64 = 512 * 1024 * 1024;

impl PackageCache {
    pub fn new(package_ttl: Duration, persistent: Option<Box<dyn PersistentStore>>) -> Self {
        Self::with_limits(package_ttl, persistent, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_BYTES)
    }

    pub fn with_limits(
        package_ttl: Duration,
        persistent: Option<Box<dyn PersistentStore>>,
        max_entries: usize,
        max_bytes: u64,
    ) -> Self {
        Self {
            memory: Mutex::new(MemoryCache::new(max_entries, max_bytes)),
            persistent,
            package_ttl,
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    /// Fetches a cached package, promoting a persistent-tier hit into
    /// memory. Returns `None` on a miss or an expired entry in both tiers.
    pub fn get(&self, name: &str, version: &str) -> Option<ExtractedPackage> {
        let key = cache_key(name, version);
        {
            let mut mem = self.memory.lock().unwrap();
            if let Some(pkg) = mem.get(&key, self.package_ttl) {
                *self.hits.lock().unwrap() += 1;
                return Some(pkg);
            }
        }
        if let Some(store) = &self.persistent {
            if let Some(bytes) = store.get(&key) {
                if let Ok(entry) = serde_json::from_slice::<PersistedEntry>(&bytes) {
                    if let Some(pkg) = from_persisted(entry) {
                        if pkg.cached_at.elapsed() < self.package_ttl {
                            let mut mem = self.memory.lock().unwrap();
                            mem.insert(key, pkg.clone());
                            *self.hits.lock().unwrap() += 1;
                            return Some(pkg);
                        }
                    }
                }
            }
        }
        *self.misses.lock().unwrap() += 1;
        None
    }

    pub fn has(&self, name: &str, version: &str) -> bool {
        let key = cache_key(name, version);
        let mut mem = self.memory.lock().unwrap();
        if mem.has(&key, self.package_ttl) {
            return true;
        }
        drop(mem);
        self.persistent.as_ref().map(|s| s.get(&key).is_some()).unwrap_or(false)
    }

    /// Inserts or refreshes an entry, writing through to the persistent
    /// store. A persistent-store write failure is logged and otherwise
    /// ignored: the entry still lives in memory.
    pub fn set(&self, pkg: ExtractedPackage) {
        let key = cache_key(&pkg.name, &pkg.version);
        if let Some(store) = &self.persistent {
            let persisted = to_persisted(&pkg);
            match serde_json::to_vec(&persisted) {
                Ok(bytes) => {
                    if let Err(e) = store.set(&key, bytes) {
                        log::log_error(&format!("cache: persistent write failed for {}: {}", key, e));
                    }
                }
                Err(e) => log::log_error(&format!("cache: failed to serialize {}: {}", key, e)),
            }
        }
        let mut mem = self.memory.lock().unwrap();
        mem.insert(key, pkg);
    }

    pub fn remove(&self, name: &str, version: &str) {
        let key = cache_key(name, version);
        self.memory.lock().unwrap().remove(&key);
        if let Some(store) = &self.persistent {
            store.remove(&key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let mem = self.memory.lock().unwrap();
        CacheStats {
            entries: mem.entries.len(),
            bytes: mem.current_bytes,
            hits: *self.hits.lock().unwrap(),
            misses: *self.misses.lock().unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pkg(name: &str, version: &str, size: u64) -> ExtractedPackage {
        let now = Instant::now();
        ExtractedPackage {
            name: name.to_string(),
            version: version.to_string(),
            tarball_url: "https://registry.example/x.tgz".to_string(),
            integrity: "sha256-x".to_string(),
            files: HashMap::new(),
            manifest: serde_json::json!({"name": name, "version": version}),
            total_size: size,
            cached_at: now,
            last_used: now,
        }
    }

    #[test]
    fn lru_evicts_oldest_first() {
        let cache = PackageCache::with_limits(Duration::from_secs(3600), None, 2, u64::MAX);
        cache.set(make_pkg("a", "1.0.0", 10));
        cache.set(make_pkg("b", "1.0.0", 10));
        cache.set(make_pkg("c", "1.0.0", 10));
        assert!(cache.get("a", "1.0.0").is_none());
        assert!(cache.get("b", "1.0.0").is_some());
        assert!(cache.get("c", "1.0.0").is_some());
    }

    #[test]
    fn accessing_an_entry_protects_it_from_eviction() {
        let cache = PackageCache::with_limits(Duration::from_secs(3600), None, 2, u64::MAX);
        cache.set(make_pkg("a", "1.0.0", 10));
        cache.set(make_pkg("b", "1.0.0", 10));
        assert!(cache.get("a", "1.0.0").is_some());
        cache.set(make_pkg("c", "1.0.0", 10));
        assert!(cache.get("b", "1.0.0").is_none());
        assert!(cache.get("a", "1.0.0").is_some());
        assert!(cache.get("c", "1.0.0").is_some());
    }

    #[test]
    fn ttl_expiry_is_checked_lazily() {
        let cache = PackageCache::with_limits(Duration::from_millis(1), None, 10, u64::MAX);
        cache.set(make_pkg("a", "1.0.0", 10));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("a", "1.0.0").is_none());
    }

    #[test]
    fn scoped_package_key_escapes_slash() {
        assert_eq!(cache_key("@scope/name", "1.0.0"), "@scope__name@1.0.0");
    }

    #[test]
    fn persistent_miss_promotes_into_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        let key = cache_key("a", "1.0.0");
        let persisted = to_persisted(&make_pkg("a", "1.0.0", 10));
        store.set(&key, serde_json::to_vec(&persisted).unwrap()).unwrap();

        let cache = PackageCache::new(Duration::from_secs(3600), Some(Box::new(store)));
        let pkg = cache.get("a", "1.0.0").unwrap();
        assert_eq!(pkg.version, "1.0.0");
        assert_eq!(cache.stats().entries, 1);
    }
}
