//! Operation cache.
//!
//! Results of pure operations are memoised in a process-wide table so that
//! repeating an operation on the same inputs returns the already-built image.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed** on the operation, not on pixels: a key
//! is the SHA-256 of the operation name, the ids of the input images and the
//! rendered parameters. Native images are immutable and ids are never reused,
//! so an id stands in for the image's content.
//!
//! File loads use a second key shape, SHA-256 of (path, size, mtime, import
//! parameters), and count against `max_cache_files` instead of the operation
//! entry limit. A file that changes on disk gets a new key.
//!
//! ## Bounds
//!
//! Entries are evicted least-recently-used first whenever the entry count,
//! the pixel memory or the file-entry count exceeds the configured limit.
//! An image larger than the memory limit is never cached.

use super::RawImage;
use crate::config::Config;
use crate::logging::{log_debug, log_info};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// Cache bounds taken from the runtime [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Limits {
    pub max_entries: usize,
    pub max_mem: u64,
    pub max_files: usize,
    pub trace: bool,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            max_entries: config.max_cache_size,
            max_mem: config.max_cache_mem,
            max_files: config.max_cache_files,
            trace: config.cache_trace,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits::from(&Config::default())
    }
}

struct Entry {
    name: &'static str,
    image: Arc<RawImage>,
    /// Encoded bytes a file load decoded from.
    source: Option<Arc<[u8]>>,
    bytes: u64,
    last_used: u64,
    file: bool,
}

#[derive(Default)]
struct OperationCache {
    limits: Limits,
    entries: HashMap<String, Entry>,
    tick: u64,
    mem: u64,
    files: usize,
    stats: CacheStats,
}

impl OperationCache {
    fn get(&mut self, key: &str) -> Option<Arc<RawImage>> {
        self.fetch(key).map(|(image, _)| image)
    }

    fn fetch(&mut self, key: &str) -> Option<(Arc<RawImage>, Option<Arc<[u8]>>)> {
        self.tick += 1;
        let tick = self.tick;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = tick;
                self.stats.hit();
                if self.limits.trace {
                    log_debug!("cache hit: {} {}", entry.name, &key[..12]);
                }
                Some((Arc::clone(&entry.image), entry.source.clone()))
            }
            None => {
                self.stats.miss();
                if self.limits.trace {
                    log_debug!("cache miss: {}", &key[..12.min(key.len())]);
                }
                None
            }
        }
    }

    fn insert(&mut self, key: String, name: &'static str, image: Arc<RawImage>, file: bool) {
        self.admit(key, name, image, None, file);
    }

    fn admit(&mut self, key: String, name: &'static str, image: Arc<RawImage>, source: Option<Arc<[u8]>>, file: bool) {
        let bytes = image.bytes() + source.as_ref().map_or(0, |s| s.len() as u64);
        let admissible = if file {
            self.limits.max_files > 0
        } else {
            self.limits.max_entries > 0
        };
        if !admissible || bytes > self.limits.max_mem {
            return;
        }

        self.tick += 1;
        if let Some(old) = self.entries.insert(
            key,
            Entry {
                name,
                image,
                source,
                bytes,
                last_used: self.tick,
                file,
            },
        ) {
            self.forget(&old);
        }
        self.mem += bytes;
        if file {
            self.files += 1;
        }
        self.evict();
    }

    fn forget(&mut self, entry: &Entry) {
        self.mem -= entry.bytes;
        if entry.file {
            self.files -= 1;
        }
    }

    fn op_entries(&self) -> usize {
        self.entries.len() - self.files
    }

    fn evict(&mut self) {
        loop {
            let files_over = self.files > self.limits.max_files;
            let ops_over = self.op_entries() > self.limits.max_entries;
            if !files_over && !ops_over && self.mem <= self.limits.max_mem {
                return;
            }
            // Trim whichever class is over its count limit, else anything
            let victim = self
                .entries
                .iter()
                .filter(|(_, e)| match (files_over, ops_over) {
                    (true, false) => e.file,
                    (false, true) => !e.file,
                    _ => true,
                })
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            let Some(victim) = victim else {
                return;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                if self.limits.trace {
                    log_debug!("cache evict: {} {}", entry.name, &victim[..12]);
                }
                self.forget(&entry);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.mem = 0;
        self.files = 0;
    }
}

static CACHE: LazyLock<Mutex<OperationCache>> =
    LazyLock::new(|| Mutex::new(OperationCache::default()));

fn lock() -> MutexGuard<'static, OperationCache> {
    CACHE.lock().unwrap_or_else(|e| e.into_inner())
}

/// Apply new bounds, evicting whatever no longer fits.
pub(crate) fn configure(limits: Limits) {
    let mut cache = lock();
    cache.limits = limits;
    cache.evict();
}

/// SHA-256 key of an operation, returned as a hex string.
pub(crate) fn key(name: &str, inputs: impl IntoIterator<Item = u64>, params: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"op\0");
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    for id in inputs {
        hasher.update(id.to_le_bytes());
    }
    hasher.update(b"\0");
    hasher.update(params.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 key of a file load.
pub(crate) fn file_key(path: &Path, len: u64, modified: Option<SystemTime>, params: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"file\0");
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(b"\0");
    hasher.update(len.to_le_bytes());
    match modified.and_then(|m| m.duration_since(UNIX_EPOCH).ok()) {
        Some(d) => {
            hasher.update(b"\x01");
            hasher.update(d.as_nanos().to_le_bytes());
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    hasher.update(params.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn get(key: &str) -> Option<Arc<RawImage>> {
    lock().get(key)
}

pub(crate) fn insert(key: String, name: &'static str, image: Arc<RawImage>) {
    lock().insert(key, name, image, false);
}

/// A cached file decode and the encoded bytes it came from.
pub(crate) fn get_file(key: &str) -> Option<(Arc<RawImage>, Option<Arc<[u8]>>)> {
    lock().fetch(key)
}

/// Cache a file decode. `source` is kept alive with the entry and counts
/// against the memory bound.
pub(crate) fn insert_file(key: String, image: Arc<RawImage>, source: Arc<[u8]>) {
    lock().admit(key, "load", image, Some(source), true);
}

pub(crate) fn clear() {
    let mut cache = lock();
    let dropped = cache.entries.len();
    cache.clear();
    if dropped > 0 {
        log_debug!("cache cleared, {dropped} entries dropped");
    }
}

/// Log every entry, oldest first.
pub(crate) fn print() {
    let cache = lock();
    let mut entries: Vec<_> = cache.entries.iter().collect();
    entries.sort_by_key(|(_, e)| e.last_used);
    log_info!(
        "cache: {} entries, {} bytes ({})",
        entries.len(),
        cache.mem,
        cache.stats
    );
    for (key, entry) in entries {
        log_info!(
            "  {} {} {}{}",
            &key[..12],
            entry.name,
            entry.image.describe(),
            if entry.file { " [file]" } else { "" }
        );
    }
}

/// Hit and miss counters since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} hits, {} misses ({} lookups)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} misses", self.misses)
        }
    }
}
