//! Per-serial Bronze-path cache.
//!
//! A fixed-capacity LRU keyed by serial label. Entries remember a fingerprint
//! of each Silver file they were read from so that an injected
//! [`StalenessCheck`] can reject them when the files change underneath, or
//! when the catalog starts listing different Silver files for the label.

use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::debug;

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Modification time and size of a Silver file when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilverFingerprint {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
    pub len: Option<u64>,
}

impl SilverFingerprint {
    pub fn capture(path: &Path) -> Self {
        let meta = std::fs::metadata(path).ok();
        Self {
            path: path.to_path_buf(),
            modified: meta.as_ref().and_then(|m| m.modified().ok()),
            len: meta.as_ref().map(|m| m.len()),
        }
    }
}

/// A cached lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPaths {
    pub paths: Arc<Vec<String>>,
    /// Silver files the paths were read from, in catalog order.
    pub sources: Vec<SilverFingerprint>,
}

impl CachedPaths {
    /// True when `listing` names exactly the Silver files this entry was
    /// built from, in the same order.
    pub fn matches_listing(&self, listing: &[String]) -> bool {
        listing.len() == self.sources.len()
            && listing
                .iter()
                .zip(&self.sources)
                .all(|(path, fp)| Path::new(path) == fp.path)
    }
}

/// Decides whether a cached entry may still be served.
pub trait StalenessCheck: Send + Sync {
    /// Whether [`is_stale`](Self::is_stale) needs the label's current Silver
    /// listing from the catalog. The lookup costs one catalog query per hit.
    fn wants_listing(&self) -> bool {
        false
    }

    /// `listing` is the catalog's current Silver paths for the entry's
    /// label, when [`wants_listing`](Self::wants_listing) asked for it.
    fn is_stale(&self, entry: &CachedPaths, listing: Option<&[String]>) -> bool;
}

/// Entries live until evicted or invalidated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStale;

impl StalenessCheck for NeverStale {
    fn is_stale(&self, _entry: &CachedPaths, _listing: Option<&[String]>) -> bool {
        false
    }
}

/// Entries go stale when the catalog lists a different set of Silver files
/// for the label, or when any source Silver file changed size or mtime, or
/// disappeared.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilverMtimeCheck;

impl StalenessCheck for SilverMtimeCheck {
    fn wants_listing(&self) -> bool {
        true
    }

    fn is_stale(&self, entry: &CachedPaths, listing: Option<&[String]>) -> bool {
        if listing.is_some_and(|listing| !entry.matches_listing(listing)) {
            return true;
        }
        entry
            .sources
            .iter()
            .any(|fp| SilverFingerprint::capture(&fp.path) != *fp)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

struct Inner {
    entries: LruCache<String, CachedPaths>,
    hits: u64,
    misses: u64,
}

pub struct BronzePathCache {
    inner: Mutex<Inner>,
    staleness: Box<dyn StalenessCheck>,
}

impl BronzePathCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_staleness_check(capacity, NeverStale)
    }

    /// A capacity of zero is raised to one.
    pub fn with_staleness_check(capacity: usize, check: impl StalenessCheck + 'static) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
            staleness: Box::new(check),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether lookups should pass the catalog's current Silver listing to
    /// [`get_checked`](Self::get_checked).
    pub fn wants_listing(&self) -> bool {
        self.staleness.wants_listing()
    }

    /// Look up `key`, promoting it to most recently used.
    pub fn get(&self, key: &str) -> Option<CachedPaths> {
        self.get_checked(key, None)
    }

    /// Look up `key`, validating the entry against `listing` when given.
    ///
    /// A stale entry is dropped and reported as a miss.
    pub fn get_checked(&self, key: &str, listing: Option<&[String]>) -> Option<CachedPaths> {
        let found = self.lock().entries.get(key).cloned();

        let Some(entry) = found else {
            self.lock().misses += 1;
            return None;
        };

        if self.staleness.is_stale(&entry, listing) {
            let mut inner = self.lock();
            if inner.entries.peek(key) == Some(&entry) {
                inner.entries.pop(key);
            }
            inner.misses += 1;
            debug!(key, "Dropped stale Bronze-path cache entry");
            return None;
        }

        self.lock().hits += 1;
        Some(entry)
    }

    pub fn insert(&self, key: String, entry: CachedPaths) {
        let mut inner = self.lock();
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry) {
            if evicted != key {
                debug!(key = %evicted, "Evicted Bronze-path cache entry");
            }
        }
    }

    /// Drop one entry. Returns true when it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().entries.pop(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
            capacity: inner.entries.cap().get(),
        }
    }
}

impl Default for BronzePathCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
