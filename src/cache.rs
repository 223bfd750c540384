//! Per-run file content cache using moka.
//!
//! Bounded entry count, TTL expiry, and an mtime check on every lookup so an
//! entry for a file changed on disk is never served.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use moka::sync::Cache;
use serde::Serialize;
use tracing::debug;

use crate::blocks::read_bounded;
use crate::error::ExtractError;

#[derive(Clone)]
struct CachedFile {
    content: Arc<String>,
    size: u64,
    modified: Option<SystemTime>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// File contents keyed by path. Created per run and dropped with it.
pub struct FileCache {
    cache: Cache<PathBuf, CachedFile>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Read a file through the cache, refusing files above `max_size` bytes.
    pub fn read(&self, path: &Path, max_size: u64) -> Result<Arc<String>, ExtractError> {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();

        if let Some(cached) = self.cache.get(path) {
            if cached.modified == modified {
                if cached.size > max_size {
                    return Err(ExtractError::TooLarge {
                        path: path.to_path_buf(),
                        size: cached.size,
                        limit: max_size,
                    });
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached.content);
            }
            debug!(path = %path.display(), "cached entry is stale");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let content = Arc::new(read_bounded(path, max_size)?);
        self.cache.insert(
            path.to_path_buf(),
            CachedFile {
                content: Arc::clone(&content),
                size: content.len() as u64,
                modified,
            },
        );
        Ok(content)
    }

    pub fn invalidate(&self, path: &Path) {
        self.cache.invalidate(path);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_read_is_a_hit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "hello").unwrap();

        let cache = FileCache::default();
        assert_eq!(cache.read(&path, 1024).unwrap().as_str(), "hello");
        assert_eq!(cache.read(&path, 1024).unwrap().as_str(), "hello");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalidate_forces_reread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "before").unwrap();

        let cache = FileCache::default();
        cache.read(&path, 1024).unwrap();
        fs::write(&path, "after").unwrap();
        cache.invalidate(&path);

        assert_eq!(cache.read(&path, 1024).unwrap().as_str(), "after");
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_size_limit_applies_to_cached_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "0123456789").unwrap();

        let cache = FileCache::default();
        cache.read(&path, 1024).unwrap();
        let err = cache.read(&path, 5).unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { size: 10, limit: 5, .. }));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let cache = FileCache::default();
        assert!(cache.read(Path::new("/no/such/file.md"), 1024).is_err());
    }
}
