//! Region read cache.
//!
//! The rebuild loop re-reads the same regions constantly: the coarsest usable
//! level covers the whole image and its read position never moves, and small
//! reference drifts below the staleness threshold re-request identical finer
//! regions. This cache sits between the builder and the source so those
//! repeats cost a map lookup instead of a decode.
//!
//! Eviction is LRU bounded by total pixel bytes, with an entry-count bound to
//! keep LRU bookkeeping itself cheap.

use std::num::NonZeroUsize;

use lru::LruCache;
use tokio::sync::Mutex;

use crate::source::pixel::PixelBlock;

/// Default cache capacity: 256MB of decoded pixels.
pub const DEFAULT_REGION_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Default maximum number of entries.
const DEFAULT_MAX_ENTRIES: usize = 1024;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for a region read.
///
/// A region is identified by its level, level-0 position, and level-local
/// size; any of them changing means different pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionKey {
    /// Pyramid level the region was read from
    pub level: usize,

    /// Top-left corner in level-0 coordinates
    pub x: i64,
    pub y: i64,

    /// Region size in level-local pixels
    pub width: u32,
    pub height: u32,
}

impl RegionKey {
    /// Create a key from a read-region call's arguments.
    pub fn new(position: (i64, i64), level: usize, size: (u32, u32)) -> Self {
        Self {
            level,
            x: position.0,
            y: position.1,
            width: size.0,
            height: size.1,
        }
    }
}

// =============================================================================
// Region Cache
// =============================================================================

struct Inner {
    entries: LruCache<RegionKey, PixelBlock>,
    bytes: usize,
}

/// LRU cache for decoded regions with byte-size eviction.
///
/// Thread-safe; shared across fetch workers via `Arc`. Lock scope is the map
/// operation only, never a fetch.
pub struct RegionCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
}

impl RegionCache {
    /// Create a cache with the default capacity (256MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REGION_CACHE_CAPACITY)
    }

    /// Create a cache bounded to `max_bytes` of decoded pixel data.
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(
                    NonZeroUsize::new(DEFAULT_MAX_ENTRIES).expect("non-zero entry bound"),
                ),
                bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Look up a region, marking it recently used.
    pub async fn get(&self, key: &RegionKey) -> Option<PixelBlock> {
        let mut inner = self.inner.lock().await;
        inner.entries.get(key).cloned()
    }

    /// Insert a region, evicting least-recently-used entries past capacity.
    pub async fn put(&self, key: RegionKey, block: PixelBlock) {
        let added = block.byte_len();
        let mut inner = self.inner.lock().await;

        if let Some(old) = inner.entries.peek(&key) {
            let old_len = old.byte_len();
            inner.bytes = inner.bytes.saturating_sub(old_len);
        }
        inner.entries.put(key, block);
        inner.bytes += added;

        while inner.bytes > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.bytes = inner.bytes.saturating_sub(evicted.byte_len());
                }
                None => break,
            }
        }
    }

    /// Drop every entry. Called when a new image is loaded.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.bytes = 0;
    }

    /// Number of cached regions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether the cache holds no regions.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current total size of cached pixels in bytes.
    pub async fn bytes(&self) -> usize {
        self.inner.lock().await.bytes
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_bytes
    }
}

impl Default for RegionCache {
    fn default() -> Self {
        Self::new()
    }
}
