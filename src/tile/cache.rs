//! Cache for encoded output images.
//!
//! Viewers request the same tiles over and over while panning. Encoded JPEGs
//! are kept in an LRU bounded by total bytes, so repeated requests skip the
//! decode, resample, color correction and encode steps entirely.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default cache capacity: 100MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Bounds LRU bookkeeping when entries are tiny
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Identifies one encoded output.
///
/// `resource` is the normalized region (`x,y,w,h`) for tiles or the
/// associated image name. Tile size and quality are part of the key so that
/// a configuration change never serves stale bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub image_id: Arc<str>,
    pub resource: Arc<str>,
    pub tile_size: u32,
    pub quality: u8,
}

impl TileCacheKey {
    pub fn new(
        image_id: impl Into<Arc<str>>,
        resource: impl Into<Arc<str>>,
        tile_size: u32,
        quality: u8,
    ) -> Self {
        Self {
            image_id: image_id.into(),
            resource: resource.into(),
            tile_size,
            quality,
        }
    }
}

struct Inner {
    entries: LruCache<TileCacheKey, Bytes>,
    size: usize,
}

/// LRU of encoded images with a byte budget.
pub struct TileCache {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl TileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Cache holding at most `max_size` bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)),
                size: 0,
            }),
            max_size,
        }
    }

    /// Look up an entry, marking it recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        self.inner.lock().await.entries.get(key).cloned()
    }

    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        self.inner.lock().await.entries.contains(key)
    }

    /// Store an entry, evicting least-recently-used ones until the byte
    /// budget holds. Entries larger than the whole budget are not stored.
    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        if data.len() > self.max_size {
            return;
        }

        let mut inner = self.inner.lock().await;
        let data_size = data.len();

        if let Some(old_len) = inner.entries.peek(&key).map(Bytes::len) {
            inner.size = inner.size.saturating_sub(old_len);
        }
        // The entry-count bound can push out the LRU entry on its own
        if let Some((evicted_key, evicted)) = inner.entries.push(key.clone(), data) {
            if evicted_key != key {
                inner.size = inner.size.saturating_sub(evicted.len());
            }
        }
        inner.size += data_size;

        while inner.size > self.max_size {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => inner.size = inner.size.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    pub async fn remove(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut inner = self.inner.lock().await;
        let data = inner.entries.pop(key)?;
        inner.size = inner.size.saturating_sub(data.len());
        Some(data)
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.size = 0;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Total bytes currently cached.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}
