//! Slide handle cache.
//!
//! Opening a slide means fetching and parsing its directory structure over
//! the network. The cache keeps opened handles in an LRU so that the many
//! tile requests a viewer issues against one slide pay that cost once.
//!
//! A miss opens the slide under a per-identifier single flight: concurrent
//! requests for the same unseen slide wait for one open and share its
//! outcome. Only a fully constructed handle is ever inserted, so a failed
//! open leaves no trace and the next request simply tries again.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::TileError;
use crate::singleflight::SingleFlight;

use super::backend::PyramidBackend;
use super::handle::SlideHandle;

/// Default number of open slides kept.
pub const DEFAULT_SLIDE_CAPACITY: usize = 100;

pub struct SlideCache<B> {
    backend: B,
    cache: RwLock<LruCache<String, Arc<SlideHandle>>>,
    in_flight: SingleFlight<String, Result<Arc<SlideHandle>, TileError>>,
}

impl<B: PyramidBackend> SlideCache<B> {
    pub fn new(backend: B) -> Self {
        Self::with_capacity(backend, DEFAULT_SLIDE_CAPACITY)
    }

    pub fn with_capacity(backend: B, capacity: usize) -> Self {
        Self {
            backend,
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: SingleFlight::new(),
        }
    }

    /// Return the handle for `image_id`, opening the slide on a miss.
    ///
    /// Any backend failure surfaces as [`TileError::NotFound`].
    pub async fn resolve(&self, image_id: &str) -> Result<Arc<SlideHandle>, TileError> {
        if let Some(handle) = self.cache.write().await.get(image_id) {
            return Ok(Arc::clone(handle));
        }

        self.in_flight
            .run(image_id.to_string(), || self.open(image_id))
            .await
    }

    async fn open(&self, image_id: &str) -> Result<Arc<SlideHandle>, TileError> {
        // A flight that finished just before ours may have inserted it
        if let Some(handle) = self.cache.write().await.get(image_id) {
            return Ok(Arc::clone(handle));
        }

        let not_found = |source| TileError::NotFound {
            image_id: image_id.to_string(),
            source,
        };

        let image = self.backend.open(image_id).await.map_err(not_found)?;
        let handle = Arc::new(SlideHandle::new(image_id, image).map_err(not_found)?);

        info!(
            image_id,
            width = handle.dimensions().0,
            height = handle.dimensions().1,
            levels = handle.level_count(),
            "Opened slide"
        );

        if let Some((evicted, _)) = self
            .cache
            .write()
            .await
            .push(image_id.to_string(), Arc::clone(&handle))
        {
            if evicted != image_id {
                debug!(image_id = %evicted, "Evicted slide handle");
            }
        }

        Ok(handle)
    }

    /// Whether a handle for `image_id` is cached.
    pub async fn contains(&self, image_id: &str) -> bool {
        self.cache.read().await.contains(image_id)
    }

    /// Drop the cached handle for `image_id`, if any.
    pub async fn invalidate(&self, image_id: &str) {
        self.cache.write().await.pop(image_id);
    }

    /// Number of cached handles.
    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
