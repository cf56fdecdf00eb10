use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::RwLock;

use super::{check_range, RangeReader};
use crate::error::IoError;
use crate::singleflight::SingleFlight;

/// Default block size: 256KB.
///
/// Large enough to amortize S3 latency, small enough not to waste bandwidth
/// when the decoder only needs a tile or two.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default cache capacity in number of blocks (100 * 256KB = 25.6MB).
pub const DEFAULT_BLOCK_CAPACITY: usize = 100;

/// Block-based caching layer that wraps any RangeReader.
///
/// TIFF decoding issues many small reads at scattered offsets (IFD entries,
/// tile offset tables, then the tiles themselves). Without caching each one
/// would be a separate S3 request. Reads are rounded out to fixed-size blocks,
/// blocks are kept in an LRU, and concurrent requests for the same block share
/// a single fetch.
pub struct BlockCache<R> {
    inner: Arc<R>,
    block_size: usize,
    cache: RwLock<LruCache<u64, Bytes>>,
    in_flight: SingleFlight<u64, Result<Bytes, IoError>>,
}

impl<R: RangeReader> BlockCache<R> {
    /// Wrap `inner` with the default block size and capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_CAPACITY)
    }

    /// Wrap `inner` with a custom block size and capacity.
    ///
    /// Zero values are bumped to one.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        Self {
            inner: Arc::new(inner),
            block_size: block_size.max(1),
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: SingleFlight::new(),
        }
    }

    /// Number of blocks currently cached.
    pub async fn cached_blocks(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        if let Some(data) = self.cache.read().await.peek(&block_idx) {
            return Ok(data.clone());
        }

        self.in_flight
            .run(block_idx, || async move {
                // A flight that finished just before ours may have filled it
                if let Some(data) = self.cache.write().await.get(&block_idx) {
                    return Ok(data.clone());
                }

                let data = self.fetch_block_from_source(block_idx).await?;
                self.cache.write().await.put(block_idx, data.clone());
                Ok(data)
            })
            .await
    }

    async fn fetch_block_from_source(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let offset = block_idx * self.block_size as u64;
        let size = self.inner.size();

        // The last block may be short
        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: self.block_size as u64,
                size,
            });
        }

        let len = remaining.min(self.block_size as u64) as usize;
        self.inner.read_exact_at(offset, len).await
    }

    #[inline]
    fn block_for_offset(&self, offset: u64) -> u64 {
        offset / self.block_size as u64
    }

    #[inline]
    fn offset_within_block(&self, offset: u64) -> usize {
        (offset % self.block_size as u64) as usize
    }
}

#[async_trait]
impl<R: RangeReader + 'static> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.inner.size())?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let start_block = self.block_for_offset(offset);
        let end_block = self.block_for_offset(offset + len as u64 - 1);

        if start_block == end_block {
            let block = self.get_block(start_block).await?;
            let block_offset = self.offset_within_block(offset);
            return Ok(block.slice(block_offset..block_offset + len));
        }

        let mut result = BytesMut::with_capacity(len);
        let mut remaining = len;
        let mut current_offset = offset;

        for block_idx in start_block..=end_block {
            let block = self.get_block(block_idx).await?;
            let block_offset = self.offset_within_block(current_offset);
            let take = (block.len() - block_offset).min(remaining);

            result.extend_from_slice(&block[block_offset..block_offset + take]);
            remaining -= take;
            current_offset += take as u64;
        }

        Ok(result.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
