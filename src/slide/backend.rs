//! Interfaces between the tile resolver and whatever decodes slide files.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;

use crate::error::{BackendError, IoError};
use crate::io::RangeReader;

/// An opened multi-resolution slide.
///
/// All methods are synchronous and may block on storage. Callers run them on
/// the blocking pool.
pub trait PyramidImage: Send + Sync {
    /// Full-resolution (level 0) width and height in pixels.
    fn dimensions(&self) -> (u64, u64);

    /// Downsample factor of each level, level 0 first.
    fn level_downsamples(&self) -> &[f64];

    /// Free-form key/value metadata.
    fn properties(&self) -> &BTreeMap<String, String>;

    /// Names of embedded auxiliary images (`label`, `thumbnail`, ...).
    fn associated_image_names(&self) -> Vec<String>;

    /// Decode `size` pixels of `level` starting at `location`.
    ///
    /// `location` is given in level-0 coordinates, `size` in pixels of the
    /// requested level. Pixels outside the image are transparent black.
    fn read_region(
        &self,
        location: (u64, u64),
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbaImage, BackendError>;

    /// Decode a named associated image.
    fn read_associated_image(&self, name: &str) -> Result<RgbaImage, BackendError>;
}

/// Opens slides by image identifier.
#[async_trait]
pub trait PyramidBackend: Send + Sync {
    async fn open(&self, image_id: &str) -> Result<Arc<dyn PyramidImage>, BackendError>;
}

/// Creates range readers for storage keys.
///
/// Lets the TIFF backend work against S3, or an in-memory store in tests,
/// without knowing which.
#[async_trait]
pub trait SlideSource: Send + Sync {
    type Reader: RangeReader + 'static;

    async fn create_reader(&self, key: &str) -> Result<Self::Reader, IoError>;
}
