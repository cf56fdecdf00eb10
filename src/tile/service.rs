//! Tile resolver.
//!
//! Implements the four IIIF-shaped operations (info, properties, associated
//! images, tiles) on top of the slide handle cache and the color transform
//! cache.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            tile()                                │
//! │  1. parse region       5. decode window     (blocking pool)      │
//! │  2. check TileCache    6. resample to T×T                        │
//! │  3. resolve slide      7. color transform                        │
//! │  4. select level       8. RGB → JPEG, cache, return              │
//! └──────────────────────────────────────────────────────────────────┘
//!        │                     │                      │
//!        ▼                     ▼                      ▼
//!   ┌───────────┐      ┌──────────────┐     ┌─────────────────────┐
//!   │ TileCache │      │  SlideCache  │     │ ColorTransformCache │
//!   └───────────┘      └──────────────┘     └─────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::color::{ColorTransform, ColorTransformCache};
use crate::error::TileError;
use crate::slide::{PyramidBackend, PyramidImage, SlideCache, SlideHandle};

use super::cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
use super::encoder::{JpegTileEncoder, DEFAULT_JPEG_QUALITY};
use super::level::{requested_downsample, select_level, source_window};
use super::region::Region;

/// Default output tile side in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 720;

/// Largest source window, in output tiles per side, a request may decode.
pub const MAX_WINDOW_TILES: u64 = 8;

pub const IIIF_CONTEXT: &str = "http://iiif.io/api/image/2/context.json";
pub const IIIF_PROTOCOL: &str = "http://iiif.io/api/image";
pub const IIIF_PROFILE: &str = "http://iiif.io/api/image/2/level2.json";
pub const IIIF_TYPE: &str = "ImageService3";

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// IIIF image information document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub protocol: String,
    pub profile: Vec<String>,
    pub width: u64,
    pub height: u64,
    pub tiles: Vec<TileInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileInfo {
    pub width: u32,
    pub scale_factors: Vec<u64>,
}

/// An encoded image ready to send.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub data: Bytes,
    pub content_type: &'static str,
    pub cache_hit: bool,
    pub quality: u8,
}

/// Whether `image_id` is a non-empty run of ASCII letters, digits and `_`.
pub fn is_valid_image_id(image_id: &str) -> bool {
    !image_id.is_empty()
        && image_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn validate_image_id(image_id: &str) -> Result<(), TileError> {
    if is_valid_image_id(image_id) {
        Ok(())
    } else {
        Err(TileError::InvalidImageId {
            image_id: image_id.to_string(),
        })
    }
}

pub struct TileService<B> {
    slides: Arc<SlideCache<B>>,
    transforms: Arc<ColorTransformCache>,
    cache: TileCache,
    encoder: JpegTileEncoder,
    tile_size: u32,
    api_url: Url,
}

impl<B: PyramidBackend + 'static> TileService<B> {
    pub fn new(slides: SlideCache<B>, transforms: ColorTransformCache, api_url: Url) -> Self {
        Self {
            slides: Arc::new(slides),
            transforms: Arc::new(transforms),
            cache: TileCache::with_capacity(DEFAULT_TILE_CACHE_CAPACITY),
            encoder: JpegTileEncoder::new(DEFAULT_JPEG_QUALITY),
            tile_size: DEFAULT_TILE_SIZE,
            api_url,
        }
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size.max(1);
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.encoder = JpegTileEncoder::new(quality);
        self
    }

    pub fn with_cache_capacity(mut self, bytes: usize) -> Self {
        self.cache = TileCache::with_capacity(bytes);
        self
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.encoder.quality()
    }

    pub fn slides(&self) -> &SlideCache<B> {
        &self.slides
    }

    pub fn transforms(&self) -> &ColorTransformCache {
        &self.transforms
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    async fn resolve(&self, image_id: &str) -> Result<Arc<SlideHandle>, TileError> {
        validate_image_id(image_id)?;
        self.slides.resolve(image_id).await
    }

    /// IIIF info document: size, tile width and rounded per-level scale
    /// factors. No pixels are decoded.
    pub async fn info(&self, image_id: &str) -> Result<ImageInfo, TileError> {
        let slide = self.resolve(image_id).await?;
        let (width, height) = slide.dimensions();

        let id = self
            .api_url
            .join(image_id)
            .map_err(|e| TileError::Internal {
                message: format!("cannot build image URL: {}", e),
            })?;

        Ok(ImageInfo {
            context: IIIF_CONTEXT.to_string(),
            id: id.to_string(),
            kind: IIIF_TYPE.to_string(),
            protocol: IIIF_PROTOCOL.to_string(),
            profile: vec![IIIF_PROFILE.to_string()],
            width,
            height,
            tiles: vec![TileInfo {
                width: self.tile_size,
                scale_factors: slide
                    .downsamples()
                    .iter()
                    .map(|d| d.round() as u64)
                    .collect(),
            }],
        })
    }

    /// The slide's property map, verbatim.
    pub async fn properties(&self, image_id: &str) -> Result<BTreeMap<String, String>, TileError> {
        let slide = self.resolve(image_id).await?;
        Ok(slide.properties().clone())
    }

    /// An embedded auxiliary image (`label`, `thumbnail`) as JPEG.
    ///
    /// No color management: associated images are rendering-ready.
    pub async fn associated_image(
        &self,
        image_id: &str,
        name: &str,
    ) -> Result<TileResponse, TileError> {
        validate_image_id(image_id)?;

        // Associated images do not depend on the tile size
        let key = TileCacheKey::new(image_id, name, 0, self.encoder.quality());
        if let Some(data) = self.cache.get(&key).await {
            return Ok(self.response(data, true));
        }

        let slide = self.resolve(image_id).await?;
        if !slide.has_associated_image(name) {
            return Err(TileError::AssociatedImageNotFound {
                image_id: image_id.to_string(),
                name: name.to_string(),
            });
        }

        let image = slide.image();
        let encoder = self.encoder;
        let (owned_id, owned_name) = (image_id.to_string(), name.to_string());
        let data = tokio::task::spawn_blocking(move || {
            let pixels = image
                .read_associated_image(&owned_name)
                .map_err(|source| TileError::ImageRead {
                    image_id: owned_id,
                    source,
                })?;
            encoder.encode(pixels)
        })
        .await
        .map_err(join_error)??;

        self.cache.put(key, data.clone()).await;
        Ok(self.response(data, false))
    }

    /// Render the tile covering `region` (`x,y,w,h` in level-0 pixels).
    pub async fn tile(&self, image_id: &str, region: &str) -> Result<TileResponse, TileError> {
        validate_image_id(image_id)?;
        let region = Region::parse(region)?;

        let key = TileCacheKey::new(
            image_id,
            region.to_string(),
            self.tile_size,
            self.encoder.quality(),
        );
        if let Some(data) = self.cache.get(&key).await {
            return Ok(self.response(data, true));
        }

        let requested = requested_downsample(region.width, region.height, self.tile_size);
        let slide = self.slides.resolve(image_id).await?;
        let level = select_level(slide.downsamples(), requested as f64);
        let window = source_window(self.tile_size, requested, slide.downsamples()[level]).max(1);

        let max_window = MAX_WINDOW_TILES * u64::from(self.tile_size);
        if window > max_window {
            return Err(TileError::RegionTooLarge {
                input: region.to_string(),
                window,
                max: max_window,
            });
        }

        let transform = self
            .transforms
            .get_transform(slide.icc_profile_name())
            .await?;

        debug!(
            image_id,
            region = %region,
            requested,
            level,
            window,
            color_transform = transform.is_some(),
            "Rendering tile"
        );

        let job = RenderJob {
            image: slide.image(),
            image_id: image_id.to_string(),
            location: (region.x, region.y),
            level,
            // Bounded by max_window above
            window: window as u32,
            tile_size: self.tile_size,
            transform,
            encoder: self.encoder,
        };
        let data = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(join_error)??;

        self.cache.put(key, data.clone()).await;
        Ok(self.response(data, false))
    }

    fn response(&self, data: Bytes, cache_hit: bool) -> TileResponse {
        TileResponse {
            data,
            content_type: JPEG_CONTENT_TYPE,
            cache_hit,
            quality: self.encoder.quality(),
        }
    }
}

/// Everything the blocking half of a tile request needs.
struct RenderJob {
    image: Arc<dyn PyramidImage>,
    image_id: String,
    location: (u64, u64),
    level: usize,
    window: u32,
    tile_size: u32,
    transform: Option<Arc<dyn ColorTransform>>,
    encoder: JpegTileEncoder,
}

impl RenderJob {
    fn run(self) -> Result<Bytes, TileError> {
        let mut block = self
            .image
            .read_region(self.location, self.level, (self.window, self.window))
            .map_err(|source| TileError::ImageRead {
                image_id: self.image_id.clone(),
                source,
            })?;

        if block.dimensions() != (self.tile_size, self.tile_size) {
            block = imageops::resize(&block, self.tile_size, self.tile_size, FilterType::Lanczos3);
        }

        if let Some(transform) = &self.transform {
            transform.apply(&mut block)?;
        }

        self.encoder.encode(block)
    }
}

fn join_error(err: tokio::task::JoinError) -> TileError {
    TileError::Internal {
        message: format!("render task failed: {}", err),
    }
}
