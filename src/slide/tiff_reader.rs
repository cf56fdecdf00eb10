//! TIFF-family pyramid backend (Aperio SVS and generic tiled TIFF).
//!
//! # Layout
//!
//! A pyramidal slide is a multi-directory TIFF:
//!
//! - **Directory 0**: full-resolution image, tiled
//! - **Further tiled directories**: reduced-resolution levels
//! - **Stripped directories**: associated images. Aperio writes the
//!   thumbnail second and tags the label and macro images in their
//!   ImageDescription.
//!
//! Decoding is delegated to the `tiff` crate over a [`BlockingReader`], so
//! every directory walk and tile fetch becomes a cached range read. Each
//! level owns its own decoder, which lets different levels decode in
//! parallel while tiles of one level are read one at a time.

use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::{ColorType, TiffError};
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::{BackendError, IoError};
use crate::io::{
    BlockCache, BlockingReader, RangeReader, DEFAULT_BLOCK_CAPACITY, DEFAULT_BLOCK_SIZE,
};

use super::backend::{PyramidBackend, PyramidImage, SlideSource};
use super::properties::{slide_properties, LevelProperties};

/// Upper bound on directories walked, guards against IFD loops.
const MAX_DIRECTORIES: usize = 64;

// =============================================================================
// Backend
// =============================================================================

/// Opens slides stored as TIFF objects behind a [`SlideSource`].
///
/// The storage key of a slide is `[prefix/]<image id><extension>`.
pub struct TiffBackend<S> {
    source: S,
    prefix: Option<String>,
    extension: String,
    block_size: usize,
    block_capacity: usize,
}

impl<S: SlideSource> TiffBackend<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            prefix: None,
            extension: ".svs".to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            block_capacity: DEFAULT_BLOCK_CAPACITY,
        }
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Block size and number of cached blocks per open slide.
    pub fn with_block_cache(mut self, block_size: usize, capacity: usize) -> Self {
        self.block_size = block_size;
        self.block_capacity = capacity;
        self
    }

    /// Storage key for an image identifier.
    pub fn key_for(&self, image_id: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}{}", prefix, image_id, self.extension),
            None => format!("{}{}", image_id, self.extension),
        }
    }
}

#[async_trait]
impl<S: SlideSource> PyramidBackend for TiffBackend<S> {
    async fn open(&self, image_id: &str) -> Result<Arc<dyn PyramidImage>, BackendError> {
        let key = self.key_for(image_id);

        let reader = self
            .source
            .create_reader(&key)
            .await
            .map_err(|e| match e {
                IoError::NotFound(what) => BackendError::NotFound(what),
                other => BackendError::Io(other),
            })?;
        let identifier = reader.identifier().to_string();

        let cached = Arc::new(BlockCache::with_capacity(
            reader,
            self.block_size,
            self.block_capacity,
        ));
        let bridge = BlockingReader::new(cached, Handle::current());

        let slide = tokio::task::spawn_blocking(move || TiffSlide::open(bridge))
            .await
            .map_err(|e| BackendError::Decode(format!("open task failed: {}", e)))??;

        debug!(
            slide = %identifier,
            levels = slide.level_count(),
            associated = ?slide.associated_image_names(),
            "Parsed TIFF structure"
        );

        Ok(Arc::new(slide))
    }
}

// =============================================================================
// Slide
// =============================================================================

#[derive(Debug, Clone)]
struct Directory {
    index: usize,
    width: u32,
    height: u32,
    tiled: bool,
    description: Option<String>,
}

struct TiffLevel<R: Read + Seek> {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    decoder: Mutex<Decoder<R>>,
}

/// An opened TIFF slide.
pub struct TiffSlide<R: Read + Seek> {
    source: R,
    levels: Vec<TiffLevel<R>>,
    downsamples: Vec<f64>,
    properties: BTreeMap<String, String>,
    associated: BTreeMap<String, usize>,
}

impl<R: Read + Seek + Clone + Send> TiffSlide<R> {
    /// Walk every directory of the file and set up one decoder per level.
    pub fn open(source: R) -> Result<Self, BackendError> {
        let mut decoder = new_decoder(source.clone()).map_err(|e| match decode_error(e) {
            BackendError::Decode(message) => BackendError::Unsupported(message),
            other => other,
        })?;

        let mut directories = Vec::new();
        loop {
            directories.push(read_directory(&mut decoder, directories.len())?);
            if !decoder.more_images() || directories.len() >= MAX_DIRECTORIES {
                break;
            }
            decoder.next_image().map_err(decode_error)?;
        }

        // Directory 0 is always the base level, whatever its layout
        let mut level_dirs: Vec<&Directory> = directories
            .iter()
            .filter(|d| d.index == 0 || d.tiled)
            .collect();
        level_dirs.sort_by(|a, b| b.width.cmp(&a.width).then(a.index.cmp(&b.index)));

        let base = level_dirs
            .first()
            .ok_or_else(|| BackendError::InvalidPyramid("no image directories".to_string()))?;
        if base.width == 0 || base.height == 0 {
            return Err(BackendError::InvalidPyramid(format!(
                "base level has empty dimensions {}x{}",
                base.width, base.height
            )));
        }
        let (base_width, base_height) = (base.width, base.height);

        let mut levels = Vec::with_capacity(level_dirs.len());
        let mut downsamples = Vec::with_capacity(level_dirs.len());
        for dir in &level_dirs {
            if dir.width == 0 || dir.height == 0 {
                continue;
            }
            let decoder = decoder_at(&source, dir.index)?;
            let (tile_width, tile_height) = decoder.chunk_dimensions();
            downsamples.push(level_downsample(
                (base_width, base_height),
                (dir.width, dir.height),
            ));
            levels.push(TiffLevel {
                width: dir.width,
                height: dir.height,
                tile_width: tile_width.max(1),
                tile_height: tile_height.max(1),
                decoder: Mutex::new(decoder),
            });
        }

        let associated = directories
            .iter()
            .filter(|d| d.index != 0 && !d.tiled)
            .filter_map(|d| associated_name(d).map(|name| (name.to_string(), d.index)))
            .fold(BTreeMap::new(), |mut acc, (name, index)| {
                acc.entry(name).or_insert(index);
                acc
            });

        let level_properties: Vec<LevelProperties> = levels
            .iter()
            .zip(&downsamples)
            .map(|(level, &downsample)| LevelProperties {
                width: level.width,
                height: level.height,
                downsample,
                tile_width: level.tile_width,
                tile_height: level.tile_height,
            })
            .collect();
        let description = directories.first().and_then(|d| d.description.as_deref());
        let properties = slide_properties(description, &level_properties);

        Ok(Self {
            source,
            levels,
            downsamples,
            properties,
            associated,
        })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

impl<R: Read + Seek + Clone + Send + Sync> PyramidImage for TiffSlide<R> {
    fn dimensions(&self) -> (u64, u64) {
        self.levels
            .first()
            .map(|l| (l.width as u64, l.height as u64))
            .unwrap_or((0, 0))
    }

    fn level_downsamples(&self) -> &[f64] {
        &self.downsamples
    }

    fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    fn associated_image_names(&self) -> Vec<String> {
        self.associated.keys().cloned().collect()
    }

    fn read_region(
        &self,
        location: (u64, u64),
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbaImage, BackendError> {
        let tiff_level = self.levels.get(level).ok_or(BackendError::InvalidLevel {
            level,
            level_count: self.levels.len(),
        })?;
        let downsample = self.downsamples[level];

        let mut out = RgbaImage::new(size.0, size.1);

        // Window in level coordinates, clipped to the level
        let left = (location.0 as f64 / downsample).floor() as u64;
        let top = (location.1 as f64 / downsample).floor() as u64;
        if left >= tiff_level.width as u64 || top >= tiff_level.height as u64 {
            return Ok(out);
        }
        let right = left
            .saturating_add(size.0 as u64)
            .min(tiff_level.width as u64);
        let bottom = top
            .saturating_add(size.1 as u64)
            .min(tiff_level.height as u64);
        if left >= right || top >= bottom {
            return Ok(out);
        }

        let tile_width = tiff_level.tile_width as u64;
        let tile_height = tiff_level.tile_height as u64;
        let tiles_across = (tiff_level.width as u64).div_ceil(tile_width);

        let mut decoder = tiff_level
            .decoder
            .lock()
            .map_err(|_| BackendError::Decode("level decoder poisoned".to_string()))?;
        let channels = channels_for(decoder.colortype().map_err(decode_error)?)?;

        for tile_y in top / tile_height..=(bottom - 1) / tile_height {
            for tile_x in left / tile_width..=(right - 1) / tile_width {
                let index = u32::try_from(tile_y * tiles_across + tile_x)
                    .map_err(|_| BackendError::Decode("tile index overflow".to_string()))?;
                let (data_width, data_height) = decoder.chunk_data_dimensions(index);
                let data = match decoder.read_chunk(index).map_err(decode_error)? {
                    DecodingResult::U8(data) => data,
                    _ => {
                        return Err(BackendError::Unsupported(
                            "only 8-bit samples are supported".to_string(),
                        ))
                    }
                };
                let stride = row_stride(
                    data.len(),
                    (data_width, data_height),
                    (tiff_level.tile_width, tiff_level.tile_height),
                    channels,
                )?;

                let origin_x = tile_x * tile_width;
                let origin_y = tile_y * tile_height;
                let x0 = left.max(origin_x);
                let x1 = right.min(origin_x + data_width as u64);
                let y0 = top.max(origin_y);
                let y1 = bottom.min(origin_y + data_height as u64);

                for y in y0..y1 {
                    let row = (y - origin_y) as usize * stride;
                    for x in x0..x1 {
                        let at = row + (x - origin_x) as usize * channels;
                        out.put_pixel(
                            (x - left) as u32,
                            (y - top) as u32,
                            to_rgba(&data[at..at + channels]),
                        );
                    }
                }
            }
        }

        Ok(out)
    }

    fn read_associated_image(&self, name: &str) -> Result<RgbaImage, BackendError> {
        let index = *self
            .associated
            .get(name)
            .ok_or_else(|| BackendError::NoAssociatedImage(name.to_string()))?;

        let mut decoder = decoder_at(&self.source, index)?;
        let (width, height) = decoder.dimensions().map_err(decode_error)?;
        let channels = channels_for(decoder.colortype().map_err(decode_error)?)?;
        let data = match decoder.read_image().map_err(decode_error)? {
            DecodingResult::U8(data) => data,
            _ => {
                return Err(BackendError::Unsupported(
                    "only 8-bit samples are supported".to_string(),
                ))
            }
        };

        let expected = width as usize * height as usize * channels;
        if data.len() < expected {
            return Err(BackendError::Decode(format!(
                "{} image has {} bytes, expected {}",
                name,
                data.len(),
                expected
            )));
        }

        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let at = (y as usize * width as usize + x as usize) * channels;
            to_rgba(&data[at..at + channels])
        }))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn new_decoder<R: Read + Seek>(reader: R) -> Result<Decoder<R>, TiffError> {
    Ok(Decoder::new(reader)?.with_limits(Limits::unlimited()))
}

/// A fresh decoder positioned on directory `index`.
fn decoder_at<R: Read + Seek + Clone>(source: &R, index: usize) -> Result<Decoder<R>, BackendError> {
    let mut decoder = new_decoder(source.clone()).map_err(decode_error)?;
    for _ in 0..index {
        decoder.next_image().map_err(decode_error)?;
    }
    Ok(decoder)
}

fn read_directory<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    index: usize,
) -> Result<Directory, BackendError> {
    let (width, height) = decoder.dimensions().map_err(decode_error)?;
    let tiled = decoder
        .find_tag(Tag::TileWidth)
        .map_err(decode_error)?
        .is_some();
    let description = decoder.get_tag_ascii_string(Tag::ImageDescription).ok();

    Ok(Directory {
        index,
        width,
        height,
        tiled,
        description,
    })
}

fn decode_error(err: TiffError) -> BackendError {
    match err {
        TiffError::IoError(e) => match e.get_ref().and_then(|inner| inner.downcast_ref::<IoError>()) {
            Some(io) => BackendError::Io(io.clone()),
            None => BackendError::Decode(e.to_string()),
        },
        TiffError::UnsupportedError(e) => BackendError::Unsupported(e.to_string()),
        other => BackendError::Decode(other.to_string()),
    }
}

/// Mean of the width and height ratios to the base level.
///
/// Scanners round level sizes, so this yields factors like 4.0002.
fn level_downsample(base: (u32, u32), level: (u32, u32)) -> f64 {
    let x = base.0 as f64 / level.0 as f64;
    let y = base.1 as f64 / level.1 as f64;
    (x + y) / 2.0
}

fn associated_name(dir: &Directory) -> Option<&'static str> {
    let description = dir
        .description
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if description.contains("label") {
        Some("label")
    } else if description.contains("macro") {
        Some("macro")
    } else if dir.index == 1 {
        Some("thumbnail")
    } else {
        None
    }
}

fn channels_for(color: ColorType) -> Result<usize, BackendError> {
    match color {
        ColorType::Gray(8) => Ok(1),
        ColorType::GrayA(8) => Ok(2),
        // JPEG tiles come out of the decoder already converted to RGB
        ColorType::RGB(8) | ColorType::YCbCr(8) => Ok(3),
        ColorType::RGBA(8) => Ok(4),
        other => Err(BackendError::Unsupported(format!(
            "color type {:?}",
            other
        ))),
    }
}

/// Bytes per row of a decoded chunk.
///
/// Edge tiles come back either cropped to their valid area or padded to the
/// full tile size, depending on the compression.
fn row_stride(
    len: usize,
    data: (u32, u32),
    tile: (u32, u32),
    channels: usize,
) -> Result<usize, BackendError> {
    let cropped = data.0 as usize * data.1 as usize * channels;
    let padded = tile.0 as usize * tile.1 as usize * channels;
    if len == cropped {
        Ok(data.0 as usize * channels)
    } else if len >= padded {
        Ok(tile.0 as usize * channels)
    } else {
        Err(BackendError::Decode(format!(
            "chunk has {} bytes, expected {} or {}",
            len, cropped, padded
        )))
    }
}

fn to_rgba(px: &[u8]) -> Rgba<u8> {
    match *px {
        [g] => Rgba([g, g, g, 255]),
        [g, a] => Rgba([g, g, g, a]),
        [r, g, b] => Rgba([r, g, b, 255]),
        [r, g, b, a, ..] => Rgba([r, g, b, a]),
        [] => Rgba([0, 0, 0, 0]),
    }
}
