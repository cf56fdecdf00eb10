//! Tile resolution layer.
//!
//! - [`TileService`]: entry point for info, properties, associated image and
//!   tile requests
//! - [`select_level`]: pyramid level choice with rounded downsample factors
//! - [`Region`]: the `x,y,w,h` region path segment
//! - [`TileCache`]: byte-bounded LRU of encoded JPEGs
//! - [`JpegTileEncoder`]: RGB JPEG output at a fixed quality

mod cache;
mod encoder;
mod level;
mod region;
mod service;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use encoder::{
    clamp_quality, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use level::{requested_downsample, select_level, source_window};
pub use region::Region;
pub use service::{
    is_valid_image_id, ImageInfo, TileInfo, TileResponse, TileService, DEFAULT_TILE_SIZE,
    IIIF_CONTEXT, IIIF_PROFILE, IIIF_PROTOCOL, IIIF_TYPE, JPEG_CONTENT_TYPE, MAX_WINDOW_TILES,
};
