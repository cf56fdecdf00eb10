//! # wsi-iiif
//!
//! A IIIF image server for pyramidal whole slide images (WSI) stored in
//! S3-compatible object storage.
//!
//! Slides are opened over HTTP range requests, regions are decoded from the
//! pyramid level closest to the requested scale, resampled to a fixed tile
//! size, color corrected with the scanner's ICC profile and served as JPEG.
//!
//! ## Features
//!
//! - **IIIF image API**: `info.json`, region tiles, label and thumbnail images
//! - **Range-based streaming**: Only the bytes a tile needs are fetched
//! - **Scanner color correction**: ICC transforms compiled once per profile
//! - **Multi-level caching**: Open slides, storage blocks and encoded tiles
//! - **Built-in web viewer**: OpenSeadragon page driven by `info.json`
//!
//! ## Architecture
//!
//! - [`io`] - S3 range reader, block cache and blocking bridge
//! - [`slide`] - Pyramid backend traits, TIFF/SVS backend and slide handle cache
//! - [`color`] - Scanner ICC profiles and the color transform cache
//! - [`tile`] - Level selection, region parsing, encoding and the tile service
//! - [`server`] - Axum routes, handlers and the response envelope
//! - [`config`] - CLI and environment configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use wsi_iiif::{
//!     create_router, create_s3_client, ColorTransformCache, IccTransformCompiler, ProfilePaths,
//!     RouterConfig, S3SlideSource, SlideCache, TiffBackend, TileService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = create_s3_client(None, "us-east-1").await;
//!     let backend = TiffBackend::new(S3SlideSource::new(client, "my-slides".to_string()));
//!
//!     let transforms =
//!         ColorTransformCache::new(Arc::new(IccTransformCompiler::new(ProfilePaths::default())));
//!     let service = TileService::new(
//!         SlideCache::new(backend),
//!         transforms,
//!         "http://localhost:3000/".parse()?,
//!     );
//!
//!     let router = create_router(service, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod color;
pub mod config;
pub mod error;
pub mod io;
pub mod server;
pub mod singleflight;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use color::{
    ColorTransform, ColorTransformCache, IccTransform, IccTransformCompiler, ProfilePaths,
    ScannerProfile, TransformCompiler,
};
pub use config::Config;
pub use error::{BackendError, ErrorKind, IoError, TileError};
pub use io::{create_s3_client, BlockCache, RangeReader, S3RangeReader};
pub use server::{create_router, AppState, ErrorResponse, ResponseFormatter, RouterConfig};
pub use singleflight::SingleFlight;
pub use slide::{
    PyramidBackend, PyramidImage, S3SlideSource, SlideCache, SlideHandle, SlideSource,
    TiffBackend,
};
pub use tile::{
    select_level, ImageInfo, JpegTileEncoder, Region, TileCache, TileResponse, TileService,
    DEFAULT_JPEG_QUALITY, DEFAULT_TILE_SIZE,
};
