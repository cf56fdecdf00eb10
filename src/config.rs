//! Configuration management.
//!
//! Every option is a command-line flag with an environment variable fallback
//! using the `IIIF_` prefix, validated once at startup:
//!
//! - `IIIF_HOST` - Server bind address (default: 0.0.0.0)
//! - `IIIF_PORT` - Server port (default: 3000)
//! - `IIIF_API_URL` - Public base URL used for `@id` in info.json
//! - `IIIF_BUCKET` - S3 bucket name (required)
//! - `IIIF_S3_PREFIX` - Key prefix of slide objects inside the bucket
//! - `IIIF_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `IIIF_S3_REGION` - AWS region (default: us-east-1)
//! - `IIIF_SLIDE_EXTENSION` - Extension appended to image ids (default: .svs)
//! - `IIIF_FRAME_ANCESTORS` - CSP frame-ancestors list (default: 'none')
//! - `IIIF_CORS_ORIGINS` - Comma-separated allowed origins (default: any)
//! - `IIIF_TILE_SIZE` - Output tile side in pixels (default: 720)
//! - `IIIF_JPEG_QUALITY` - JPEG quality (default: 70)
//! - `IIIF_ICC_AT2`, `IIIF_ICC_SCANSCOPE` - Scanner source ICC profiles
//! - `IIIF_ICC_DESTINATION` - Destination ICC profile (default: built-in sRGB)
//! - `IIIF_CACHE_SLIDES` - Max open slides to cache (default: 100)
//! - `IIIF_CACHE_TILES` - Encoded image cache size, e.g. `100MiB`
//! - `IIIF_CACHE_BLOCKS` - Max blocks per slide (default: 100)
//! - `IIIF_BLOCK_SIZE` - Block size in bytes (default: 256KiB)
//! - `IIIF_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `IIIF_BASE64_TRANSPORT` - Send binary bodies base64 encoded
//! - `IIIF_DEBUG` - Debug logging

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::color::{DEFAULT_AT2_PROFILE, DEFAULT_SCANSCOPE_PROFILE};
use crate::io::{DEFAULT_BLOCK_CAPACITY, DEFAULT_BLOCK_SIZE};
use crate::server::{DEFAULT_CACHE_MAX_AGE, DEFAULT_FRAME_ANCESTORS};
use crate::slide::DEFAULT_SLIDE_CAPACITY;
use crate::tile::{DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY, DEFAULT_TILE_SIZE};

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_API_URL: &str = "http://localhost:3000/";
pub const DEFAULT_SLIDE_EXTENSION: &str = ".svs";

/// Accepted output tile sizes.
pub const MIN_TILE_SIZE: u32 = 16;
pub const MAX_TILE_SIZE: u32 = 4096;

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-iiif - A IIIF image server for whole slide images.
///
/// Reads pyramidal slides from S3 or S3-compatible storage with HTTP range
/// requests and serves color-corrected, fixed-size JPEG tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-iiif")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IIIF_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "IIIF_PORT")]
    pub port: u16,

    /// Public base URL of the image API, used to build `@id` in info.json.
    #[arg(long, default_value = DEFAULT_API_URL, env = "IIIF_API_URL")]
    pub api_url: String,

    // =========================================================================
    // S3 Configuration
    // =========================================================================
    /// S3 bucket name containing the slide files.
    #[arg(long, env = "IIIF_BUCKET")]
    pub s3_bucket: String,

    /// Key prefix of slide objects inside the bucket.
    #[arg(long, env = "IIIF_S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "IIIF_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "IIIF_S3_REGION")]
    pub s3_region: String,

    /// Extension appended to an image id to form its object key.
    #[arg(long, default_value = DEFAULT_SLIDE_EXTENSION, env = "IIIF_SLIDE_EXTENSION")]
    pub slide_extension: String,

    // =========================================================================
    // Response Configuration
    // =========================================================================
    /// Sources allowed to frame responses (CSP frame-ancestors).
    #[arg(long, default_value = DEFAULT_FRAME_ANCESTORS, env = "IIIF_FRAME_ANCESTORS")]
    pub frame_ancestors: String,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "IIIF_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "IIIF_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Send binary bodies base64 encoded (for API gateways).
    #[arg(long, default_value_t = false, env = "IIIF_BASE64_TRANSPORT")]
    pub base64_transport: bool,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Output tile side in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "IIIF_TILE_SIZE")]
    pub tile_size: u32,

    /// JPEG quality for tile encoding (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "IIIF_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    // =========================================================================
    // Color Management
    // =========================================================================
    /// ICC profile of Aperio AT2 scanners.
    #[arg(long, default_value = DEFAULT_AT2_PROFILE, env = "IIIF_ICC_AT2")]
    pub icc_at2: PathBuf,

    /// ICC profile of Aperio ScanScope v1 scanners.
    #[arg(long, default_value = DEFAULT_SCANSCOPE_PROFILE, env = "IIIF_ICC_SCANSCOPE")]
    pub icc_scanscope: PathBuf,

    /// Destination ICC profile. Built-in sRGB if not specified.
    #[arg(long, env = "IIIF_ICC_DESTINATION")]
    pub icc_destination: Option<PathBuf>,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of open slides to keep in cache.
    #[arg(long, default_value_t = DEFAULT_SLIDE_CAPACITY, env = "IIIF_CACHE_SLIDES")]
    pub cache_slides: usize,

    /// Encoded image cache size in bytes (accepts KB/MB/GB and KiB/MiB/GiB).
    #[arg(
        long,
        default_value_t = DEFAULT_TILE_CACHE_CAPACITY,
        env = "IIIF_CACHE_TILES",
        value_parser = parse_byte_size
    )]
    pub cache_tiles: usize,

    /// Maximum number of blocks to cache per slide.
    #[arg(long, default_value_t = DEFAULT_BLOCK_CAPACITY, env = "IIIF_CACHE_BLOCKS")]
    pub cache_blocks: usize,

    /// Block size in bytes for the block cache.
    #[arg(
        long,
        default_value_t = DEFAULT_BLOCK_SIZE,
        env = "IIIF_BLOCK_SIZE",
        value_parser = parse_byte_size
    )]
    pub block_size: usize,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable debug logging.
    #[arg(short, long, default_value_t = false, env = "IIIF_DEBUG")]
    pub debug: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.s3_bucket.trim().is_empty() {
            return Err("S3 bucket name is required. Set --s3-bucket or IIIF_BUCKET".to_string());
        }

        self.api_base_url()?;

        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&self.tile_size) {
            return Err(format!(
                "tile_size must be between {} and {}",
                MIN_TILE_SIZE, MAX_TILE_SIZE
            ));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.cache_slides == 0 {
            return Err("cache_slides must be greater than 0".to_string());
        }
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }

        if self.block_size < 1024 || self.block_size > 16 * 1024 * 1024 {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }

        let frame_ancestors = self.frame_ancestors.trim();
        if frame_ancestors.is_empty() {
            return Err("frame_ancestors must not be empty (use 'none' to forbid framing)".to_string());
        }
        if !frame_ancestors.bytes().all(|b| (b' '..=b'~').contains(&b)) {
            return Err("frame_ancestors must be printable ASCII".to_string());
        }

        Ok(())
    }

    /// The API base URL, always ending in `/` so image ids join as a child.
    pub fn api_base_url(&self) -> Result<Url, String> {
        let mut url = Url::parse(self.api_url.trim())
            .map_err(|e| format!("api_url '{}' is not a valid URL: {}", self.api_url, e))?;

        if url.cannot_be_a_base() {
            return Err(format!("api_url '{}' must be an absolute base URL", self.api_url));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a byte size: a plain number, or one with a `KB`/`MB`/`GB` or
/// `KiB`/`MiB`/`GiB` suffix. Both suffix families are powers of 1024.
pub fn parse_byte_size(input: &str) -> Result<usize, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let value: usize = digits
        .parse()
        .map_err(|_| format!("invalid size '{}'", input))?;

    let multiplier: usize = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        "g" | "gb" | "gib" => 1024 * 1024 * 1024,
        other => return Err(format!("unknown size unit '{}' in '{}'", other, input)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' is too large", input))
}

// =============================================================================
// Tests
// =============================================================================
