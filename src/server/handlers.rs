//! HTTP request handlers for the IIIF image API.
//!
//! # Endpoints
//!
//! - `GET /{image_id}/info.json` - IIIF image information
//! - `GET /{image_id}/properties.json` - Slide property map
//! - `GET /{image_id}/label.jpg`, `GET /{image_id}/thumbnail.jpg` - Associated images
//! - `GET /{image_id}/{x},{y},{w},{h}/...` - Tile
//! - `GET /view/{image_id}` - Viewer page
//! - `GET /health` - Health check endpoint
//!
//! Handlers never fail: resolver errors become error envelopes through
//! [`ResponseFormatter::error`].

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use serde::Serialize;

use crate::slide::PyramidBackend;
use crate::tile::{TileResponse, TileService};

use super::envelope::ResponseFormatter;
use super::viewer::{generate_viewer_html, viewer_policy};

/// Default Cache-Control max-age for image responses: 1 hour
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

pub const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");
pub const QUALITY_HEADER: HeaderName = HeaderName::from_static("x-tile-quality");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<B> {
    /// Resolver for info, properties, associated images and tiles
    pub tile_service: Arc<TileService<B>>,

    /// Envelope builder carrying the security headers
    pub formatter: ResponseFormatter,

    /// Cache-Control max-age in seconds for image responses
    pub cache_max_age: u32,
}

impl<B: PyramidBackend + 'static> AppState<B> {
    pub fn new(tile_service: TileService<B>) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            formatter: ResponseFormatter::default(),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
        }
    }

    pub fn with_formatter(mut self, formatter: ResponseFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    fn image_response(&self, response: TileResponse) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_str(&format!("public, max-age={}", self.cache_max_age))
                .unwrap_or_else(|_| HeaderValue::from_static("no-cache")),
        );
        headers.insert(
            CACHE_HIT_HEADER,
            HeaderValue::from_static(if response.cache_hit { "true" } else { "false" }),
        );
        headers.insert(QUALITY_HEADER, HeaderValue::from(u16::from(response.quality)));

        self.formatter
            .binary(StatusCode::OK, response.content_type, response.data, headers)
    }
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            formatter: self.formatter.clone(),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "bad_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /{image_id}/info.json`
///
/// # Response
///
/// `200 OK` with a IIIF image information document:
/// ```json
/// {
///   "@context": "http://iiif.io/api/image/2/context.json",
///   "@id": "http://localhost:3000/CMU_1",
///   "type": "ImageService3",
///   "protocol": "http://iiif.io/api/image",
///   "profile": ["http://iiif.io/api/image/2/level2.json"],
///   "width": 46000,
///   "height": 32914,
///   "tiles": [{ "width": 720, "scaleFactors": [1, 4, 16] }]
/// }
/// ```
///
/// `404 Not Found` if the identifier is invalid or the slide cannot be opened.
pub async fn info_handler<B: PyramidBackend + 'static>(
    State(state): State<AppState<B>>,
    Path(image_id): Path<String>,
) -> Response {
    match state.tile_service.info(&image_id).await {
        Ok(info) => state.formatter.json(StatusCode::OK, &info),
        Err(err) => state.formatter.error(&err),
    }
}

/// `GET /{image_id}/properties.json`
///
/// The slide's full property map as a flat JSON object of strings.
pub async fn properties_handler<B: PyramidBackend + 'static>(
    State(state): State<AppState<B>>,
    Path(image_id): Path<String>,
) -> Response {
    match state.tile_service.properties(&image_id).await {
        Ok(properties) => state.formatter.json(StatusCode::OK, &properties),
        Err(err) => state.formatter.error(&err),
    }
}

/// `GET /{image_id}/label.jpg`
pub async fn label_handler<B: PyramidBackend + 'static>(
    State(state): State<AppState<B>>,
    Path(image_id): Path<String>,
) -> Response {
    associated_image(&state, &image_id, "label").await
}

/// `GET /{image_id}/thumbnail.jpg`
pub async fn thumbnail_handler<B: PyramidBackend + 'static>(
    State(state): State<AppState<B>>,
    Path(image_id): Path<String>,
) -> Response {
    associated_image(&state, &image_id, "thumbnail").await
}

async fn associated_image<B: PyramidBackend + 'static>(
    state: &AppState<B>,
    image_id: &str,
    name: &str,
) -> Response {
    match state.tile_service.associated_image(image_id, name).await {
        Ok(response) => state.image_response(response),
        Err(err) => state.formatter.error(&err),
    }
}

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /{image_id}/{region}/{*rest}`
///
/// `region` is `x,y,w,h` in full-resolution pixels. The remaining IIIF
/// segments (size, rotation, quality, format) are accepted but ignored: the
/// output is always a `tile_size` square JPEG.
///
/// # Response
///
/// - `200 OK`: JPEG tile image with `Content-Type: image/jpeg`
/// - `400 Bad Request`: Malformed region, or a region too large to render
/// - `404 Not Found`: Invalid identifier or slide not found
/// - `500 Internal Server Error`: Decode, color transform or encode failure
///
/// # Headers
///
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
/// - `X-Tile-Quality: {quality}`
pub async fn tile_handler<B: PyramidBackend + 'static>(
    State(state): State<AppState<B>>,
    Path((image_id, region, _rest)): Path<(String, String, String)>,
) -> Response {
    match state.tile_service.tile(&image_id, &region).await {
        Ok(response) => state.image_response(response),
        Err(err) => state.formatter.error(&err),
    }
}

/// `GET /view/{image_id}`
///
/// HTML page with an OpenSeadragon viewer using the slide's `info.json` as
/// its tile source.
pub async fn viewer_handler<B: PyramidBackend + 'static>(
    State(state): State<AppState<B>>,
    Path(image_id): Path<String>,
) -> Response {
    let info = match state.tile_service.info(&image_id).await {
        Ok(info) => info,
        Err(err) => return state.formatter.error(&err),
    };
    let properties = match state.tile_service.properties(&image_id).await {
        Ok(properties) => properties,
        Err(err) => return state.formatter.error(&err),
    };

    let html = generate_viewer_html(&image_id, &info, &properties);
    state
        .formatter
        .html(StatusCode::OK, html, &viewer_policy(&info))
}

/// Handle health check requests.
///
/// `200 OK` with JSON body:
/// ```json
/// { "status": "healthy", "version": "0.1.0" }
/// ```
pub async fn health_handler<B: PyramidBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Response {
    state.formatter.json(
        StatusCode::OK,
        &HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )
}

/// Any path that matches no route.
pub async fn fallback_handler<B: PyramidBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Response {
    state.formatter.json(
        StatusCode::NOT_FOUND,
        &ErrorResponse::with_status("not_found", "Resource not found", StatusCode::NOT_FOUND),
    )
}

// =============================================================================
// Tests
// =============================================================================
