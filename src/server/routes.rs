//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                            - Health check
//! /view/{image_id}                   - OpenSeadragon viewer page
//! /{image_id}/info.json              - IIIF image information
//! /{image_id}/properties.json        - Slide properties
//! /{image_id}/label.jpg              - Label image
//! /{image_id}/thumbnail.jpg          - Thumbnail image
//! /{image_id}/{x},{y},{w},{h}/...    - Tile
//! ```
//!
//! # Example
//!
//! ```ignore
//! use wsi_iiif::server::{create_router, RouterConfig};
//!
//! let config = RouterConfig::new()
//!     .with_frame_ancestors("https://viewer.example.org")
//!     .with_cors_origins(vec!["https://viewer.example.org".to_string()]);
//!
//! let router = create_router(tile_service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::envelope::{ResponseFormatter, DEFAULT_FRAME_ANCESTORS};
use super::handlers::{
    fallback_handler, health_handler, info_handler, label_handler, properties_handler,
    thumbnail_handler, tile_handler, viewer_handler, AppState, DEFAULT_CACHE_MAX_AGE,
};
use crate::slide::PyramidBackend;
use crate::tile::TileService;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// `frame-ancestors` source list for the Content-Security-Policy header
    pub frame_ancestors: String,

    /// Send binary bodies base64 encoded
    pub base64_transport: bool,
}

impl RouterConfig {
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - Tracing is enabled
    /// - Pages may not be framed (`frame-ancestors 'none'`)
    /// - Binary bodies are sent raw
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
            frame_ancestors: DEFAULT_FRAME_ANCESTORS.to_string(),
            base64_transport: false,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn with_frame_ancestors(mut self, frame_ancestors: impl Into<String>) -> Self {
        self.frame_ancestors = frame_ancestors.into();
        self
    }

    pub fn with_base64_transport(mut self, enabled: bool) -> Self {
        self.base64_transport = enabled;
        self
    }

    fn formatter(&self) -> ResponseFormatter {
        ResponseFormatter::new(&self.frame_ancestors).with_base64_transport(self.base64_transport)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router with CORS and, optionally, request
/// tracing.
pub fn create_router<B>(tile_service: TileService<B>, config: RouterConfig) -> Router
where
    B: PyramidBackend + 'static,
{
    let app_state = AppState::new(tile_service)
        .with_formatter(config.formatter())
        .with_cache_max_age(config.cache_max_age);

    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler::<B>))
        .route("/view/{image_id}", get(viewer_handler::<B>))
        .route("/{image_id}/info.json", get(info_handler::<B>))
        .route("/{image_id}/properties.json", get(properties_handler::<B>))
        .route("/{image_id}/label.jpg", get(label_handler::<B>))
        .route("/{image_id}/thumbnail.jpg", get(thumbnail_handler::<B>))
        .route("/{image_id}/{region}/{*rest}", get(tile_handler::<B>))
        .fallback(fallback_handler::<B>)
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        // No origins allowed - this effectively disables CORS
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
