//! wsi-iiif - A IIIF image server for whole slide images.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_iiif::{
    color::{ColorTransformCache, IccTransformCompiler, ProfilePaths},
    config::Config,
    create_s3_client,
    server::{create_router, RouterConfig},
    slide::{S3SlideSource, SlideCache, TiffBackend},
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.debug);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let api_url = match config.api_base_url() {
        Ok(url) => url,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("wsi-iiif v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  API URL: {}", api_url);
    info!("  S3 bucket: {}", config.s3_bucket);
    if let Some(ref prefix) = config.s3_prefix {
        info!("  S3 prefix: {}", prefix);
    }
    if let Some(ref endpoint) = config.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", config.s3_region);
    info!(
        "  Tiles: {}px, JPEG quality {}",
        config.tile_size, config.jpeg_quality
    );
    info!(
        "  Cache: {} slides, {} blocks/slide of {}KB, {}MB encoded images",
        config.cache_slides,
        config.cache_blocks,
        config.block_size / 1024,
        config.cache_tiles / (1024 * 1024)
    );

    let profiles = ProfilePaths {
        at2: config.icc_at2.clone(),
        scanscope_v1: config.icc_scanscope.clone(),
        destination: config.icc_destination.clone(),
    };
    check_profiles(&profiles);

    let s3_client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

    let backend = TiffBackend::new(S3SlideSource::new(s3_client, config.s3_bucket.clone()))
        .with_prefix(config.s3_prefix.clone())
        .with_extension(config.slide_extension.clone())
        .with_block_cache(config.block_size, config.cache_blocks);

    let slides = SlideCache::with_capacity(backend, config.cache_slides);
    let transforms = ColorTransformCache::new(Arc::new(IccTransformCompiler::new(profiles)));

    let tile_service = TileService::new(slides, transforms, api_url)
        .with_tile_size(config.tile_size)
        .with_jpeg_quality(config.jpeg_quality)
        .with_cache_capacity(config.cache_tiles);

    let router = create_router(tile_service, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!("  curl http://{}/<image_id>/info.json", addr);
    info!("  open http://{}/view/<image_id>", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(debug: bool) {
    let env_filter = if debug {
        "wsi_iiif=debug,tower_http=debug"
    } else {
        "wsi_iiif=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Missing profiles are not fatal: slides declaring them fail with a 500
/// until the file appears, everything else keeps working.
fn check_profiles(profiles: &ProfilePaths) {
    for path in [&profiles.at2, &profiles.scanscope_v1]
        .into_iter()
        .chain(profiles.destination.as_ref())
    {
        if path.is_file() {
            info!("  ICC profile: {}", path.display());
        } else {
            warn!("  ICC profile not found: {}", path.display());
        }
    }
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_frame_ancestors(config.frame_ancestors.clone())
        .with_base64_transport(config.base64_transport)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
