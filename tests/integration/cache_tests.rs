//! Cache and concurrency tests: slide handles, tiles and blocks.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use wsi_iiif::slide::{SlideCache, TiffBackend};
use wsi_iiif::{create_router, RouterConfig};

use super::test_utils::{
    create_service, create_svs_like_tiff, get, CountingCompiler, MemorySource, MockBackend,
    MockSlide,
};

// =============================================================================
// Slide Handle Cache
// =============================================================================

#[tokio::test]
async fn test_concurrent_requests_open_once() {
    let backend = MockBackend::new()
        .with_slide("slide", MockSlide::new(10_000, 10_000))
        .with_delay(Duration::from_millis(50));
    let opens = backend.open_counter();
    let service = Arc::new(create_service(backend, CountingCompiler::new()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service.info("slide").await.map(|_| ())
            } else {
                let region = format!("{},0,64,64", i * 64);
                service.tile("slide", &region).await.map(|_| ())
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(service.slides().cached_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_missing_slide_shares_failure() {
    let backend = MockBackend::new().with_delay(Duration::from_millis(50));
    let opens = backend.open_counter();
    let service = Arc::new(create_service(backend, CountingCompiler::new()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move { service.info("missing").await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(service.slides().cached_count().await, 0);
}

#[tokio::test]
async fn test_failed_open_is_not_cached() {
    let backend = MockBackend::new()
        .with_slide("slide", MockSlide::new(10_000, 10_000))
        .failing_first(1);
    let opens = backend.open_counter();
    let router = create_router(
        create_service(backend, CountingCompiler::new()),
        RouterConfig::new().with_tracing(false),
    );

    let first = get(&router, "/slide/info.json").await;
    assert_eq!(first.status(), StatusCode::NOT_FOUND);

    let second = get(&router, "/slide/info.json").await;
    assert_eq!(second.status(), StatusCode::OK);

    let third = get(&router, "/slide/properties.json").await;
    assert_eq!(third.status(), StatusCode::OK);

    assert_eq!(opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_slide_cache_eviction_reopens() {
    let backend = MockBackend::new()
        .with_slide("a", MockSlide::new(1000, 1000))
        .with_slide("b", MockSlide::new(1000, 1000));
    let opens = backend.open_counter();
    let slides = SlideCache::with_capacity(backend, 1);

    slides.resolve("a").await.unwrap();
    slides.resolve("b").await.unwrap();
    assert!(!slides.contains("a").await);

    slides.resolve("a").await.unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 3);
}

// =============================================================================
// Tile Cache
// =============================================================================

#[tokio::test]
async fn test_repeated_tile_decodes_once() {
    let backend = MockBackend::new().with_slide("slide", MockSlide::new(10_000, 10_000));
    let reads = backend.read_log();
    let service = create_service(backend, CountingCompiler::new());

    let first = service.tile("slide", "0,0,256,256").await.unwrap();
    let second = service.tile("slide", "0,0,256,256").await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.data, second.data);
    assert_eq!(reads.lock().unwrap().len(), 1);

    // Leading zeros normalize to the same key
    let third = service.tile("slide", "000,0,256,256").await.unwrap();
    assert!(third.cache_hit);
}

#[tokio::test]
async fn test_tile_cache_is_per_slide() {
    let backend = MockBackend::new()
        .with_slide("a", MockSlide::new(10_000, 10_000).with_color([255, 0, 0]))
        .with_slide("b", MockSlide::new(10_000, 10_000).with_color([0, 0, 255]));
    let service = create_service(backend, CountingCompiler::new());

    let a = service.tile("a", "0,0,64,64").await.unwrap();
    let b = service.tile("b", "0,0,64,64").await.unwrap();

    assert!(!b.cache_hit);
    assert_ne!(a.data, b.data);
}

#[tokio::test]
async fn test_tile_cache_capacity_bounds_bytes() {
    let backend = MockBackend::new().with_slide("slide", MockSlide::new(100_000, 100_000));
    let service =
        create_service(backend, CountingCompiler::new()).with_cache_capacity(4 * 1024);

    for i in 0..32 {
        let region = format!("{},0,64,64", i * 64);
        service.tile("slide", &region).await.unwrap();
    }

    assert!(service.cache().size().await <= 4 * 1024);
    assert!(!service.cache().is_empty().await);
}

// =============================================================================
// Block Cache (through the TIFF backend)
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repeated_tiles_reuse_blocks() {
    let source = MemorySource::new().with_object("slide.svs", create_svs_like_tiff());
    let reads = source.read_counter();
    let backend = TiffBackend::new(source).with_block_cache(4096, 64);
    let service = create_service(backend, CountingCompiler::new());

    service.tile("slide", "0,0,64,64").await.unwrap();
    let after_first = reads.load(Ordering::SeqCst);
    assert!(after_first > 0);

    // A different tile in the same level is served from cached blocks
    service.tile("slide", "64,0,64,64").await.unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), after_first);
}
