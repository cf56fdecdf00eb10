//! Tile resolver tests: level selection, resampling and color correction.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use wsi_iiif::error::{ErrorKind, TileError};

use super::test_utils::{
    assert_close, center_pixel, create_service, CountingCompiler, MockBackend, MockSlide,
    RegionRead, TEST_TILE_SIZE,
};

const T: u64 = TEST_TILE_SIZE as u64;

fn region(x: u64, y: u64, w: u64, h: u64) -> String {
    format!("{},{},{},{}", x, y, w, h)
}

// =============================================================================
// Level Selection
// =============================================================================

#[tokio::test]
async fn test_level_and_window_for_requested_scale() {
    let backend = MockBackend::new().with_slide(
        "slide",
        MockSlide::new(100_000, 80_000).with_downsamples(vec![1.0, 4.0002, 16.001, 32.0]),
    );
    let reads = backend.read_log();
    let service = create_service(backend, CountingCompiler::new());

    // (tiles per side, expected level, expected window)
    let cases = [
        (1, 0, T),
        (2, 0, 2 * T),
        (4, 1, T),
        (8, 1, 2 * T),
        (15, 1, T * 15 / 4),
        (16, 2, T),
        (32, 3, T),
        (64, 3, 2 * T),
    ];

    for (tiles, level, window) in cases {
        let response = service
            .tile("slide", &region(T, 2 * T, tiles * T, tiles * T))
            .await
            .unwrap();
        assert!(!response.cache_hit);

        let last = *reads.lock().unwrap().last().unwrap();
        assert_eq!(
            last,
            RegionRead {
                location: (T, 2 * T),
                level,
                size: (window as u32, window as u32),
            },
            "{} tiles per side",
            tiles
        );
    }
}

#[tokio::test]
async fn test_small_region_reads_one_tile_at_base() {
    let backend = MockBackend::new().with_slide("slide", MockSlide::new(10_000, 10_000));
    let reads = backend.read_log();
    let service = create_service(backend, CountingCompiler::new());

    // Requested downsample clamps to 1 for regions smaller than a tile
    service.tile("slide", "0,0,10,10").await.unwrap();

    let last = *reads.lock().unwrap().last().unwrap();
    assert_eq!(last.level, 0);
    assert_eq!(last.size, (TEST_TILE_SIZE, TEST_TILE_SIZE));
}

#[tokio::test]
async fn test_non_square_region_uses_larger_side() {
    let backend = MockBackend::new().with_slide("slide", MockSlide::new(10_000, 10_000));
    let reads = backend.read_log();
    let service = create_service(backend, CountingCompiler::new());

    service
        .tile("slide", &region(0, 0, T, 4 * T))
        .await
        .unwrap();

    let last = *reads.lock().unwrap().last().unwrap();
    assert_eq!(last.level, 1);
    assert_eq!(last.size, (TEST_TILE_SIZE, TEST_TILE_SIZE));
}

#[tokio::test]
async fn test_output_is_always_tile_sized() {
    let backend = MockBackend::new().with_slide("slide", MockSlide::new(10_000, 10_000));
    let service = create_service(backend, CountingCompiler::new());

    for r in [region(0, 0, T, T), region(0, 0, 3 * T, 3 * T), region(5, 5, 7, 300)] {
        let response = service.tile("slide", &r).await.unwrap();
        let decoded = image::load_from_memory(&response.data).unwrap();
        assert_eq!(
            (decoded.width(), decoded.height()),
            (TEST_TILE_SIZE, TEST_TILE_SIZE),
            "region {}",
            r
        );
    }
}

// =============================================================================
// Color Correction
// =============================================================================

#[tokio::test]
async fn test_known_profile_is_corrected() {
    let color = [200, 120, 40];
    let backend = MockBackend::new()
        .with_slide("plain", MockSlide::new(1000, 1000).with_color(color))
        .with_slide(
            "at2",
            MockSlide::new(1000, 1000).with_color(color).with_profile("AT2"),
        )
        .with_slide(
            "other",
            MockSlide::new(1000, 1000)
                .with_color(color)
                .with_profile("Some Other Scanner"),
        );
    let compiler = CountingCompiler::new();
    let compiles = compiler.compile_counter();
    let service = create_service(backend, compiler);

    let plain = service.tile("plain", "0,0,64,64").await.unwrap();
    let other = service.tile("other", "0,0,64,64").await.unwrap();
    assert_eq!(compiles.load(Ordering::SeqCst), 0);

    let corrected = service.tile("at2", "0,0,64,64").await.unwrap();
    assert_eq!(compiles.load(Ordering::SeqCst), 1);

    // Unknown profiles pass through unchanged
    assert_close(center_pixel(&plain.data), color);
    assert_close(center_pixel(&other.data), color);
    // The test transform inverts
    assert_close(center_pixel(&corrected.data), [55, 135, 215]);
    assert_ne!(plain.data, corrected.data);
}

#[tokio::test]
async fn test_associated_images_are_not_corrected() {
    let backend = MockBackend::new().with_slide(
        "at2",
        MockSlide::new(1000, 1000).with_profile("AT2"),
    );
    let compiler = CountingCompiler::new();
    let compiles = compiler.compile_counter();
    let service = create_service(backend, compiler);

    let label = service.associated_image("at2", "label").await.unwrap();
    assert_close(center_pixel(&label.data), [255, 255, 255]);
    assert_eq!(compiles.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shared_profile_compiles_once() {
    let mut backend = MockBackend::new();
    for i in 0..4 {
        backend = backend.with_slide(
            &format!("scan_{}", i),
            MockSlide::new(1000, 1000).with_profile("ScanScope v1"),
        );
    }
    let compiler = CountingCompiler::new().with_delay(Duration::from_millis(50));
    let compiles = compiler.compile_counter();
    let service = Arc::new(create_service(backend, compiler));

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let image_id = format!("scan_{}", i % 4);
            let r = format!("{},0,64,64", i * 64);
            service.tile(&image_id, &r).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(compiles.load(Ordering::SeqCst), 1);
    assert_eq!(service.transforms().compiled_count(), 1);
}

#[tokio::test]
async fn test_failed_compile_is_internal_and_retried() {
    let backend = MockBackend::new().with_slide(
        "at2",
        MockSlide::new(1000, 1000).with_profile("AT2"),
    );
    let compiler = CountingCompiler::new().failing_first(1);
    let compiles = compiler.compile_counter();
    let service = create_service(backend, compiler);

    let err = service.tile("at2", "0,0,64,64").await.unwrap_err();
    assert!(matches!(err, TileError::ColorTransform { .. }));
    assert_eq!(err.kind(), ErrorKind::Internal);
    // Failures are not cached
    assert!(service.cache().is_empty().await);

    let response = service.tile("at2", "0,0,64,64").await.unwrap();
    assert!(!response.cache_hit);
    assert_eq!(compiles.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Error Kinds
// =============================================================================

#[tokio::test]
async fn test_read_failure_is_internal_and_keeps_handle() {
    let backend = MockBackend::new().with_slide(
        "broken",
        MockSlide::new(1000, 1000).with_read_error("bad huffman code at 0x1f00"),
    );
    let opens = backend.open_counter();
    let service = create_service(backend, CountingCompiler::new());

    let err = service.tile("broken", "0,0,64,64").await.unwrap_err();
    assert!(matches!(err, TileError::ImageRead { .. }));
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(!err.to_string().contains("huffman"));
    assert!(err.detail().unwrap().contains("huffman"));

    // The slide opened fine, so its handle stays cached
    assert!(service.slides().contains("broken").await);
    assert!(service.cache().is_empty().await);

    service.tile("broken", "64,0,64,64").await.unwrap_err();
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_error_kinds() {
    let backend = MockBackend::new().with_slide("slide", MockSlide::new(1000, 1000));
    let service = create_service(backend, CountingCompiler::new());

    let err = service.tile("slide", "10,10,abc,10").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert!(err.to_string().contains("10,10,abc,10"));

    let err = service.tile("missing", "0,0,64,64").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service.info("a/b").await.unwrap_err();
    assert!(matches!(err, TileError::InvalidImageId { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service
        .associated_image("slide", "thumbnail")
        .await
        .unwrap_err();
    assert!(matches!(err, TileError::AssociatedImageNotFound { .. }));
}
