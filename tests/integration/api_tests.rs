//! API integration tests: routes, status codes, headers and bodies.

use axum::http::StatusCode;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use wsi_iiif::{create_router, IccTransformCompiler, ProfilePaths, RouterConfig};

use super::test_utils::{
    body_bytes, body_json, create_service, get, is_valid_jpeg, CountingCompiler, MockBackend,
    MockSlide, TEST_TILE_SIZE,
};

fn backend() -> MockBackend {
    MockBackend::new()
        .with_slide("slide_a", MockSlide::new(46000, 32914))
        .with_slide("small", MockSlide::new(640, 480).with_downsamples(vec![1.0]))
}

fn router_with(config: RouterConfig) -> Router {
    create_router(create_service(backend(), CountingCompiler::new()), config)
}

fn router() -> Router {
    router_with(RouterConfig::new().with_tracing(false))
}

fn assert_security_headers(response: &axum::http::Response<axum::body::Body>) {
    let headers = response.headers();
    assert_eq!(headers["strict-transport-security"], "max-age=31536000");
    assert!(headers["content-security-policy"]
        .to_str()
        .unwrap()
        .starts_with("default-src 'self'"));
    assert!(headers["content-security-policy"]
        .to_str()
        .unwrap()
        .contains("frame-ancestors"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["referrer-policy"], "same-origin");
}

// =============================================================================
// info.json
// =============================================================================

#[tokio::test]
async fn test_info_json() {
    let response = get(&router(), "/slide_a/info.json").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_security_headers(&response);

    let json = body_json(response).await;
    assert_eq!(json["@context"], "http://iiif.io/api/image/2/context.json");
    assert_eq!(json["@id"], "http://localhost:3000/slide_a");
    assert_eq!(json["type"], "ImageService3");
    assert_eq!(json["protocol"], "http://iiif.io/api/image");
    assert_eq!(json["profile"][0], "http://iiif.io/api/image/2/level2.json");
    assert_eq!(json["width"], 46000);
    assert_eq!(json["height"], 32914);
    assert_eq!(json["tiles"][0]["width"], TEST_TILE_SIZE);
    // 4.0002 and 16.001 are rounded
    assert_eq!(json["tiles"][0]["scaleFactors"], serde_json::json!([1, 4, 16]));
}

#[tokio::test]
async fn test_info_missing_slide_is_404() {
    let response = get(&router(), "/nope/info.json").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_security_headers(&response);

    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["status"], 404);
    assert!(json["message"].as_str().unwrap().contains("'nope'"));
    // Storage locations stay out of the body
    assert!(!json["message"].as_str().unwrap().contains("mock://"));
}

#[tokio::test]
async fn test_invalid_image_id_is_404() {
    for uri in [
        "/bad-id/info.json",
        "/bad.svs/properties.json",
        "/bad-id/0,0,64,64/full/0/default.jpg",
        "/bad%20id/label.jpg",
    ] {
        let response = get(&router(), uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri {}", uri);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Invalid image ID", "uri {}", uri);
    }
}

// =============================================================================
// properties.json
// =============================================================================

#[tokio::test]
async fn test_properties_json() {
    let response = get(&router(), "/slide_a/properties.json").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_security_headers(&response);

    let json = body_json(response).await;
    assert_eq!(json["openslide.vendor"], "mock");
    assert_eq!(json["aperio.AppMag"], "20");
}

#[tokio::test]
async fn test_properties_missing_slide_is_404() {
    let response = get(&router(), "/nope/properties.json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Associated images
// =============================================================================

#[tokio::test]
async fn test_label_jpg() {
    let response = get(&router(), "/slide_a/label.jpg").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    assert_eq!(response.headers()["cache-control"], "public, max-age=3600");
    assert_security_headers(&response);

    let body = body_bytes(response).await;
    assert!(is_valid_jpeg(&body));
    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (40, 20));
}

#[tokio::test]
async fn test_missing_thumbnail_is_404() {
    let response = get(&router(), "/slide_a/thumbnail.jpg").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("thumbnail"));
}

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_tile_is_fixed_size_jpeg() {
    let size = TEST_TILE_SIZE * 2;
    let uri = format!("/slide_a/0,0,{},{}/full/0/default.jpg", size, size);
    let response = get(&router(), &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    assert_eq!(response.headers()["x-tile-cache-hit"], "false");
    assert_eq!(response.headers()["x-tile-quality"], "70");
    assert_security_headers(&response);

    let body = body_bytes(response).await;
    assert!(is_valid_jpeg(&body));
    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!(
        (decoded.width(), decoded.height()),
        (TEST_TILE_SIZE, TEST_TILE_SIZE)
    );
    assert_eq!(decoded.color(), image::ColorType::Rgb8);
}

#[tokio::test]
async fn test_tile_cache_hit_header() {
    let router = router();
    let uri = "/slide_a/640,640,64,64/64,/0/default.jpg";

    let first = get(&router, uri).await;
    assert_eq!(first.headers()["x-tile-cache-hit"], "false");
    let first_body = body_bytes(first).await;

    let second = get(&router, uri).await;
    assert_eq!(second.headers()["x-tile-cache-hit"], "true");
    assert_eq!(body_bytes(second).await, first_body);
}

#[tokio::test]
async fn test_malformed_region_is_400() {
    let response = get(&router(), "/slide_a/10,10,abc,10/full/0/default.jpg").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_security_headers(&response);

    let json = body_json(response).await;
    assert_eq!(json["error"], "bad_request");
    assert!(json["message"].as_str().unwrap().contains("10,10,abc,10"));
}

#[tokio::test]
async fn test_other_region_forms_are_400() {
    for region in ["full", "square", "pct:0,0,50,50", "0,0,10", "-1,0,10,10"] {
        let uri = format!("/slide_a/{}/full/0/default.jpg", region);
        let response = get(&router(), &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "region {}", region);
    }
}

#[tokio::test]
async fn test_tile_missing_slide_is_404() {
    let response = get(&router(), "/nope/0,0,64,64/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_region_too_large_is_400() {
    // Single-level slide: a 100-tile region would need a 6400px window
    let size = TEST_TILE_SIZE * 100;
    let uri = format!("/small/0,0,{},{}/full/0/default.jpg", size, size);
    let response = get(&router(), &uri).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "region_too_large");
}

#[tokio::test]
async fn test_read_failure_is_500_without_cause() {
    let backend = MockBackend::new().with_slide(
        "broken",
        MockSlide::new(1000, 1000).with_read_error("bad huffman code at 0x1f00"),
    );
    let router = create_router(
        create_service(backend, CountingCompiler::new()),
        RouterConfig::new().with_tracing(false),
    );

    let response = get(&router, "/broken/0,0,64,64/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_security_headers(&response);

    let json = body_json(response).await;
    assert_eq!(json["error"], "image_read_error");
    assert_eq!(json["message"], "Error reading image file with ID 'broken'");
}

#[tokio::test]
async fn test_missing_profile_file_is_500_without_path() {
    let backend = MockBackend::new().with_slide(
        "at2",
        MockSlide::new(1000, 1000).with_profile("AT2"),
    );
    let compiler = IccTransformCompiler::new(ProfilePaths {
        at2: "/deploy/private/AT2.icm".into(),
        scanscope_v1: "/deploy/private/ScanScope v1.icm".into(),
        destination: None,
    });
    let router = create_router(
        create_service(backend, compiler),
        RouterConfig::new().with_tracing(false),
    );

    let response = get(&router, "/at2/0,0,64,64/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert!(body.contains("color_transform_error"));
    assert!(!body.contains("/deploy"));
    assert!(!body.contains("os error"));
}

#[tokio::test]
async fn test_tile_outside_image_still_renders() {
    let response = get(&router(), "/small/6400,6400,64,64/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(is_valid_jpeg(&body_bytes(response).await));
}

// =============================================================================
// Envelope options
// =============================================================================

#[tokio::test]
async fn test_frame_ancestors_in_csp() {
    let router = router_with(
        RouterConfig::new()
            .with_tracing(false)
            .with_frame_ancestors("https://viewer.example.org"),
    );

    let response = get(&router, "/slide_a/info.json").await;
    assert_eq!(
        response.headers()["content-security-policy"],
        "default-src 'self'; frame-ancestors https://viewer.example.org"
    );
}

#[tokio::test]
async fn test_base64_transport() {
    let router = router_with(
        RouterConfig::new()
            .with_tracing(false)
            .with_base64_transport(true),
    );

    let response = get(&router, "/slide_a/0,0,64,64/full/0/default.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    assert_eq!(response.headers()["content-transfer-encoding"], "base64");

    let body = body_bytes(response).await;
    let decoded = STANDARD.decode(&body).unwrap();
    assert!(is_valid_jpeg(&decoded));

    // JSON bodies are unaffected
    let response = get(&router, "/slide_a/info.json").await;
    assert!(response.headers().get("content-transfer-encoding").is_none());
    assert_eq!(body_json(response).await["width"], 46000);
}

// =============================================================================
// Health, viewer, fallback
// =============================================================================

#[tokio::test]
async fn test_health() {
    let response = get(&router(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_security_headers(&response);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_viewer_page() {
    let response = get(&router(), "/view/slide_a").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/html"));

    let csp = response.headers()["content-security-policy"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(csp.contains("https://cdn.jsdelivr.net"));
    assert!(csp.ends_with("frame-ancestors 'none'"));

    let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert!(html.contains("http://localhost:3000/slide_a/info.json"));
    assert!(html.contains("/slide_a/label.jpg"));
}

#[tokio::test]
async fn test_viewer_missing_slide_is_404() {
    let response = get(&router(), "/view/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_is_404_with_headers() {
    let response = get(&router(), "/slide_a/unknown.txt").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_security_headers(&response);
    assert_eq!(body_json(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_cors_preflight() {
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/slide_a/info.json")
        .header("origin", "https://viewer.example.org")
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap();

    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
