//! Viewer page: an OpenSeadragon viewer driven by the slide's IIIF
//! `info.json`, with the label image and scan metadata in a side panel.

use std::collections::BTreeMap;

use url::Url;

use crate::tile::ImageInfo;

/// Where the OpenSeadragon script and its button images are loaded from.
pub const OPENSEADRAGON_CDN: &str = "https://cdn.jsdelivr.net";
const OPENSEADRAGON_BASE: &str = "https://cdn.jsdelivr.net/npm/openseadragon@4.1/build/openseadragon";

/// Escape HTML special characters to prevent XSS attacks.
fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Quote `s` as a JavaScript string literal that is safe inside `<script>`.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string())
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
}

/// Content-Security-Policy directives for the viewer page (without
/// `frame-ancestors`, which the envelope appends).
///
/// Tiles are fetched from the image service URL in `info.json`, which may be
/// a different origin than the page.
pub fn viewer_policy(info: &ImageInfo) -> String {
    let api_origin = Url::parse(&info.id)
        .ok()
        .map(|url| url.origin())
        .filter(|origin| origin.is_tuple())
        .map(|origin| format!(" {}", origin.ascii_serialization()))
        .unwrap_or_default();

    format!(
        "default-src 'self'; script-src 'self' 'unsafe-inline' {cdn}; \
         style-src 'self' 'unsafe-inline'; img-src 'self' data: blob: {cdn}{api}; \
         connect-src 'self'{api}",
        cdn = OPENSEADRAGON_CDN,
        api = api_origin,
    )
}

/// Generate the viewer page for `image_id`.
///
/// `properties` supplies the optional scan metadata shown in the panel
/// (`aperio.AppMag`, `aperio.MPP`).
pub fn generate_viewer_html(
    image_id: &str,
    info: &ImageInfo,
    properties: &BTreeMap<String, String>,
) -> String {
    let escaped_image_id = html_escape(image_id);
    let info_url = js_string(&format!("{}/info.json", info.id.trim_end_matches('/')));
    let label_url = html_escape(&format!("/{}/label.jpg", urlencoding::encode(image_id)));

    let tile_size = info.tiles.first().map(|t| t.width).unwrap_or_default();
    let level_count = info
        .tiles
        .first()
        .map(|t| t.scale_factors.len())
        .unwrap_or_default();

    let mut scan_meta = String::new();
    if let Some(mag) = properties.get("aperio.AppMag") {
        scan_meta.push_str(&format!(
            "Magnification: <span>{}x</span><br>\n            ",
            html_escape(mag)
        ));
    }
    if let Some(mpp) = properties.get("aperio.MPP") {
        scan_meta.push_str(&format!(
            "Resolution: <span>{}</span> &micro;m/px<br>\n            ",
            html_escape(mpp)
        ));
    }

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Slide Viewer - {escaped_image_id}</title>
    <script src="{osd_base}.min.js"></script>
    <style>
        * {{
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }}
        body {{
            background: #0f0f0f;
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, sans-serif;
            overflow: hidden;
        }}
        #viewer {{
            width: 100vw;
            height: 100vh;
        }}
        .info-panel {{
            position: absolute;
            top: 16px;
            left: 16px;
            background: rgba(0, 0, 0, 0.85);
            color: #fff;
            padding: 16px 20px;
            border-radius: 8px;
            font-size: 13px;
            line-height: 1.5;
            border: 1px solid rgba(255, 255, 255, 0.1);
            max-width: 320px;
            z-index: 1000;
        }}
        .info-panel h2 {{
            font-size: 14px;
            font-weight: 600;
            margin-bottom: 8px;
            word-break: break-all;
        }}
        .info-panel .meta {{
            color: rgba(255, 255, 255, 0.7);
            font-size: 12px;
        }}
        .info-panel .meta span {{
            color: rgba(255, 255, 255, 0.9);
        }}
        .info-panel img {{
            display: block;
            max-width: 100%;
            max-height: 160px;
            margin-top: 10px;
            border-radius: 4px;
        }}
        .error-banner {{
            position: absolute;
            top: 0;
            left: 0;
            right: 0;
            background: rgba(220, 38, 38, 0.95);
            color: white;
            padding: 12px 20px;
            font-size: 14px;
            z-index: 1001;
            display: none;
        }}
        .error-banner.visible {{
            display: block;
        }}
    </style>
</head>
<body>
    <div id="error-banner" class="error-banner">Failed to load tiles</div>

    <div id="viewer"></div>

    <div class="info-panel">
        <h2>{escaped_image_id}</h2>
        <div class="meta">
            <span>{width}</span> x <span>{height}</span> px<br>
            <span>{level_count}</span> pyramid levels<br>
            {scan_meta}Tile size: <span>{tile_size}</span> px
        </div>
        <img id="label" src="{label_url}" alt="Slide label">
    </div>

    <script>
        document.getElementById('label').addEventListener('error', function() {{
            this.remove();
        }});

        const viewer = OpenSeadragon({{
            id: "viewer",
            prefixUrl: "{osd_base}/images/",
            tileSources: {info_url},
            showNavigator: true,
            navigatorPosition: "BOTTOM_RIGHT",
            showRotationControl: true,
            maxZoomPixelRatio: 2,
            visibilityRatio: 0.5,
            constrainDuringPan: true,
            crossOriginPolicy: "Anonymous"
        }});

        viewer.addHandler('tile-load-failed', function() {{
            document.getElementById('error-banner').classList.add('visible');
        }});
    </script>
</body>
</html>"##,
        escaped_image_id = escaped_image_id,
        osd_base = OPENSEADRAGON_BASE,
        width = info.width,
        height = info.height,
        level_count = level_count,
        tile_size = tile_size,
        scan_meta = scan_meta,
        label_url = label_url,
        info_url = info_url,
    )
}
