//! Slide property extraction.
//!
//! Aperio scanners store their metadata in the first directory's
//! ImageDescription as a pipe-separated string:
//!
//! ```text
//! Aperio Image Library v12.0.15
//! 46920x33600 (256x256) JPEG/RGB Q=70|AppMag = 20|MPP = 0.499|ICC Profile = AT2
//! ```
//!
//! The first segment is a free-form header (it can itself contain `=`), the
//! rest are `key = value` pairs. Each pair is exposed as `aperio.<key>`.

use std::collections::BTreeMap;

/// Property holding the raw ImageDescription of the first directory.
pub const PROPERTY_DESCRIPTION: &str = "tiff.ImageDescription";

/// Property naming the scanner color profile.
pub const PROPERTY_ICC_PROFILE: &str = "aperio.ICC Profile";

/// Property holding the scanner resolution in microns per pixel.
pub const PROPERTY_MPP: &str = "aperio.MPP";

/// Whether an ImageDescription was written by an Aperio scanner.
pub fn is_aperio(description: &str) -> bool {
    description.starts_with("Aperio")
}

/// Parse an Aperio ImageDescription into `aperio.*` properties.
///
/// Non-Aperio descriptions yield nothing.
pub fn parse_aperio_description(description: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    if !is_aperio(description) {
        return properties;
    }

    for part in description.split('|').skip(1) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        properties.insert(format!("aperio.{}", key), value.trim().to_string());
    }

    properties
}

/// Per-level facts exposed as `openslide.level[i].*` properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelProperties {
    pub width: u32,
    pub height: u32,
    pub downsample: f64,
    pub tile_width: u32,
    pub tile_height: u32,
}

/// Assemble the full property map for a TIFF slide.
pub fn slide_properties(
    description: Option<&str>,
    levels: &[LevelProperties],
) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();

    let vendor = match description {
        Some(description) => {
            properties.insert(PROPERTY_DESCRIPTION.to_string(), description.to_string());
            properties.extend(parse_aperio_description(description));
            if is_aperio(description) {
                "aperio"
            } else {
                "generic-tiff"
            }
        }
        None => "generic-tiff",
    };
    properties.insert("openslide.vendor".to_string(), vendor.to_string());
    properties.insert("openslide.level-count".to_string(), levels.len().to_string());

    for (i, level) in levels.iter().enumerate() {
        let prefix = format!("openslide.level[{}]", i);
        properties.insert(format!("{}.width", prefix), level.width.to_string());
        properties.insert(format!("{}.height", prefix), level.height.to_string());
        properties.insert(format!("{}.downsample", prefix), level.downsample.to_string());
        properties.insert(format!("{}.tile-width", prefix), level.tile_width.to_string());
        properties.insert(format!("{}.tile-height", prefix), level.tile_height.to_string());
    }

    let mpp = properties
        .get(PROPERTY_MPP)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0);
    if let Some(mpp) = mpp {
        properties.insert("openslide.mpp-x".to_string(), mpp.to_string());
        properties.insert("openslide.mpp-y".to_string(), mpp.to_string());
    }
    if let Some(mag) = properties.get("aperio.AppMag").cloned() {
        properties.insert("openslide.objective-power".to_string(), mag);
    }

    properties
}
