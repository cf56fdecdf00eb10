use std::path::Path;
use std::sync::Arc;

use image::RgbaImage;
use moxcms::{ColorProfile, Layout, TransformExecutor, TransformOptions};

use crate::error::TileError;

use super::profile::{ProfilePaths, ScannerProfile};

/// A compiled, reusable color conversion.
pub trait ColorTransform: Send + Sync {
    /// Convert `image` in place. Alpha is left untouched.
    fn apply(&self, image: &mut RgbaImage) -> Result<(), TileError>;
}

/// Builds the transform for a scanner profile. Called at most once per
/// profile by [`super::ColorTransformCache`]; may block on disk I/O.
pub trait TransformCompiler: Send + Sync {
    fn compile(&self, profile: ScannerProfile) -> Result<Arc<dyn ColorTransform>, TileError>;
}

/// ICC transform backed by `moxcms`.
pub struct IccTransform {
    executor: Arc<dyn TransformExecutor<u8> + Send + Sync>,
}

impl IccTransform {
    /// Transform from `source` to `destination` using the rendering intent
    /// declared in the source profile header.
    pub fn between(source: &ColorProfile, destination: &ColorProfile) -> Result<Self, TileError> {
        let executor = source
            .create_transform_8bit(
                Layout::Rgba,
                destination,
                Layout::Rgba,
                transform_options(source),
            )
            .map_err(|e| TileError::ColorTransform {
                message: format!("cannot build transform: {}", e),
            })?;
        Ok(Self {
            executor: executor.into(),
        })
    }
}

fn transform_options(source: &ColorProfile) -> TransformOptions {
    TransformOptions {
        rendering_intent: source.rendering_intent,
        ..TransformOptions::default()
    }
}

impl ColorTransform for IccTransform {
    fn apply(&self, image: &mut RgbaImage) -> Result<(), TileError> {
        let source = image.as_raw().clone();
        let destination: &mut [u8] = image;
        self.executor
            .transform(&source, destination)
            .map_err(|e| TileError::ColorTransform {
                message: format!("transform failed: {}", e),
            })
    }
}

/// Compiles scanner profiles read from [`ProfilePaths`].
pub struct IccTransformCompiler {
    paths: ProfilePaths,
}

impl IccTransformCompiler {
    pub fn new(paths: ProfilePaths) -> Self {
        Self { paths }
    }

    fn destination(&self) -> Result<ColorProfile, TileError> {
        match &self.paths.destination {
            Some(path) => load_profile(path),
            None => Ok(ColorProfile::new_srgb()),
        }
    }
}

impl TransformCompiler for IccTransformCompiler {
    fn compile(&self, profile: ScannerProfile) -> Result<Arc<dyn ColorTransform>, TileError> {
        let source = load_profile(self.paths.source(profile))?;
        let destination = self.destination()?;
        Ok(Arc::new(IccTransform::between(&source, &destination)?))
    }
}

fn load_profile(path: &Path) -> Result<ColorProfile, TileError> {
    let bytes = std::fs::read(path).map_err(|e| TileError::ColorTransform {
        message: format!("cannot read profile {}: {}", path.display(), e),
    })?;
    ColorProfile::new_from_slice(&bytes).map_err(|e| TileError::ColorTransform {
        message: format!("invalid profile {}: {}", path.display(), e),
    })
}
