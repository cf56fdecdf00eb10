use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::BackendError;

use super::backend::PyramidImage;
use super::properties::PROPERTY_ICC_PROFILE;

/// An opened slide together with a snapshot of its metadata.
///
/// Immutable once built. Only [`SlideHandle::new`] can create one, and it
/// refuses pyramids that are empty or whose downsample factors decrease.
pub struct SlideHandle {
    image_id: String,
    width: u64,
    height: u64,
    downsamples: Vec<f64>,
    associated: Vec<String>,
    image: Arc<dyn PyramidImage>,
}

impl SlideHandle {
    pub fn new(image_id: &str, image: Arc<dyn PyramidImage>) -> Result<Self, BackendError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidPyramid(format!(
                "slide has empty dimensions {}x{}",
                width, height
            )));
        }

        let downsamples = image.level_downsamples().to_vec();
        if downsamples.is_empty() {
            return Err(BackendError::InvalidPyramid(
                "slide has no pyramid levels".to_string(),
            ));
        }
        if downsamples.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(BackendError::InvalidPyramid(format!(
                "invalid downsample factors {:?}",
                downsamples
            )));
        }
        if downsamples.windows(2).any(|w| w[1] < w[0]) {
            return Err(BackendError::InvalidPyramid(format!(
                "downsample factors are not ordered: {:?}",
                downsamples
            )));
        }

        let associated = image.associated_image_names();

        Ok(Self {
            image_id: image_id.to_string(),
            width,
            height,
            downsamples,
            associated,
            image,
        })
    }

    pub fn image_id(&self) -> &str {
        &self.image_id
    }

    pub fn dimensions(&self) -> (u64, u64) {
        (self.width, self.height)
    }

    pub fn level_count(&self) -> usize {
        self.downsamples.len()
    }

    pub fn downsamples(&self) -> &[f64] {
        &self.downsamples
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        self.image.properties()
    }

    pub fn has_associated_image(&self, name: &str) -> bool {
        self.associated.iter().any(|n| n == name)
    }

    pub fn associated_image_names(&self) -> &[String] {
        &self.associated
    }

    /// Scanner color profile declared by the slide, if any.
    pub fn icc_profile_name(&self) -> Option<&str> {
        self.properties()
            .get(PROPERTY_ICC_PROFILE)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// The backend image, for decoding on the blocking pool.
    pub fn image(&self) -> Arc<dyn PyramidImage> {
        Arc::clone(&self.image)
    }
}

impl fmt::Debug for SlideHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlideHandle")
            .field("image_id", &self.image_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("downsamples", &self.downsamples)
            .field("associated", &self.associated)
            .finish()
    }
}
