//! Slide access layer.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! └────────────────────┬────────────────────┘
//!                      │ resolve(image_id)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              SlideCache                 │
//! │  (LRU of SlideHandles, single flight)   │
//! └────────────────────┬────────────────────┘
//!                      │ open(image_id)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        PyramidBackend / PyramidImage    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   TiffBackend over SlideSource (S3)     │
//! └─────────────────────────────────────────┘
//! ```

mod backend;
mod cache;
mod handle;
pub mod properties;
mod s3_source;
mod tiff_reader;

pub use backend::{PyramidBackend, PyramidImage, SlideSource};
pub use cache::{SlideCache, DEFAULT_SLIDE_CAPACITY};
pub use handle::SlideHandle;
pub use s3_source::S3SlideSource;
pub use tiff_reader::{TiffBackend, TiffSlide};
