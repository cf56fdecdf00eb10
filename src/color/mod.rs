//! Scanner color management.
//!
//! Slides declare the color profile of the scanner that produced them in the
//! `aperio.ICC Profile` property. Tiles from a known scanner are converted
//! to the output profile; anything else passes through untouched.

mod cache;
mod profile;
mod transform;

pub use cache::ColorTransformCache;
pub use profile::{ProfilePaths, ScannerProfile, DEFAULT_AT2_PROFILE, DEFAULT_SCANSCOPE_PROFILE};
pub use transform::{ColorTransform, IccTransform, IccTransformCompiler, TransformCompiler};
