use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::error::TileError;

use super::profile::ScannerProfile;
use super::transform::{ColorTransform, TransformCompiler};

/// Lazily compiled color transforms, one per known scanner profile.
///
/// Each profile has a fixed cell. The first caller compiles on the blocking
/// pool while concurrent callers for the same profile wait on the cell, so a
/// profile is compiled once no matter how many slides share it. A failed
/// compile leaves the cell empty and is retried by the next caller.
pub struct ColorTransformCache {
    compiler: Arc<dyn TransformCompiler>,
    cells: HashMap<ScannerProfile, OnceCell<Arc<dyn ColorTransform>>>,
}

impl ColorTransformCache {
    pub fn new(compiler: Arc<dyn TransformCompiler>) -> Self {
        let cells = ScannerProfile::ALL
            .into_iter()
            .map(|profile| (profile, OnceCell::new()))
            .collect();
        Self { compiler, cells }
    }

    /// Transform for a slide's declared profile name.
    ///
    /// Returns `Ok(None)` for absent or unrecognized names, meaning the
    /// pixels pass through uncorrected.
    pub async fn get_transform(
        &self,
        profile_name: Option<&str>,
    ) -> Result<Option<Arc<dyn ColorTransform>>, TileError> {
        let Some(profile) = profile_name.and_then(ScannerProfile::from_name) else {
            return Ok(None);
        };
        let cell = self.cells.get(&profile).ok_or_else(|| TileError::Internal {
            message: format!("no transform slot for profile {}", profile.name()),
        })?;

        let transform = cell
            .get_or_try_init(|| async {
                let compiler = Arc::clone(&self.compiler);
                let transform = tokio::task::spawn_blocking(move || compiler.compile(profile))
                    .await
                    .map_err(|e| TileError::Internal {
                        message: format!("transform compile task failed: {}", e),
                    })??;
                info!(profile = profile.name(), "Compiled color transform");
                Ok::<_, TileError>(transform)
            })
            .await?;

        Ok(Some(Arc::clone(transform)))
    }

    /// Number of profiles compiled so far.
    pub fn compiled_count(&self) -> usize {
        self.cells.values().filter(|cell| cell.initialized()).count()
    }
}
