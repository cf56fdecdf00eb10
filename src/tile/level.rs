//! Pyramid level selection.
//!
//! Scanner pyramids have near-integer but rarely exact downsample ratios
//! (4.0002, 15.9987, ...). Both sides of every comparison are rounded to the
//! nearest integer first, so calibration noise never pushes a request onto a
//! coarser level than intended.

/// Pick the level to decode for a requested downsample.
///
/// Returns the highest-resolution level whose rounded downsample does not
/// exceed the rounded request: the first level `i` where
/// `round(requested) < round(downsamples[i])` yields `i - 1` (or 0), and a
/// request beyond every level yields the last one. An empty slice yields 0.
pub fn select_level(downsamples: &[f64], requested: f64) -> usize {
    let requested = requested.round();

    for (i, downsample) in downsamples.iter().enumerate() {
        if requested < downsample.round() {
            return i.saturating_sub(1);
        }
    }

    downsamples.len().saturating_sub(1)
}

/// Integer downsample a region asks for: how many source pixels per output
/// pixel along its longer side, never less than 1.
pub fn requested_downsample(width: u64, height: u64, tile_size: u32) -> u64 {
    let tile_size = u64::from(tile_size.max(1));
    (width / tile_size).max(height / tile_size).max(1)
}

/// Side of the source window to decode at the selected level.
///
/// Decoding this many level pixels and scaling them to `tile_size` covers
/// `tile_size * requested` full-resolution pixels.
pub fn source_window(tile_size: u32, requested: u64, level_downsample: f64) -> u64 {
    let divisor = (level_downsample.round() as u64).max(1);
    u64::from(tile_size).saturating_mul(requested) / divisor
}
