//! Level geometry for the zoom stack.
//!
//! Pure functions deciding, from the viewport size and the pyramid metadata,
//! which levels are worth fetching and how large each level's output tile
//! should be. Everything here is synchronous and side-effect free; the
//! builder and selector consume the resulting [`LevelGeometry`] snapshot.
//!
//! # Usable levels
//!
//! Descending from level 0, a level stays "above" the viewport while its
//! smaller dimension still exceeds the viewport's larger dimension; the first
//! level at or below that threshold displays the whole image at native or
//! magnified resolution and anchors the stack as its coarsest entry. With
//! `n` levels above the threshold, the usable level indices are `0..=n` (the
//! coarsest usable index is `n`, clamped to the pyramid's last level).
//!
//! # Tile sizes
//!
//! The coarsest usable level's tile is the level's full dimensions: the whole
//! image, heavily downsampled, cheap to hold. Every finer level's tile is the
//! viewport scaled by `2 * coarsest_max_dim / max(view_w, view_h)`; the
//! factor of 2 is a panning buffer so small mouse movements don't force an
//! immediate rebuild.

use crate::source::PyramidInfo;

/// Floor applied to the reference-to-center distance before computing the
/// geometric ladder, so a zero distance keeps the progression finite.
pub const DISTANCE_FLOOR: f64 = 1.0;

/// Near end of the geometric ladder, in level-0 pixels from the image center.
const LADDER_START: f64 = 0.1;

// =============================================================================
// Usable Levels
// =============================================================================

/// Count the levels, starting from level 0, whose smaller dimension exceeds
/// the viewport's larger dimension.
///
/// The returned count is also the index of the coarsest usable level (before
/// clamping to the pyramid's last level): levels `0..count` are displayed
/// reduced, level `count` fits the viewport whole.
pub fn usable_levels(view: (u32, u32), pyramid: &PyramidInfo) -> usize {
    let threshold = view.0.max(view.1);
    pyramid
        .levels()
        .iter()
        .take_while(|l| l.width.min(l.height) > threshold)
        .count()
}

// =============================================================================
// LevelGeometry
// =============================================================================

/// Per-viewport snapshot of stack geometry.
///
/// Recomputed whenever the viewport resizes or a new image loads.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelGeometry {
    view: (u32, u32),
    coarsest_level: usize,
    tile_sizes: Vec<(u32, u32)>,
}

impl LevelGeometry {
    /// Compute the geometry for a viewport and pyramid.
    ///
    /// Returns `None` for a degenerate (zero-sized) viewport; before first
    /// layout there is nothing meaningful to fetch.
    pub fn compute(view_width: u32, view_height: u32, pyramid: &PyramidInfo) -> Option<Self> {
        if view_width == 0 || view_height == 0 {
            return None;
        }

        let view = (view_width, view_height);
        let coarsest_level = usable_levels(view, pyramid).min(pyramid.level_count() - 1);

        let coarsest = pyramid
            .level(coarsest_level)
            .expect("coarsest level clamped to pyramid range");
        let resize_factor =
            2.0 * coarsest.width.max(coarsest.height) as f64 / view_width.max(view_height) as f64;

        let mut tile_sizes = Vec::with_capacity(coarsest_level + 1);
        for level in 0..=coarsest_level {
            if level == coarsest_level {
                tile_sizes.push((coarsest.width, coarsest.height));
            } else {
                tile_sizes.push((
                    (view_width as f64 * resize_factor).round() as u32,
                    (view_height as f64 * resize_factor).round() as u32,
                ));
            }
        }

        Some(Self {
            view,
            coarsest_level,
            tile_sizes,
        })
    }

    /// Viewport size this geometry was computed for.
    pub fn view_size(&self) -> (u32, u32) {
        self.view
    }

    /// Index of the coarsest usable level.
    pub fn coarsest_level(&self) -> usize {
        self.coarsest_level
    }

    /// Number of usable levels (`coarsest_level + 1`).
    pub fn usable_level_count(&self) -> usize {
        self.coarsest_level + 1
    }

    /// Output tile size for a usable level, in level-local pixels.
    pub fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.tile_sizes.get(level).copied()
    }
}

// =============================================================================
// Geometric Ladder
// =============================================================================

/// `n` points spaced geometrically from `start` to `stop`, both positive.
///
/// A single point collapses to `start`, matching the usual geomspace
/// convention.
pub fn geomspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    debug_assert!(start > 0.0 && stop > 0.0);
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let ratio = (stop / start).powf(1.0 / (n - 1) as f64);
            (0..n).map(|i| start * ratio.powi(i as i32)).collect()
        }
    }
}

/// Compute the read center for every usable level, finest first.
///
/// Centers lie on a virtual line from the reference position (near end) to
/// the image center (far end). Each level's center sits `ladder[level]`
/// level-0 pixels from the reference, with the ladder spaced geometrically
/// from [`LADDER_START`] out to the full reference-to-center distance:
/// consecutive centers crowd together near the reference as levels get
/// finer, so the point of interest dominates the finest levels while the
/// coarsest level lands exactly on the image center.
///
/// The x and y axes are treated independently; the sign of each axis offset
/// follows which side of the image center the reference lies on. A reference
/// exactly at the center yields centers exactly at the center: the offset
/// direction is zero even though the ladder distance is floored to
/// [`DISTANCE_FLOOR`].
pub fn level_centers(
    pyramid: &PyramidInfo,
    coarsest_level: usize,
    reference: (f64, f64),
) -> Vec<(f64, f64)> {
    let image_center = pyramid.center();
    let points = coarsest_level + 1;

    let axis = |center: f64, reference: f64| -> Vec<f64> {
        let delta = reference - center;
        let direction = if delta == 0.0 { 0.0 } else { delta.signum() };
        let distance = delta.abs().max(DISTANCE_FLOOR);
        let ladder = geomspace(LADDER_START, distance, points);
        // ladder[0] hugs the reference and belongs to the finest level
        ladder
            .into_iter()
            .map(|offset| reference - direction * offset)
            .collect()
    };

    let xs = axis(image_center.0, reference.0);
    let ys = axis(image_center.1, reference.1);
    xs.into_iter().zip(ys).collect()
}
