//! TiledImageSource trait for format-agnostic pyramid access.
//!
//! This module defines the `TiledImageSource` trait, the seam between the
//! viewport engine and whatever library actually decodes the pyramidal image
//! (OpenSlide bindings, a TIFF parser, a network tile client). The engine
//! treats decoding as an opaque capability: it only needs level metadata and
//! a region read.
//!
//! # Coordinate conventions
//!
//! - `read_region` positions are **level-0** pixel coordinates (the
//!   convention of the usual WSI libraries), regardless of the level read.
//! - Sizes are **level-local** pixels: a 512x512 read at level 2 with
//!   downsample 4 covers 2048x2048 level-0 pixels.
//!
//! # Thread safety
//!
//! A source handle is read-only after load and is shared across fetch
//! workers without additional locking. Implementations must support
//! concurrent `read_region` calls; this is an explicit precondition.

use async_trait::async_trait;

use crate::error::{SourceError, ViewportError};
use crate::source::pixel::PixelBlock;

// =============================================================================
// TiledImageSource Trait
// =============================================================================

/// Format-agnostic interface to a pyramidal image.
///
/// Level 0 is always the highest resolution. Downsample factors must start at
/// 1.0 and be strictly increasing with the level index; [`PyramidInfo::read`]
/// enforces this at load time.
#[async_trait]
pub trait TiledImageSource: Send + Sync + 'static {
    /// Number of pyramid levels.
    fn level_count(&self) -> usize;

    /// Dimensions of a level in its own pixels, or `None` if out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Downsample factors relative to level 0, one per level.
    fn level_downsamples(&self) -> Vec<f64>;

    /// Index of the level with the largest downsample not exceeding `factor`.
    ///
    /// Falls back to level 0 when `factor` is below every level's downsample.
    fn best_level_for_downsample(&self, factor: f64) -> usize {
        let downsamples = self.level_downsamples();
        let mut best = 0;
        for (level, ds) in downsamples.iter().enumerate() {
            if *ds <= factor {
                best = level;
            }
        }
        best
    }

    /// Read a rectangular region of pixels.
    ///
    /// # Arguments
    ///
    /// * `position` - Top-left corner in level-0 coordinates
    /// * `level` - Pyramid level to read from
    /// * `size` - Region size in level-local pixels
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::RegionOutOfBounds`] if any part of the region
    /// falls outside the level, [`SourceError::InvalidLevel`] for a bad level
    /// index.
    async fn read_region(
        &self,
        position: (i64, i64),
        level: usize,
        size: (u32, u32),
    ) -> Result<PixelBlock, SourceError>;
}

// =============================================================================
// Pyramid Metadata
// =============================================================================

/// Metadata for one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    /// Width of this level in its own pixels
    pub width: u32,

    /// Height of this level in its own pixels
    pub height: u32,

    /// Downsample factor relative to level 0 (1.0 for level 0)
    pub downsample: f64,
}

/// Validated snapshot of a source's pyramid structure.
///
/// Captured once per load so the geometry and selection code can work
/// synchronously off plain data instead of going back to the source.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidInfo {
    levels: Vec<LevelInfo>,
}

impl PyramidInfo {
    /// Snapshot and validate a source's pyramid metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ViewportError::Load`] when the source has no levels, a level
    /// reports no dimensions, the level-0 downsample is not 1, or downsamples
    /// are not strictly increasing.
    pub fn read<S: TiledImageSource + ?Sized>(source: &S) -> Result<Self, ViewportError> {
        let count = source.level_count();
        if count == 0 {
            return Err(ViewportError::Load("source has no pyramid levels".into()));
        }

        let downsamples = source.level_downsamples();
        if downsamples.len() != count {
            return Err(ViewportError::Load(format!(
                "source reports {} levels but {} downsamples",
                count,
                downsamples.len()
            )));
        }
        if (downsamples[0] - 1.0).abs() > f64::EPSILON {
            return Err(ViewportError::Load(format!(
                "level 0 downsample must be 1.0, got {}",
                downsamples[0]
            )));
        }
        for i in 1..count {
            if downsamples[i] <= downsamples[i - 1] {
                return Err(ViewportError::Load(format!(
                    "downsamples must be strictly increasing: level {} has {}, level {} has {}",
                    i - 1,
                    downsamples[i - 1],
                    i,
                    downsamples[i]
                )));
            }
        }

        let mut levels = Vec::with_capacity(count);
        for (level, downsample) in downsamples.into_iter().enumerate() {
            let (width, height) = source.level_dimensions(level).ok_or_else(|| {
                ViewportError::Load(format!("level {level} reports no dimensions"))
            })?;
            if width == 0 || height == 0 {
                return Err(ViewportError::Load(format!(
                    "level {level} has degenerate dimensions {width}x{height}"
                )));
            }
            levels.push(LevelInfo {
                width,
                height,
                downsample,
            });
        }

        Ok(Self { levels })
    }

    /// Number of pyramid levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Metadata for one level, or `None` if out of range.
    pub fn level(&self, level: usize) -> Option<LevelInfo> {
        self.levels.get(level).copied()
    }

    /// All levels, finest first.
    pub fn levels(&self) -> &[LevelInfo] {
        &self.levels
    }

    /// Level-0 dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        let l0 = self.levels[0];
        (l0.width, l0.height)
    }

    /// Center of the full image in level-0 coordinates.
    pub fn center(&self) -> (f64, f64) {
        let (w, h) = self.dimensions();
        (w as f64 / 2.0, h as f64 / 2.0)
    }
}
