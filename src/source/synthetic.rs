//! Deterministic in-memory pyramid source.
//!
//! `SyntheticSource` renders a coordinate-derived gradient pattern at every
//! level, with exact bounds checking. The engine is decoder-agnostic by
//! design, so this source doubles as the demo binary's input and as the
//! ground truth for geometry tests: the color at a pixel encodes its level-0
//! position, which makes misplaced reads visible in assertions.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::source::pixel::{PixelBlock, BYTES_PER_PIXEL};
use crate::source::reader::TiledImageSource;

/// An in-memory pyramidal test-pattern source.
///
/// Level `n` has dimensions `level0 >> n` and downsample `2^n`.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    level_count: usize,
}

impl SyntheticSource {
    /// Create a source with the given level-0 dimensions and level count.
    ///
    /// Dimensions at the coarsest level must remain non-zero; callers should
    /// keep `level_count` below `log2(min(width, height))`.
    pub fn new(width: u32, height: u32, level_count: usize) -> Self {
        debug_assert!(level_count > 0);
        debug_assert!(width >> (level_count - 1) > 0 && height >> (level_count - 1) > 0);
        Self {
            width,
            height,
            level_count,
        }
    }
}

#[async_trait]
impl TiledImageSource for SyntheticSource {
    fn level_count(&self) -> usize {
        self.level_count
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        if level >= self.level_count {
            return None;
        }
        Some((self.width >> level, self.height >> level))
    }

    fn level_downsamples(&self) -> Vec<f64> {
        (0..self.level_count).map(|l| (1u64 << l) as f64).collect()
    }

    async fn read_region(
        &self,
        position: (i64, i64),
        level: usize,
        size: (u32, u32),
    ) -> Result<PixelBlock, SourceError> {
        let (level_width, level_height) =
            self.level_dimensions(level)
                .ok_or(SourceError::InvalidLevel {
                    level,
                    level_count: self.level_count,
                })?;

        let downsample = 1i64 << level;
        let (x0, y0) = (position.0 / downsample, position.1 / downsample);
        let (w, h) = size;

        let out_of_bounds = position.0 < 0
            || position.1 < 0
            || x0 + w as i64 > level_width as i64
            || y0 + h as i64 > level_height as i64;
        if out_of_bounds {
            return Err(SourceError::RegionOutOfBounds {
                level,
                x: position.0,
                y: position.1,
                width: w,
                height: h,
                level_width,
                level_height,
            });
        }

        // Gradient pattern derived from level-0 coordinates, so the same
        // physical point has the same color at every level.
        let mut buf = vec![0u8; w as usize * h as usize * BYTES_PER_PIXEL];
        for row in 0..h as i64 {
            for col in 0..w as i64 {
                let full_x = (x0 + col) * downsample;
                let full_y = (y0 + row) * downsample;
                let idx = (row as usize * w as usize + col as usize) * BYTES_PER_PIXEL;
                buf[idx] = (full_x & 0xFF) as u8;
                buf[idx + 1] = (full_y & 0xFF) as u8;
                buf[idx + 2] = (level as u8).wrapping_mul(40);
                buf[idx + 3] = 255;
            }
        }

        Ok(PixelBlock::from_raw(w, h, buf.into()).expect("buffer sized to dimensions"))
    }
}
