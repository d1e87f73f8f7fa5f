//! Zoom stack construction.
//!
//! The builder turns a reference position into a full [`ZoomStack`]: one
//! region read per usable level, centered along the geometric ladder of
//! [`level_centers`]. It owns the staleness test that amortizes the expensive
//! multi-level fetch across small mouse movements, and the sub-block fan-out
//! that keeps a single large read from serializing on one worker.
//!
//! The builder has no side effects beyond its own bookkeeping: a finished
//! stack is returned to the caller, which decides whether to install it into
//! the shared cache.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{BuildError, SourceError};
use crate::source::{BlockCanvas, PixelBlock, PyramidInfo, RegionCache, RegionKey, TiledImageSource};
use crate::view::geometry::{level_centers, LevelGeometry};
use crate::view::stack::{ZoomStack, ZoomStackEntry};

/// Builds zoom stacks around a moving reference position.
///
/// One builder instance is owned by the background rebuild loop; it is the
/// single writer feeding the shared stack cache.
pub struct ZoomStackBuilder<S: TiledImageSource> {
    source: Arc<S>,
    pyramid: PyramidInfo,
    regions: Arc<RegionCache>,
    workers: usize,
    last_reference: Option<(f64, f64)>,
    generation: u64,
}

impl<S: TiledImageSource> ZoomStackBuilder<S> {
    /// Create a builder over a loaded source.
    ///
    /// `workers` bounds the sub-block fan-out; pass the hardware concurrency.
    pub fn new(
        source: Arc<S>,
        pyramid: PyramidInfo,
        regions: Arc<RegionCache>,
        workers: usize,
    ) -> Self {
        Self {
            source,
            pyramid,
            regions,
            workers: workers.max(1),
            last_reference: None,
            generation: 0,
        }
    }

    /// Whether the reference has drifted far enough from the last build to
    /// warrant a rebuild.
    ///
    /// The threshold is half the viewport on either axis; a drift of exactly
    /// half triggers. The first build is always stale.
    pub fn is_stale(&self, reference: (f64, f64), view: (u32, u32)) -> bool {
        match self.last_reference {
            None => true,
            Some((lx, ly)) => {
                (reference.0 - lx).abs() >= view.0 as f64 / 2.0
                    || (reference.1 - ly).abs() >= view.1 as f64 / 2.0
            }
        }
    }

    /// Build a fresh stack for `reference`, or return `Ok(None)` when the
    /// previous build is still fresh.
    ///
    /// Steps 1-3 of the rebuild only run when `force` is set, this is the
    /// first build, or the staleness test passes; otherwise no fetches are
    /// issued at all.
    ///
    /// # Errors
    ///
    /// A failed fetch aborts this attempt as a recoverable
    /// [`BuildError::Stale`]; the builder's bookkeeping is untouched so the
    /// next trigger retries from the same state.
    pub async fn rebuild(
        &mut self,
        geometry: &LevelGeometry,
        reference: (f64, f64),
        force: bool,
    ) -> Result<Option<ZoomStack>, BuildError> {
        if !force && !self.is_stale(reference, geometry.view_size()) {
            return Ok(None);
        }

        let coarsest = geometry.coarsest_level();
        let centers = level_centers(&self.pyramid, coarsest, reference);

        let mut entries = Vec::with_capacity(coarsest + 1);
        for (level, center) in centers.into_iter().enumerate() {
            let tile = geometry
                .tile_size(level)
                .expect("centers and tile sizes share the level range");
            let info = self
                .pyramid
                .level(level)
                .expect("usable levels lie within the pyramid");
            let downsample = info.downsample;

            let position = self.read_position(center, tile, level);
            let block = self
                .fetch_region(level, position, tile, reference)
                .await?;

            entries.push(ZoomStackEntry {
                level,
                position: (position.0 as f64, position.1 as f64),
                downsample,
                block,
            });
        }

        self.last_reference = Some(reference);
        self.generation += 1;
        debug!(
            generation = self.generation,
            ref_x = reference.0,
            ref_y = reference.1,
            levels = entries.len(),
            "zoom stack rebuilt"
        );

        Ok(Some(ZoomStack::new(reference, self.generation, entries)))
    }

    /// Forget the last build so the next attempt is unconditionally stale.
    pub fn invalidate(&mut self) {
        self.last_reference = None;
    }

    /// Build counter of the last successful rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Continue the build counter from an earlier builder, keeping install
    /// ordering monotonic across image loads.
    pub fn resume_from(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Derive the level-0 top-left read position for a level's tile.
    ///
    /// The nominal position centers the tile on the ladder point. Positions
    /// hugging the image edge are clamped into bounds; a fetch only fails
    /// when the tile genuinely exceeds the level, which can happen
    /// transiently between a resize and the geometry catching up.
    fn read_position(&self, center: (f64, f64), tile: (u32, u32), level: usize) -> (i64, i64) {
        let info = self.pyramid.level(level).expect("level within pyramid");
        let ds = info.downsample;

        let clamp_axis = |center: f64, tile: u32, level_dim: u32| -> i64 {
            let extent = tile as f64 * ds;
            let nominal = center - extent / 2.0;
            if tile <= level_dim {
                let max = (level_dim - tile) as f64 * ds;
                nominal.clamp(0.0, max).round() as i64
            } else {
                // Cannot fit; leave it for the source to reject
                nominal.round() as i64
            }
        };

        (
            clamp_axis(center.0, tile.0, info.width),
            clamp_axis(center.1, tile.1, info.height),
        )
    }

    /// Fetch one level's tile, through the region cache, partitioned across
    /// the worker pool on a miss.
    ///
    /// The tile is split into an `s x s` grid with `s*s` the nearest integer
    /// square not exceeding the worker count; each cell is an independent
    /// `read_region` writing a disjoint destination region.
    async fn fetch_region(
        &self,
        level: usize,
        position: (i64, i64),
        size: (u32, u32),
        reference: (f64, f64),
    ) -> Result<PixelBlock, BuildError> {
        let key = RegionKey::new(position, level, size);
        if let Some(block) = self.regions.get(&key).await {
            return Ok(block);
        }

        let stale = |source: SourceError| BuildError::Stale {
            level,
            ref_x: reference.0,
            ref_y: reference.1,
            source,
        };

        let info = self.pyramid.level(level).expect("level within pyramid");
        let ds = info.downsample;
        let side = (self.workers as f64).sqrt().floor() as u32;
        let side = side.max(1);

        let cols = split_axis(size.0, side);
        let rows = split_axis(size.1, side);

        let mut handles = Vec::with_capacity(cols.len() * rows.len());
        for &(row_off, row_len) in &rows {
            for &(col_off, col_len) in &cols {
                let sub_position = (
                    position.0 + (col_off as f64 * ds).round() as i64,
                    position.1 + (row_off as f64 * ds).round() as i64,
                );
                let source = self.source.clone();
                handles.push((
                    col_off,
                    row_off,
                    tokio::spawn(async move {
                        source
                            .read_region(sub_position, level, (col_len, row_len))
                            .await
                    }),
                ));
            }
        }

        let mut canvas = BlockCanvas::new(size.0, size.1);
        let mut failure: Option<BuildError> = None;
        for (col_off, row_off, handle) in handles {
            match handle.await {
                Ok(Ok(block)) => {
                    if failure.is_none() {
                        canvas.blit(&block, col_off, row_off);
                    }
                }
                Ok(Err(e)) => {
                    if failure.is_none() {
                        warn!(level, error = %e, "sub-block fetch failed");
                        failure = Some(stale(e));
                    }
                }
                Err(join) => {
                    if failure.is_none() {
                        failure = Some(BuildError::Worker {
                            level,
                            message: join.to_string(),
                        });
                    }
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let block = canvas.freeze();
        self.regions.put(key, block.clone()).await;
        Ok(block)
    }
}

/// Split `len` pixels into at most `parts` contiguous runs of near-equal
/// size, returned as `(offset, len)` pairs. Zero-length runs are dropped.
fn split_axis(len: u32, parts: u32) -> Vec<(u32, u32)> {
    let parts = parts.min(len).max(1);
    let base = len / parts;
    let extra = len % parts;

    let mut runs = Vec::with_capacity(parts as usize);
    let mut offset = 0;
    for i in 0..parts {
        let run = base + u32::from(i < extra);
        if run > 0 {
            runs.push((offset, run));
            offset += run;
        }
    }
    runs
}
