//! Zoom stack and its shared cache.
//!
//! A [`ZoomStack`] is one complete set of per-level fetches built around a
//! reference position: one entry per usable level, dense from level 0 to the
//! coarsest usable level. Stacks are immutable once built; the builder
//! installs a whole replacement into the [`ZoomStackCache`] and readers take
//! `Arc` snapshots, so no reader ever observes a partially updated map.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::source::PixelBlock;

// =============================================================================
// Stack Entries
// =============================================================================

/// One fetched level of a zoom stack.
#[derive(Debug, Clone)]
pub struct ZoomStackEntry {
    /// Pyramid level this entry was read from
    pub level: usize,

    /// Top-left corner of the read region, in level-0 coordinates
    pub position: (f64, f64),

    /// Downsample factor of the level, the entry's display scale
    pub downsample: f64,

    /// The fetched pixels, `tile_size` level-local pixels
    pub block: PixelBlock,
}

impl ZoomStackEntry {
    /// Extent of this entry in level-0 coordinates: `(left, top, right,
    /// bottom)`.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let (x, y) = self.position;
        (
            x,
            y,
            x + self.block.width() as f64 * self.downsample,
            y + self.block.height() as f64 * self.downsample,
        )
    }

    /// Whether this entry's extent contains the given level-0 rectangle on
    /// all four sides.
    pub fn contains(&self, left: f64, top: f64, right: f64, bottom: f64) -> bool {
        let (el, et, er, eb) = self.extent();
        el <= left && et <= top && er >= right && eb >= bottom
    }
}

// =============================================================================
// ZoomStack
// =============================================================================

/// A complete set of per-level fetches around one reference position.
///
/// Entries are dense over `0..=coarsest_level`; the entry index is the level
/// index.
#[derive(Debug, Clone, Default)]
pub struct ZoomStack {
    /// The reference position this stack was built for, level-0 coordinates
    pub reference: (f64, f64),

    /// Monotonic build counter, for ordering installs in logs and tests
    pub generation: u64,

    entries: Vec<ZoomStackEntry>,
}

impl ZoomStack {
    /// Assemble a stack from per-level entries.
    ///
    /// Entries must already be sorted by level and dense from 0; the builder
    /// produces them that way.
    pub fn new(reference: (f64, f64), generation: u64, entries: Vec<ZoomStackEntry>) -> Self {
        debug_assert!(entries.iter().enumerate().all(|(i, e)| e.level == i));
        Self {
            reference,
            generation,
            entries,
        }
    }

    /// Entry for a level, or `None` past the coarsest usable level.
    pub fn entry(&self, level: usize) -> Option<&ZoomStackEntry> {
        self.entries.get(level)
    }

    /// Number of entries (`coarsest_level + 1`).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, finest first.
    pub fn entries(&self) -> &[ZoomStackEntry] {
        &self.entries
    }
}

// =============================================================================
// ZoomStackCache
// =============================================================================

/// Shared snapshot cell between the rebuild loop and the render path.
///
/// Single writer (the background builder), any number of readers. The lock
/// scope is the `Arc` swap or clone only; neither side ever holds it across
/// a fetch or a render. Installs are totally ordered; a reader sees either
/// the previous complete stack or the next one, never a mix.
#[derive(Debug, Default)]
pub struct ZoomStackCache {
    current: Mutex<Arc<ZoomStack>>,
}

impl ZoomStackCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current stack.
    pub async fn install(&self, stack: ZoomStack) {
        let mut current = self.current.lock().await;
        *current = Arc::new(stack);
    }

    /// Snapshot the current stack.
    pub async fn read(&self) -> Arc<ZoomStack> {
        self.current.lock().await.clone()
    }

    /// Drop the current stack. Called when a new image is loaded.
    pub async fn clear(&self) {
        let mut current = self.current.lock().await;
        *current = Arc::new(ZoomStack::default());
    }
}
