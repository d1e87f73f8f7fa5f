//! Level selection policy.
//!
//! The selector tracks two levels: the `active` level currently rendered and
//! the `goal` level requested by zoom input. Wheel events move the goal under
//! a hysteresis band so a single scroll step cannot oscillate between two
//! adjacent levels; the coverage walk then converges the active level toward
//! the goal one step per tick, preferring finer resolution but never at the
//! cost of exposing unfetched image area.

use tracing::warn;

use crate::view::stack::ZoomStack;

/// Default hysteresis factor between the zoom-in and zoom-out thresholds.
pub const DEFAULT_HYSTERESIS: f64 = 1.5;

/// Default bound on coverage-walk steps per tick.
///
/// The promote/demote pair can in principle alternate for pathological
/// viewport-to-level ratios; persistence past this cap is a geometry bug and
/// is logged rather than looped on.
pub const DEFAULT_WALK_CAP: usize = 32;

/// A viewport rectangle in level-0 coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Hysteresis-based active/goal level tracker.
#[derive(Debug, Clone)]
pub struct LevelSelector {
    active: usize,
    goal: usize,
    coarsest: usize,
    hysteresis: f64,
    walk_cap: usize,
}

impl LevelSelector {
    /// Create a selector for a stack whose coarsest usable level is
    /// `coarsest`. Both levels start there: the first frames come from the
    /// cheap overview while finer levels stream in.
    pub fn new(coarsest: usize, hysteresis: f64, walk_cap: usize) -> Self {
        Self {
            active: coarsest,
            goal: coarsest,
            coarsest,
            hysteresis,
            walk_cap,
        }
    }

    /// The level currently rendered.
    pub fn active_level(&self) -> usize {
        self.active
    }

    /// The level zoom input is converging toward.
    pub fn goal_level(&self) -> usize {
        self.goal
    }

    /// Adopt a new coarsest usable level after a resize or load.
    ///
    /// Both levels restart at the coarsest; the walk re-derives the right
    /// active level from coverage on the next ticks.
    pub fn reset(&mut self, coarsest: usize) {
        self.coarsest = coarsest;
        self.active = coarsest;
        self.goal = coarsest;
    }

    /// Apply a wheel event.
    ///
    /// `extent` is the active level's displayed extent in viewport pixels at
    /// the time of the event; `view` is the viewport size. Zooming in
    /// requests a finer goal only once the extent no longer over-covers the
    /// viewport; zooming out requests a coarser goal only once the extent
    /// exceeds the viewport by the hysteresis factor. Ratios inside the band
    /// leave the goal untouched, which is what keeps an in/out pair at the
    /// same ratio drift-free.
    ///
    /// Every wheel event forces the active level back to the coarsest so the
    /// coverage walk can re-descend without ever exposing unfetched area.
    pub fn on_wheel(&mut self, zoom_in: bool, extent: (f64, f64), view: (u32, u32)) {
        let (vw, vh) = (view.0 as f64, view.1 as f64);
        if zoom_in {
            if extent.0 <= vw && extent.1 <= vh {
                self.goal = self.goal.saturating_sub(1);
            }
        } else if extent.0 / self.hysteresis > vw || extent.1 / self.hysteresis > vh {
            self.goal = (self.goal + 1).min(self.coarsest);
        }
        self.active = self.coarsest;
    }

    /// Apply a pan release: optimistically step one level finer and let the
    /// coverage walk correct it if that was wrong.
    pub fn on_pan_release(&mut self) {
        self.active = self.active.saturating_sub(1);
    }

    /// One tick of the coverage walk.
    ///
    /// Promotes the active level to the finest candidate between the goal and
    /// the active level whose fetched region fully contains the viewport;
    /// demotes it one step at a time while the active region leaves any part
    /// of the viewport exposed. Returns the resulting active level.
    pub fn coverage_walk(&mut self, stack: &ZoomStack, view: ViewRect) -> usize {
        let contains = |level: usize| -> bool {
            stack
                .entry(level)
                .map(|e| e.contains(view.left, view.top, view.right, view.bottom))
                .unwrap_or(false)
        };

        let mut steps = 0;
        loop {
            steps += 1;
            if steps > self.walk_cap {
                warn!(
                    active = self.active,
                    goal = self.goal,
                    cap = self.walk_cap,
                    "coverage walk exceeded its step cap; level geometry is inconsistent"
                );
                break;
            }

            // Promote: finest sufficient candidate wins, minimizing blur.
            let lo = self.goal.min(self.active);
            let promoted = (lo..self.active).find(|&candidate| contains(candidate));
            if let Some(candidate) = promoted {
                self.active = candidate;
                break;
            }

            // Demote on exposure: never render an unfetched corner.
            if !contains(self.active) {
                if self.active < self.coarsest {
                    self.active += 1;
                    continue;
                }
                // Nothing coarser exists
                break;
            }

            break;
        }

        self.active
    }
}
