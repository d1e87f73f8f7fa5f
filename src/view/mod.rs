//! Viewport engine internals.
//!
//! - [`geometry`]: usable levels, tile sizes, geometric center ladder
//! - [`stack`]: the zoom stack and its shared snapshot cache
//! - [`builder`]: stale-checked stack rebuilds with fan-out fetches
//! - [`selector`]: hysteresis-based active/goal level tracking
//! - [`controller`]: the event-facing engine and its background loop

mod builder;
mod controller;
mod geometry;
mod selector;
mod stack;

pub use builder::ZoomStackBuilder;
pub use controller::{Frame, ViewportEngine};
pub use geometry::{geomspace, level_centers, usable_levels, LevelGeometry, DISTANCE_FLOOR};
pub use selector::{LevelSelector, ViewRect, DEFAULT_HYSTERESIS, DEFAULT_WALK_CAP};
pub use stack::{ZoomStack, ZoomStackCache, ZoomStackEntry};
