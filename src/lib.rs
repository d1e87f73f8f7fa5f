//! # WSI Viewport
//!
//! A pyramidal viewport streaming engine for Whole Slide Image (WSI) viewers.
//!
//! Gigapixel pathology slides cannot be decoded whole; they are stored as
//! multi-resolution pyramids and read region by region. This library turns
//! such a pyramid into a smoothly pannable, zoomable on-screen view: it
//! decides which pyramid levels are worth fetching for the current viewport,
//! prefetches a "zoom stack" of regions centered on the point the user is
//! looking at, and picks the finest fetched level that still covers the
//! screen on every frame.
//!
//! ## Features
//!
//! - **Format-agnostic sources**: any decoder behind the [`TiledImageSource`]
//!   trait (OpenSlide bindings, TIFF parsers, network tile clients)
//! - **Zoom stack prefetching**: one region per usable level, centers spaced
//!   on a geometric ladder from the cursor toward the image center
//! - **Hysteresis level selection**: wheel zoom cannot oscillate between two
//!   adjacent levels, and pan never exposes unfetched image area
//! - **Concurrent fetches**: each region is split into sub-blocks read in
//!   parallel, with an LRU byte-bounded region cache in front of the source
//! - **Non-blocking rendering**: a background task rebuilds stale stacks
//!   while the render path only ever takes `Arc` snapshots
//!
//! ## Architecture
//!
//! The library is organized into two layers:
//!
//! - [`source`] - the pyramid boundary: [`TiledImageSource`], pixel blocks,
//!   the region cache, and a deterministic synthetic source for tests
//! - [`view`] - the engine: level geometry, the zoom stack and its builder,
//!   the level selector, and the event-facing [`ViewportEngine`]
//! - [`config`] - engine tunables and the CLI for the demo binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_viewport::{EngineConfig, SyntheticSource, ViewportEngine};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = ViewportEngine::new(EngineConfig::default()).unwrap();
//!     engine.on_resize(800, 600).await;
//!     engine
//!         .load(SyntheticSource::new(8000, 6000, 4))
//!         .await
//!         .unwrap();
//!     engine.start_updating().await;
//!
//!     // Hover moves the prefetch center; wheel zooms around it
//!     engine.on_hover(640.0, 480.0).await;
//!     engine.on_wheel(1).await;
//!
//!     if let Ok(frame) = engine.current_frame().await {
//!         println!(
//!             "level {} at {:?}, {}x{} px",
//!             frame.level,
//!             frame.position,
//!             frame.block.width(),
//!             frame.block.height()
//!         );
//!     }
//!     engine.stop_updating().await;
//! }
//! ```

pub mod config;
pub mod error;
pub mod source;
pub mod view;

// Re-export commonly used types
pub use config::{Cli, EngineConfig, DEFAULT_ZOOM_STEP};
pub use error::{BuildError, SourceError, ViewportError};
pub use source::{
    BlockCanvas, LevelInfo, PixelBlock, PyramidInfo, RegionCache, RegionKey, SyntheticSource,
    TiledImageSource, BYTES_PER_PIXEL, DEFAULT_REGION_CACHE_CAPACITY,
};
pub use view::{
    geomspace, level_centers, usable_levels, Frame, LevelGeometry, LevelSelector, ViewRect,
    ViewportEngine, ZoomStack, ZoomStackBuilder, ZoomStackCache, ZoomStackEntry,
    DEFAULT_HYSTERESIS, DEFAULT_WALK_CAP, DISTANCE_FLOOR,
};
