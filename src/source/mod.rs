//! Pyramidal image source layer.
//!
//! This module is the engine's boundary with the outside world:
//!
//! - [`TiledImageSource`]: the trait a pyramidal decoder implements
//! - [`PyramidInfo`]: validated per-load snapshot of the pyramid structure
//! - [`PixelBlock`]: immutable RGBA blocks flowing out of a source
//! - [`RegionCache`]: LRU cache of decoded regions in front of the source
//! - [`SyntheticSource`]: deterministic in-memory source for demos and tests

mod pixel;
mod reader;
mod region_cache;
mod synthetic;

pub use pixel::{BlockCanvas, PixelBlock, BYTES_PER_PIXEL};
pub use reader::{LevelInfo, PyramidInfo, TiledImageSource};
pub use region_cache::{RegionCache, RegionKey, DEFAULT_REGION_CACHE_CAPACITY};
pub use synthetic::SyntheticSource;
