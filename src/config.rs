//! Engine configuration and the demo CLI.
//!
//! All tunables of the viewport engine live in [`EngineConfig`], with
//! defaults that match the behavior of the reference viewer: a 1.5x zoom
//! hysteresis band, a doubling zoom step, and a fetch worker pool sized to
//! the hardware. [`Cli`] is the clap parser for the headless demo binary;
//! every option can also be set via environment variables with the `WSIV_`
//! prefix.

use clap::Parser;

use crate::source::DEFAULT_REGION_CACHE_CAPACITY;
use crate::view::{DEFAULT_HYSTERESIS, DEFAULT_WALK_CAP};

// =============================================================================
// Default Values
// =============================================================================

/// Default per-wheel-notch zoom factor.
pub const DEFAULT_ZOOM_STEP: f64 = 2.0;

/// Default viewport width for the demo binary.
pub const DEFAULT_VIEW_WIDTH: u32 = 800;

/// Default viewport height for the demo binary.
pub const DEFAULT_VIEW_HEIGHT: u32 = 600;

/// Tunables for a [`crate::ViewportEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hysteresis factor between zoom-in and zoom-out level thresholds.
    ///
    /// Must exceed 1.0; the gap is what prevents a single scroll step from
    /// oscillating between two adjacent levels.
    pub hysteresis: f64,

    /// Scale factor applied to the view per wheel notch. Must exceed 1.0.
    pub zoom_step: f64,

    /// Maximum coverage-walk steps per render tick.
    pub walk_cap: usize,

    /// Fetch worker pool size; 0 selects the hardware concurrency.
    pub workers: usize,

    /// Region read cache capacity in bytes of decoded pixels.
    pub region_cache_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hysteresis: DEFAULT_HYSTERESIS,
            zoom_step: DEFAULT_ZOOM_STEP,
            walk_cap: DEFAULT_WALK_CAP,
            workers: 0,
            region_cache_bytes: DEFAULT_REGION_CACHE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.hysteresis <= 1.0 {
            return Err(format!(
                "hysteresis must be greater than 1.0, got {}",
                self.hysteresis
            ));
        }
        if self.zoom_step <= 1.0 {
            return Err(format!(
                "zoom_step must be greater than 1.0, got {}",
                self.zoom_step
            ));
        }
        if self.walk_cap == 0 {
            return Err("walk_cap must be greater than 0".to_string());
        }
        if self.region_cache_bytes == 0 {
            return Err("region_cache_bytes must be greater than 0".to_string());
        }
        Ok(())
    }

    /// The worker pool size to use, resolving 0 to the hardware concurrency.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Viewport - headless demo of the pyramidal viewport engine.
///
/// Loads a synthetic pyramidal image, drives the engine through a scripted
/// hover/zoom/pan session, and optionally writes the final frame as a JPEG.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-viewport")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    // =========================================================================
    // Image and Viewport
    // =========================================================================
    /// Level-0 width of the synthetic image.
    #[arg(long, default_value_t = 8000, env = "WSIV_IMAGE_WIDTH")]
    pub image_width: u32,

    /// Level-0 height of the synthetic image.
    #[arg(long, default_value_t = 6000, env = "WSIV_IMAGE_HEIGHT")]
    pub image_height: u32,

    /// Number of pyramid levels, each halving the previous.
    #[arg(long, default_value_t = 4, env = "WSIV_LEVELS")]
    pub levels: usize,

    /// Viewport width in device pixels.
    #[arg(long, default_value_t = DEFAULT_VIEW_WIDTH, env = "WSIV_VIEW_WIDTH")]
    pub view_width: u32,

    /// Viewport height in device pixels.
    #[arg(long, default_value_t = DEFAULT_VIEW_HEIGHT, env = "WSIV_VIEW_HEIGHT")]
    pub view_height: u32,

    // =========================================================================
    // Engine Tunables
    // =========================================================================
    /// Hysteresis factor between zoom-in and zoom-out level thresholds.
    #[arg(long, default_value_t = DEFAULT_HYSTERESIS, env = "WSIV_HYSTERESIS")]
    pub hysteresis: f64,

    /// Scale factor applied to the view per wheel notch.
    #[arg(long, default_value_t = DEFAULT_ZOOM_STEP, env = "WSIV_ZOOM_STEP")]
    pub zoom_step: f64,

    /// Fetch worker pool size; 0 selects the hardware concurrency.
    #[arg(long, default_value_t = 0, env = "WSIV_WORKERS")]
    pub workers: usize,

    /// Region cache capacity in bytes of decoded pixels.
    #[arg(long, default_value_t = DEFAULT_REGION_CACHE_CAPACITY, env = "WSIV_CACHE_BYTES")]
    pub cache_bytes: usize,

    // =========================================================================
    // Output
    // =========================================================================
    /// Write the final frame to this path as a JPEG.
    #[arg(short, long, env = "WSIV_OUTPUT")]
    pub output: Option<std::path::PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, default_value_t = false, env = "WSIV_VERBOSE")]
    pub verbose: bool,
}

impl Cli {
    /// Engine configuration derived from the CLI tunables.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            hysteresis: self.hysteresis,
            zoom_step: self.zoom_step,
            walk_cap: DEFAULT_WALK_CAP,
            workers: self.workers,
            region_cache_bytes: self.cache_bytes,
        }
    }

    /// Validate the demo parameters on top of the engine configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err("image dimensions must be non-zero".to_string());
        }
        if self.levels == 0 {
            return Err("levels must be greater than 0".to_string());
        }
        if self.view_width == 0 || self.view_height == 0 {
            return Err("viewport dimensions must be non-zero".to_string());
        }
        self.engine_config().validate()
    }
}
