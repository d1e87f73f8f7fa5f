use thiserror::Error;

/// Errors reported by a tiled image source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Requested region exceeds the bounds of a pyramid level
    #[error(
        "Region out of bounds at level {level}: requested {width}x{height} at ({x}, {y}), \
         level is {level_width}x{level_height}"
    )]
    RegionOutOfBounds {
        level: usize,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        level_width: u32,
        level_height: u32,
    },

    /// Level index is outside the pyramid
    #[error("Invalid level: {level} (source has {level_count} levels)")]
    InvalidLevel { level: usize, level_count: usize },

    /// The source could not be read or decoded
    #[error("Read error: {0}")]
    Read(String),
}

/// Errors that can occur while building a zoom stack.
///
/// A stale build is recoverable by design: the geometry that produced it may
/// simply lag behind a resize or load, and the background loop retries on its
/// next cycle.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// A per-level fetch failed; the attempt is discarded and retried later
    #[error("Stale build at level {level}, reference ({ref_x:.1}, {ref_y:.1}): {source}")]
    Stale {
        level: usize,
        ref_x: f64,
        ref_y: f64,
        source: SourceError,
    },

    /// A fetch worker task panicked or was cancelled
    #[error("Fetch worker failed at level {level}: {message}")]
    Worker { level: usize, message: String },
}

/// Errors surfaced by the viewport engine to the UI layer.
#[derive(Debug, Clone, Error)]
pub enum ViewportError {
    /// The pyramidal source failed validation on load (fatal for this load)
    #[error("Load failed: {0}")]
    Load(String),

    /// No image has been loaded yet
    #[error("No image loaded")]
    NoImage,

    /// No frame is available for the requested level yet
    #[error("No frame available for level {level}")]
    NoFrame { level: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_out_of_bounds_display() {
        let err = SourceError::RegionOutOfBounds {
            level: 2,
            x: -10,
            y: 0,
            width: 800,
            height: 600,
            level_width: 500,
            level_height: 400,
        };
        let msg = err.to_string();
        assert!(msg.contains("level 2"));
        assert!(msg.contains("800x600"));
        assert!(msg.contains("(-10, 0)"));
    }

    #[test]
    fn test_stale_build_carries_context() {
        let err = BuildError::Stale {
            level: 1,
            ref_x: 1234.5,
            ref_y: 678.9,
            source: SourceError::Read("truncated".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("level 1"));
        assert!(msg.contains("1234.5"));
        assert!(msg.contains("truncated"));
    }
}
