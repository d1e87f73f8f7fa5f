//! Zoom stack construction tests through the public API.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use wsi_viewport::{
    EngineConfig, LevelGeometry, PyramidInfo, RegionCache, SyntheticSource, TiledImageSource,
    ViewportEngine, ZoomStackBuilder,
};

use super::test_utils::{wait_for_rebuild, CountingSource};

// =============================================================================
// Pyramid Invariants
// =============================================================================

#[test]
fn test_downsamples_monotonically_increasing() {
    for levels in 1..6 {
        let source = SyntheticSource::new(4096, 4096, levels);
        let ds = source.level_downsamples();
        assert_eq!(ds[0], 1.0);
        for w in ds.windows(2) {
            assert!(w[0] < w[1]);
        }
    }
}

#[tokio::test]
async fn test_same_point_same_color_across_levels() {
    let source = SyntheticSource::new(1024, 1024, 3);

    // Level-0 point (256, 128) read at each level; the gradient encodes the
    // level-0 position, so the R and G channels must agree.
    for level in 0..3 {
        let block = source
            .read_region((256, 128), level, (1, 1))
            .await
            .unwrap();
        let px = block.pixel(0, 0).unwrap();
        assert_eq!(px[0], 0); // 256 & 0xFF
        assert_eq!(px[1], 128);
    }
}

// =============================================================================
// Stack Construction
// =============================================================================

#[tokio::test]
async fn test_stack_dense_and_centered_on_reference() {
    let source = Arc::new(SyntheticSource::new(8000, 6000, 4));
    let pyramid = PyramidInfo::read(source.as_ref()).unwrap();
    let geometry = LevelGeometry::compute(800, 600, &pyramid).unwrap();
    let mut builder =
        ZoomStackBuilder::new(source, pyramid, Arc::new(RegionCache::new()), 2);

    // An off-center reference: every entry must still contain it
    let reference = (6000.0, 1200.0);
    let stack = builder
        .rebuild(&geometry, reference, true)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stack.len(), 4);
    let mut previous_downsample = 0.0;
    for (i, entry) in stack.entries().iter().enumerate() {
        assert_eq!(entry.level, i);
        assert!(entry.downsample > previous_downsample);
        previous_downsample = entry.downsample;
        assert!(entry.contains(reference.0, reference.1, reference.0, reference.1));
    }

    // The coarsest entry is always the whole image regardless of reference
    assert_eq!(stack.entry(3).unwrap().extent(), (0.0, 0.0, 8000.0, 6000.0));
}

#[tokio::test]
async fn test_finer_entries_hug_the_reference() {
    let source = Arc::new(SyntheticSource::new(8000, 6000, 4));
    let pyramid = PyramidInfo::read(source.as_ref()).unwrap();
    let geometry = LevelGeometry::compute(800, 600, &pyramid).unwrap();
    let mut builder =
        ZoomStackBuilder::new(source, pyramid, Arc::new(RegionCache::new()), 1);

    let reference = (6000.0, 1200.0);
    let stack = builder
        .rebuild(&geometry, reference, true)
        .await
        .unwrap()
        .unwrap();

    // Distance from each entry's center to the reference grows with level
    let center_distance = |level: usize| -> f64 {
        let (l, t, r, b) = stack.entry(level).unwrap().extent();
        let cx = (l + r) / 2.0;
        let cy = (t + b) / 2.0;
        ((cx - reference.0).powi(2) + (cy - reference.1).powi(2)).sqrt()
    };
    // Levels 0-2 share a tile size, so their centers are directly comparable;
    // the clamp at the image's right edge can only push centers toward the
    // interior, away from the off-center reference.
    assert!(center_distance(0) <= center_distance(1));
    assert!(center_distance(1) <= center_distance(2));
}

// =============================================================================
// Region Cache Across Rebuilds
// =============================================================================

#[tokio::test]
async fn test_resize_rebuild_reuses_cached_regions() {
    let (source, reads) = CountingSource::new(8000, 6000, 4);
    let engine = ViewportEngine::new(EngineConfig {
        workers: 1,
        ..Default::default()
    })
    .unwrap();
    engine.on_resize(800, 600).await;
    engine.load(source).await.unwrap();
    engine.start_updating().await;
    let generation = wait_for_rebuild(&engine, 0).await;
    let baseline = reads.load(Ordering::SeqCst);

    // A resize to the same dimensions forces a rebuild of identical regions,
    // all served by the region cache.
    engine.on_resize(800, 600).await;
    wait_for_rebuild(&engine, generation).await;
    assert_eq!(reads.load(Ordering::SeqCst), baseline);

    engine.stop_updating().await;
}
