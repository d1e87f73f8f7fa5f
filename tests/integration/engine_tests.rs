//! End-to-end engine tests.
//!
//! Each test drives a [`ViewportEngine`] over a synthetic 8000x6000 pyramid
//! with 4 levels (downsamples 1, 2, 4, 8) through an 800x600 viewport, where
//! all the geometry is exactly computable: the fit scale is 10 level-0 units
//! per device pixel and the coarsest usable level is 3.

use wsi_viewport::{EngineConfig, SyntheticSource, ViewportEngine, ViewportError};

use super::test_utils::{
    assert_no_rebuild, wait_for_rebuild, CountingSource, FlakySource, TestSource,
};

fn config() -> EngineConfig {
    EngineConfig {
        workers: 1,
        ..Default::default()
    }
}

async fn engine_8k() -> ViewportEngine<SyntheticSource> {
    let engine = ViewportEngine::new(config()).unwrap();
    engine.on_resize(800, 600).await;
    engine
        .load(SyntheticSource::new(8000, 6000, 4))
        .await
        .unwrap();
    engine.start_updating().await;
    wait_for_rebuild(&engine, 0).await;
    engine
}

// =============================================================================
// Overview and Zoom Session
// =============================================================================

#[tokio::test]
async fn test_overview_frame_is_coarsest_full_image() {
    let engine = engine_8k().await;

    let frame = engine.current_frame().await.unwrap();
    assert_eq!(frame.level, 3);
    assert_eq!(frame.position, (0.0, 0.0));
    assert_eq!(frame.display_scale, 8.0);
    assert_eq!(frame.block.width(), 1000);
    assert_eq!(frame.block.height(), 750);

    engine.stop_updating().await;
}

#[tokio::test]
async fn test_zoom_in_promotes_finer_level() {
    let engine = engine_8k().await;

    // At fit scale the coarsest extent maps exactly onto the viewport, so
    // the wheel requests a finer goal; the stack built at load time already
    // holds every level, so the walk promotes within the same frame.
    engine.on_wheel(1).await;
    assert_eq!(engine.goal_level().await, Some(2));

    let frame = engine.current_frame().await.unwrap();
    assert_eq!(frame.level, 2);
    assert_eq!(frame.display_scale, 4.0);

    engine.stop_updating().await;
}

#[tokio::test]
async fn test_zoom_in_noop_when_extent_exceeds_viewport() {
    let engine = engine_8k().await;

    engine.on_wheel(1).await;
    assert_eq!(engine.goal_level().await, Some(2));

    // After the first zoom-in the active entry's displayed extent exceeds
    // the viewport, so another wheel-in leaves the goal untouched.
    engine.on_wheel(1).await;
    assert_eq!(engine.goal_level().await, Some(2));

    engine.stop_updating().await;
}

#[tokio::test]
async fn test_wheel_pair_has_no_net_drift() {
    let engine = engine_8k().await;

    engine.on_wheel(1).await;
    assert_eq!(engine.goal_level().await, Some(2));

    // Zooming back out at the same position crosses the hysteresis
    // threshold in reverse and restores the original goal.
    engine.on_wheel(-1).await;
    assert_eq!(engine.goal_level().await, Some(3));

    engine.stop_updating().await;
}

#[tokio::test]
async fn test_frame_covers_viewport_after_zoom() {
    let engine = engine_8k().await;

    engine.on_wheel(1).await;
    let frame = engine.current_frame().await.unwrap();

    // Post-zoom scale is 5; the viewport spans [2000, 6000] x [1500, 4500]
    // in level-0 coordinates around the centered reference.
    let left = frame.position.0;
    let top = frame.position.1;
    let right = left + frame.block.width() as f64 * frame.display_scale;
    let bottom = top + frame.block.height() as f64 * frame.display_scale;
    assert!(left <= 2000.0 && top <= 1500.0);
    assert!(right >= 6000.0 && bottom >= 4500.0);

    engine.stop_updating().await;
}

// =============================================================================
// Staleness and Rebuilds
// =============================================================================

#[tokio::test]
async fn test_small_pan_does_not_rebuild() {
    let engine = engine_8k().await;
    let generation = engine.stack_generation().await;

    // 30 device pixels at scale 10 moves the reference 300 level-0 units,
    // below the 400-unit half-viewport threshold.
    engine.on_pan(30.0, 0.0).await;
    assert_no_rebuild(&engine, generation).await;

    engine.stop_updating().await;
}

#[tokio::test]
async fn test_half_viewport_pan_rebuilds_exactly_once() {
    let engine = engine_8k().await;
    let generation = engine.stack_generation().await;

    // 40 device pixels at scale 10 moves the reference exactly half the
    // viewport width; the threshold is inclusive.
    engine.on_pan(40.0, 0.0).await;
    let next = wait_for_rebuild(&engine, generation).await;
    assert_eq!(next, generation + 1);

    // The rebuilt stack satisfies the trigger; no further rebuilds follow.
    assert_no_rebuild(&engine, next).await;

    engine.stop_updating().await;
}

#[tokio::test]
async fn test_fresh_reference_issues_no_fetches() {
    let (source, reads) = CountingSource::new(8000, 6000, 4);
    let engine = ViewportEngine::new(config()).unwrap();
    engine.on_resize(800, 600).await;
    engine.load(source).await.unwrap();
    engine.start_updating().await;
    wait_for_rebuild(&engine, 0).await;

    // One worker, no sub-block split: one read per usable level
    let baseline = reads.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(baseline, 4);

    // A hover well inside the staleness threshold wakes the loop but the
    // rebuild is skipped without touching the source.
    engine.on_hover(410.0, 300.0).await;
    let generation = engine.stack_generation().await;
    assert_no_rebuild(&engine, generation).await;
    assert_eq!(reads.load(std::sync::atomic::Ordering::SeqCst), baseline);

    engine.stop_updating().await;
}

#[tokio::test]
async fn test_forced_rebuild_retries_through_transient_failure() {
    let (source, failing, reads) = FlakySource::new(8000, 6000, 4);
    let engine = ViewportEngine::new(config()).unwrap();
    engine.on_resize(800, 600).await;
    engine.load(source).await.unwrap();
    engine.start_updating().await;
    let generation = wait_for_rebuild(&engine, 0).await;

    // The source starts failing right before a resize forces a rebuild with
    // new geometry; every attempt errors out.
    failing.store(true, std::sync::atomic::Ordering::SeqCst);
    engine.on_resize(900, 700).await;
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    assert_eq!(engine.stack_generation().await, generation);

    // Once the source recovers, the loop must still be retrying the forced
    // rebuild and land a stack for the new geometry.
    let failed_reads = reads.load(std::sync::atomic::Ordering::SeqCst);
    failing.store(false, std::sync::atomic::Ordering::SeqCst);
    wait_for_rebuild(&engine, generation).await;
    assert!(reads.load(std::sync::atomic::Ordering::SeqCst) > failed_reads);

    engine.stop_updating().await;
}

// =============================================================================
// Load and Resize
// =============================================================================

#[tokio::test]
async fn test_failed_load_keeps_previous_image() {
    let engine = ViewportEngine::new(config()).unwrap();
    engine.on_resize(800, 600).await;
    engine
        .load(TestSource::Valid(SyntheticSource::new(8000, 6000, 4)))
        .await
        .unwrap();
    engine.start_updating().await;
    wait_for_rebuild(&engine, 0).await;

    // A pyramid with no levels is rejected at load time
    let result = engine.load(TestSource::NoLevels).await;
    assert!(matches!(result, Err(ViewportError::Load(_))));

    // The previous image still renders
    let frame = engine.current_frame().await.unwrap();
    assert_eq!(frame.level, 3);

    engine.stop_updating().await;
}

#[tokio::test]
async fn test_load_replaces_image() {
    let engine = engine_8k().await;
    let generation = engine.stack_generation().await;

    engine
        .load(SyntheticSource::new(4000, 4000, 3))
        .await
        .unwrap();
    wait_for_rebuild(&engine, generation).await;

    // New pyramid: levels (4000,4000) (2000,2000) (1000,1000) against an
    // 800x600 viewport give a coarsest usable level of 2.
    assert_eq!(engine.active_level().await, Some(2));
    assert_eq!(engine.reference_position().await, (2000.0, 2000.0));

    let frame = engine.current_frame().await.unwrap();
    assert_eq!(frame.level, 2);
    assert_eq!(frame.block.width(), 1000);

    engine.stop_updating().await;
}

#[tokio::test]
async fn test_resize_recomputes_usable_levels() {
    let engine = engine_8k().await;
    let generation = engine.stack_generation().await;

    // A 1600x1200 viewport pushes level 2 (smaller dimension 1500) below
    // the usable threshold; the coarsest usable level becomes 2.
    engine.on_resize(1600, 1200).await;
    assert_eq!(engine.active_level().await, Some(2));
    assert_eq!(engine.goal_level().await, Some(2));

    // Resize forces a rebuild of the smaller stack
    wait_for_rebuild(&engine, generation).await;
    let frame = engine.current_frame().await.unwrap();
    assert_eq!(frame.level, 2);

    engine.stop_updating().await;
}
