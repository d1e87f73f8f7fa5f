//! Test utilities for integration tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use wsi_viewport::{
    PixelBlock, SourceError, SyntheticSource, TiledImageSource, ViewportEngine,
};

// =============================================================================
// Counting Source
// =============================================================================

/// A synthetic source that counts `read_region` calls.
///
/// The counter is shared, so it stays observable after the source moves into
/// the engine.
pub struct CountingSource {
    inner: SyntheticSource,
    reads: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(width: u32, height: u32, level_count: usize) -> (Self, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: SyntheticSource::new(width, height, level_count),
                reads: reads.clone(),
            },
            reads,
        )
    }
}

#[async_trait]
impl TiledImageSource for CountingSource {
    fn level_count(&self) -> usize {
        self.inner.level_count()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.inner.level_dimensions(level)
    }

    fn level_downsamples(&self) -> Vec<f64> {
        self.inner.level_downsamples()
    }

    async fn read_region(
        &self,
        position: (i64, i64),
        level: usize,
        size: (u32, u32),
    ) -> Result<PixelBlock, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_region(position, level, size).await
    }
}

// =============================================================================
// Flaky Source
// =============================================================================

/// A synthetic source whose reads can be toggled to fail, for exercising
/// the transient-error retry path.
pub struct FlakySource {
    inner: SyntheticSource,
    failing: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl FlakySource {
    pub fn new(
        width: u32,
        height: u32,
        level_count: usize,
    ) -> (Self, Arc<AtomicBool>, Arc<AtomicUsize>) {
        let failing = Arc::new(AtomicBool::new(false));
        let reads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: SyntheticSource::new(width, height, level_count),
                failing: failing.clone(),
                reads: reads.clone(),
            },
            failing,
            reads,
        )
    }
}

#[async_trait]
impl TiledImageSource for FlakySource {
    fn level_count(&self) -> usize {
        self.inner.level_count()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.inner.level_dimensions(level)
    }

    fn level_downsamples(&self) -> Vec<f64> {
        self.inner.level_downsamples()
    }

    async fn read_region(
        &self,
        position: (i64, i64),
        level: usize,
        size: (u32, u32),
    ) -> Result<PixelBlock, SourceError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Read("transient decode failure".to_string()));
        }
        self.inner.read_region(position, level, size).await
    }
}

// =============================================================================
// Broken Source
// =============================================================================

/// A source that is either a valid synthetic pyramid or reports broken
/// metadata, for load-failure tests.
pub enum TestSource {
    Valid(SyntheticSource),
    NoLevels,
}

#[async_trait]
impl TiledImageSource for TestSource {
    fn level_count(&self) -> usize {
        match self {
            TestSource::Valid(s) => s.level_count(),
            TestSource::NoLevels => 0,
        }
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        match self {
            TestSource::Valid(s) => s.level_dimensions(level),
            TestSource::NoLevels => None,
        }
    }

    fn level_downsamples(&self) -> Vec<f64> {
        match self {
            TestSource::Valid(s) => s.level_downsamples(),
            TestSource::NoLevels => Vec::new(),
        }
    }

    async fn read_region(
        &self,
        position: (i64, i64),
        level: usize,
        size: (u32, u32),
    ) -> Result<PixelBlock, SourceError> {
        match self {
            TestSource::Valid(s) => s.read_region(position, level, size).await,
            TestSource::NoLevels => Err(SourceError::InvalidLevel {
                level,
                level_count: 0,
            }),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Wait until the engine's installed stack generation exceeds `after`.
///
/// Panics if no rebuild lands within the timeout; a test that expects no
/// rebuild should use [`assert_no_rebuild`] instead.
pub async fn wait_for_rebuild<S: TiledImageSource>(engine: &ViewportEngine<S>, after: u64) -> u64 {
    for _ in 0..400 {
        let generation = engine.stack_generation().await;
        if generation > after {
            return generation;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no rebuild landed after generation {after}");
}

/// Assert that no rebuild lands within a grace period.
pub async fn assert_no_rebuild<S: TiledImageSource>(engine: &ViewportEngine<S>, current: u64) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.stack_generation().await, current);
}
