//! Viewport engine: event translation and the background rebuild loop.
//!
//! [`ViewportEngine`] is the entry point the UI layer talks to. It translates
//! device events (wheel, pan, hover, resize) into the engine's model (view
//! transform, reference position, goal level), owns the shared zoom stack
//! cache, and runs the background loop that keeps the stack coherent with a
//! moving reference position.
//!
//! # Concurrency
//!
//! One dedicated task owns the rebuild loop and is the cache's single writer.
//! The loop is self-re-arming: after installing a stack it immediately checks
//! again, and once the stack is fresh it parks on a [`Notify`] that every
//! input event signals. The render path (`current_frame`) only ever takes
//! snapshots; the state lock is never held across a fetch.
//!
//! In-flight rebuilds are not cancelled by a load: the result is checked
//! against the load epoch and simply discarded when superseded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::ViewportError;
use crate::source::{PixelBlock, PyramidInfo, RegionCache, TiledImageSource};
use crate::view::builder::ZoomStackBuilder;
use crate::view::geometry::LevelGeometry;
use crate::view::selector::{LevelSelector, ViewRect};
use crate::view::stack::ZoomStackCache;

/// Pause between retries after a failed (stale) rebuild attempt.
const RETRY_DELAY: Duration = Duration::from_millis(10);

// =============================================================================
// Frame
// =============================================================================

/// What the renderer draws on a tick.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The active level's fetched pixels
    pub block: PixelBlock,

    /// The level's downsample factor; scale the block by this to map it into
    /// level-0 coordinates
    pub display_scale: f64,

    /// Level-0 position of the block's top-left corner
    pub position: (f64, f64),

    /// The pyramid level the block came from
    pub level: usize,
}

// =============================================================================
// Internal State
// =============================================================================

struct LoadedImage<S> {
    source: Arc<S>,
    pyramid: PyramidInfo,
    regions: Arc<RegionCache>,
    /// None while the viewport is degenerate (zero-sized)
    geometry: Option<LevelGeometry>,
    /// Bumped on every load so superseded rebuilds are discarded
    epoch: u64,
}

struct EngineState<S> {
    image: Option<LoadedImage<S>>,
    /// Visible render surface in device pixels
    view: (u32, u32),
    /// Level-0 units per device pixel
    scale: f64,
    /// Level-0 coordinates of the viewport's top-left corner
    origin: (f64, f64),
    /// The point the user is looking at, level-0 coordinates
    reference: (f64, f64),
    selector: Option<LevelSelector>,
    /// Set when an image loads before the first layout; the next
    /// non-degenerate resize performs the deferred fit-to-view
    pending_fit: bool,
    next_epoch: u64,
}

impl<S> EngineState<S> {
    /// Viewport bounds in level-0 coordinates.
    fn view_rect(&self) -> ViewRect {
        ViewRect {
            left: self.origin.0,
            top: self.origin.1,
            right: self.origin.0 + self.view.0 as f64 * self.scale,
            bottom: self.origin.1 + self.view.1 as f64 * self.scale,
        }
    }

    /// Recompute geometry and reset the selector for the current viewport.
    fn refresh_geometry(&mut self, config: &EngineConfig) {
        if let Some(image) = self.image.as_mut() {
            image.geometry = LevelGeometry::compute(self.view.0, self.view.1, &image.pyramid);
            self.selector = image.geometry.as_ref().map(|g| {
                LevelSelector::new(g.coarsest_level(), config.hysteresis, config.walk_cap)
            });
        }
    }

    /// Displayed extent of the active level in viewport pixels.
    ///
    /// Falls back to the geometry's tile size when the stack has no entry for
    /// the active level yet.
    fn active_extent_px(&self, stack: &crate::view::stack::ZoomStack) -> Option<(f64, f64)> {
        let selector = self.selector.as_ref()?;
        let image = self.image.as_ref()?;
        let geometry = image.geometry.as_ref()?;
        let active = selector.active_level();

        let extent_l0 = if let Some(entry) = stack.entry(active) {
            let (l, t, r, b) = entry.extent();
            (r - l, b - t)
        } else {
            let (tw, th) = geometry.tile_size(active)?;
            let ds = image.pyramid.level(active)?.downsample;
            (tw as f64 * ds, th as f64 * ds)
        };

        Some((extent_l0.0 / self.scale, extent_l0.1 / self.scale))
    }
}

// =============================================================================
// ViewportEngine
// =============================================================================

struct Shared<S> {
    state: RwLock<EngineState<S>>,
    stack: ZoomStackCache,
    wake: Notify,
    running: AtomicBool,
    force_rebuild: AtomicBool,
    /// Generation of the last installed stack, seeding new builders so the
    /// counter never runs backwards
    last_generation: AtomicU64,
}

/// The pyramidal viewport streaming engine.
///
/// Generic over the tiled source so the same engine drives local decoders,
/// network tile clients, and the in-memory test sources.
pub struct ViewportEngine<S: TiledImageSource> {
    config: EngineConfig,
    shared: Arc<Shared<S>>,
    updater: Mutex<Option<JoinHandle<()>>>,
}

impl<S: TiledImageSource> ViewportEngine<S> {
    /// Create an engine with no image loaded.
    pub fn new(config: EngineConfig) -> Result<Self, ViewportError> {
        config.validate().map_err(ViewportError::Load)?;
        Ok(Self {
            config,
            shared: Arc::new(Shared {
                state: RwLock::new(EngineState {
                    image: None,
                    view: (0, 0),
                    scale: 1.0,
                    origin: (0.0, 0.0),
                    reference: (0.0, 0.0),
                    selector: None,
                    pending_fit: false,
                    next_epoch: 0,
                }),
                stack: ZoomStackCache::new(),
                wake: Notify::new(),
                running: AtomicBool::new(false),
                force_rebuild: AtomicBool::new(false),
                last_generation: AtomicU64::new(0),
            }),
            updater: Mutex::new(None),
        })
    }

    /// (Re)initialize the engine with a new image.
    ///
    /// Validates the source's pyramid, fits the view to the whole image
    /// (deferred to the first resize when no layout has happened yet),
    /// centers the reference position, and forces a rebuild. On failure the
    /// previous image stays loaded and displayed.
    ///
    /// # Errors
    ///
    /// [`ViewportError::Load`] when the pyramid metadata is invalid
    /// (no levels, non-monotonic downsamples).
    pub async fn load(&self, source: S) -> Result<(), ViewportError> {
        let pyramid = PyramidInfo::read(&source)?;
        let (width, height) = pyramid.dimensions();

        let mut state = self.shared.state.write().await;
        let epoch = state.next_epoch;
        state.next_epoch += 1;

        state.image = Some(LoadedImage {
            source: Arc::new(source),
            pyramid: pyramid.clone(),
            regions: Arc::new(RegionCache::with_capacity(self.config.region_cache_bytes)),
            geometry: None,
            epoch,
        });

        // Fit the whole image into the viewport and look at its center. A
        // load before the first layout defers the fit to the first resize.
        if state.view.0 > 0 && state.view.1 > 0 {
            state.scale = (width as f64 / state.view.0 as f64)
                .max(height as f64 / state.view.1 as f64);
            state.pending_fit = false;
        } else {
            state.pending_fit = true;
        }
        state.reference = pyramid.center();
        state.origin = (
            state.reference.0 - state.view.0 as f64 * state.scale / 2.0,
            state.reference.1 - state.view.1 as f64 * state.scale / 2.0,
        );
        state.refresh_geometry(&self.config);
        drop(state);

        self.shared.stack.clear().await;
        self.shared.force_rebuild.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();

        info!(width, height, epoch, "image loaded");
        Ok(())
    }

    /// Adopt a new render surface size.
    pub async fn on_resize(&self, width: u32, height: u32) {
        let mut state = self.shared.state.write().await;
        state.view = (width, height);
        if state.pending_fit && width > 0 && height > 0 {
            // Deferred fit: the image loaded before the first layout
            if let Some((iw, ih)) = state.image.as_ref().map(|i| i.pyramid.dimensions()) {
                state.scale =
                    (iw as f64 / width as f64).max(ih as f64 / height as f64);
                state.reference = (iw as f64 / 2.0, ih as f64 / 2.0);
            }
            state.pending_fit = false;
        }
        // Keep the reference point where it was; re-center the window on it
        state.origin = (
            state.reference.0 - width as f64 * state.scale / 2.0,
            state.reference.1 - height as f64 * state.scale / 2.0,
        );
        state.refresh_geometry(&self.config);
        drop(state);

        self.shared.force_rebuild.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
        debug!(width, height, "viewport resized");
    }

    /// Update the reference position from a mouse hover at viewport
    /// coordinates `(x, y)`.
    pub async fn on_hover(&self, x: f64, y: f64) {
        let mut state = self.shared.state.write().await;
        if state.image.is_none() {
            return;
        }
        state.reference = (
            state.origin.0 + x * state.scale,
            state.origin.1 + y * state.scale,
        );
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Apply a completed drag of `(dx, dy)` viewport pixels.
    ///
    /// Moves the view window, re-derives the reference from the window
    /// center, and optimistically steps the active level one finer; the
    /// coverage walk corrects the guess if it exposed an edge.
    pub async fn on_pan(&self, dx: f64, dy: f64) {
        let mut state = self.shared.state.write().await;
        if state.image.is_none() {
            return;
        }
        state.origin = (
            state.origin.0 - dx * state.scale,
            state.origin.1 - dy * state.scale,
        );
        state.reference = (
            state.origin.0 + state.view.0 as f64 * state.scale / 2.0,
            state.origin.1 + state.view.1 as f64 * state.scale / 2.0,
        );
        if let Some(selector) = state.selector.as_mut() {
            selector.on_pan_release();
        }
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Apply a wheel notch; positive `delta_sign` zooms in.
    ///
    /// The level transition is decided from the active level's displayed
    /// extent at the moment of the event, then the view scale changes around
    /// the reference point so it stays put on screen.
    pub async fn on_wheel(&self, delta_sign: i32) {
        if delta_sign == 0 {
            return;
        }
        let stack = self.shared.stack.read().await;

        let mut state = self.shared.state.write().await;
        if state.image.is_none() || state.view.0 == 0 || state.view.1 == 0 {
            return;
        }

        let zoom_in = delta_sign > 0;
        let view = state.view;
        if let (Some(extent), Some(selector)) =
            (state.active_extent_px(&stack), state.selector.as_mut())
        {
            selector.on_wheel(zoom_in, extent, view);
        }

        let factor = if zoom_in {
            1.0 / self.config.zoom_step
        } else {
            self.config.zoom_step
        };
        // Keep the reference point fixed on screen across the zoom
        let screen = (
            (state.reference.0 - state.origin.0) / state.scale,
            (state.reference.1 - state.origin.1) / state.scale,
        );
        state.scale *= factor;
        state.origin = (
            state.reference.0 - screen.0 * state.scale,
            state.reference.1 - screen.1 * state.scale,
        );
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Run one tick of the coverage walk against the installed stack.
    ///
    /// Returns the resulting active level, or `None` before the first load
    /// or while the viewport is degenerate. Harmless to call at any rate;
    /// [`Self::current_frame`] runs it implicitly.
    pub async fn tick(&self) -> Option<usize> {
        let stack = self.shared.stack.read().await;

        let mut state = self.shared.state.write().await;
        if state.image.is_none() {
            return None;
        }
        let view_rect = state.view_rect();
        let selector = state.selector.as_mut()?;
        Some(selector.coverage_walk(&stack, view_rect))
    }

    /// Run one render tick: the coverage walk followed by frame selection.
    ///
    /// # Errors
    ///
    /// [`ViewportError::NoImage`] before the first load,
    /// [`ViewportError::NoFrame`] while the stack has no entry for the
    /// active level (transiently, before the first rebuild lands).
    pub async fn current_frame(&self) -> Result<Frame, ViewportError> {
        let stack = self.shared.stack.read().await;

        let mut state = self.shared.state.write().await;
        if state.image.is_none() {
            return Err(ViewportError::NoImage);
        }
        let view_rect = state.view_rect();
        let Some(selector) = state.selector.as_mut() else {
            // Degenerate viewport: no geometry, nothing to draw yet
            return Err(ViewportError::NoFrame { level: 0 });
        };
        let active = selector.coverage_walk(&stack, view_rect);
        drop(state);

        let entry = stack
            .entry(active)
            .ok_or(ViewportError::NoFrame { level: active })?;
        Ok(Frame {
            block: entry.block.clone(),
            display_scale: entry.downsample,
            position: entry.position,
            level: entry.level,
        })
    }

    /// Start the background rebuild loop; forces an immediate rebuild.
    ///
    /// Idempotent: a second call while running is a no-op.
    pub async fn start_updating(&self) {
        let mut updater = self.updater.lock().await;
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.force_rebuild.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let workers = self.config.effective_workers();
        *updater = Some(tokio::spawn(async move {
            update_loop(shared, workers).await;
        }));
        debug!("background updater started");
    }

    /// Permanently halt the background loop (until the next
    /// `start_updating`). Used when the viewer widget is hidden.
    pub async fn stop_updating(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake.notify_one();
        if let Some(handle) = self.updater.lock().await.take() {
            let _ = handle.await;
        }
        debug!("background updater stopped");
    }

    /// The current reference position in level-0 coordinates.
    pub async fn reference_position(&self) -> (f64, f64) {
        self.shared.state.read().await.reference
    }

    /// The currently rendered level.
    pub async fn active_level(&self) -> Option<usize> {
        let state = self.shared.state.read().await;
        state.selector.as_ref().map(|s| s.active_level())
    }

    /// The level zoom input is converging toward.
    pub async fn goal_level(&self) -> Option<usize> {
        let state = self.shared.state.read().await;
        state.selector.as_ref().map(|s| s.goal_level())
    }

    /// Generation counter of the installed stack; 0 before the first build.
    pub async fn stack_generation(&self) -> u64 {
        self.shared.stack.read().await.generation
    }
}

// =============================================================================
// Background Loop
// =============================================================================

/// The rebuild loop: snapshot state, rebuild if stale, install, re-arm.
async fn update_loop<S: TiledImageSource>(shared: Arc<Shared<S>>, workers: usize) {
    // Builder is recreated whenever a new image epoch appears
    let mut builder: Option<(u64, ZoomStackBuilder<S>)> = None;

    while shared.running.load(Ordering::SeqCst) {
        // Snapshot everything the rebuild needs, then drop the lock
        let snapshot = {
            let state = shared.state.read().await;
            state.image.as_ref().and_then(|image| {
                image.geometry.clone().map(|geometry| {
                    (
                        image.epoch,
                        image.source.clone(),
                        image.pyramid.clone(),
                        image.regions.clone(),
                        geometry,
                        state.reference,
                    )
                })
            })
        };

        let Some((epoch, source, pyramid, regions, geometry, reference)) = snapshot else {
            // Nothing loaded or degenerate viewport: park until an event
            shared.wake.notified().await;
            continue;
        };

        if builder.as_ref().map(|(e, _)| *e) != Some(epoch) {
            let mut next = ZoomStackBuilder::new(source, pyramid, regions, workers);
            // Keep the install counter monotonic across loads and restarts
            next.resume_from(shared.last_generation.load(Ordering::SeqCst));
            builder = Some((epoch, next));
        }
        let (_, active_builder) = builder.as_mut().expect("builder installed above");

        let force = shared.force_rebuild.swap(false, Ordering::SeqCst);
        match active_builder.rebuild(&geometry, reference, force).await {
            Ok(Some(stack)) => {
                // A load may have superseded this build; discard if so
                let current_epoch = {
                    let state = shared.state.read().await;
                    state.image.as_ref().map(|i| i.epoch)
                };
                if current_epoch == Some(epoch) {
                    shared
                        .last_generation
                        .store(stack.generation, Ordering::SeqCst);
                    shared.stack.install(stack).await;
                } else {
                    debug!(epoch, "discarding superseded rebuild");
                }
                // Self-re-arm: immediately check again
            }
            Ok(None) => {
                // Fresh; park until input moves the reference
                shared.wake.notified().await;
            }
            Err(e) => {
                // Recoverable: typically the geometry lags a resize. A
                // consumed force flag must be restored, or a fresh-looking
                // builder would skip the retry and park forever.
                if force {
                    shared.force_rebuild.store(true, Ordering::SeqCst);
                }
                warn!(error = %e, "rebuild attempt failed; retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}
