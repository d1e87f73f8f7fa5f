//! WSI Viewport - headless demo of the pyramidal viewport engine.
//!
//! Drives the engine through a scripted hover/zoom/pan session against a
//! synthetic pyramid and reports the frame the renderer would draw after
//! each step.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_viewport::{Cli, Frame, SyntheticSource, ViewportEngine};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match run_demo(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Demo failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Demo Session
// =============================================================================

async fn run_demo(cli: Cli) -> Result<(), String> {
    info!(
        "Image: {}x{} px, {} levels; viewport: {}x{} px",
        cli.image_width, cli.image_height, cli.levels, cli.view_width, cli.view_height
    );

    let engine =
        ViewportEngine::new(cli.engine_config()).map_err(|e| format!("engine init: {e}"))?;
    engine.on_resize(cli.view_width, cli.view_height).await;
    engine
        .load(SyntheticSource::new(
            cli.image_width,
            cli.image_height,
            cli.levels,
        ))
        .await
        .map_err(|e| format!("load: {e}"))?;
    engine.start_updating().await;

    // Overview: whole image fitted into the viewport
    settle(&engine).await;
    report(&engine, "initial overview").await;

    // Hover toward the upper-right quadrant, then zoom in twice around it
    engine
        .on_hover(cli.view_width as f64 * 0.75, cli.view_height as f64 * 0.25)
        .await;
    settle(&engine).await;
    engine.on_wheel(1).await;
    settle(&engine).await;
    report(&engine, "after first zoom-in").await;

    engine.on_wheel(1).await;
    settle(&engine).await;
    report(&engine, "after second zoom-in").await;

    // Pan far enough to cross the staleness threshold and force a rebuild
    engine
        .on_pan(cli.view_width as f64 * 0.6, cli.view_height as f64 * 0.6)
        .await;
    settle(&engine).await;
    report(&engine, "after pan").await;

    // Zoom back out to the overview
    engine.on_wheel(-1).await;
    engine.on_wheel(-1).await;
    settle(&engine).await;
    let frame = report(&engine, "after zoom-out").await;

    engine.stop_updating().await;

    if let (Some(path), Some(frame)) = (cli.output.as_ref(), frame) {
        write_jpeg(&frame, path)?;
        info!("Wrote final frame to {}", path.display());
    }

    Ok(())
}

/// Give the background loop time to land the pending rebuild.
async fn settle<S: wsi_viewport::TiledImageSource>(engine: &ViewportEngine<S>) {
    let before = engine.stack_generation().await;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if engine.stack_generation().await > before {
            break;
        }
    }
}

async fn report<S: wsi_viewport::TiledImageSource>(
    engine: &ViewportEngine<S>,
    label: &str,
) -> Option<Frame> {
    match engine.current_frame().await {
        Ok(frame) => {
            info!(
                "{}: level {} at ({:.0}, {:.0}), {}x{} px, display scale {:.1}",
                label,
                frame.level,
                frame.position.0,
                frame.position.1,
                frame.block.width(),
                frame.block.height(),
                frame.display_scale
            );
            Some(frame)
        }
        Err(e) => {
            info!("{}: no frame yet ({})", label, e);
            None
        }
    }
}

/// Encode a frame's pixels as a JPEG file, dropping the alpha channel.
fn write_jpeg(frame: &Frame, path: &std::path::Path) -> Result<(), String> {
    let (width, height) = (frame.block.width(), frame.block.height());
    let rgba = frame.block.data();

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }

    let buffer: image::RgbImage = image::ImageBuffer::from_raw(width, height, rgb)
        .ok_or_else(|| "frame buffer size mismatch".to_string())?;
    buffer
        .save_with_format(path, image::ImageFormat::Jpeg)
        .map_err(|e| format!("write {}: {e}", path.display()))
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_viewport=debug"
    } else {
        "wsi_viewport=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
