//! ScreenGaze overlay
//!
//! Listens for telemetry and draws the mapped gaze point on top of every
//! other window.

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use screengaze::config::ScreenGazeConfig;
use screengaze::overlay::{bind_telemetry_socket, Overlay, OverlaySurface, RasterSurface};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "screengaze-overlay")]
#[command(about = "Draw the mapped gaze point on a transparent topmost window", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Telemetry address to listen on
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Render into an offscreen buffer instead of a window
    #[arg(long)]
    headless: bool,

    /// With --headless, write the buffer to this PNG after every redraw
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,
}

async fn run_overlay<S: OverlaySurface>(
    surface: S,
    config: &ScreenGazeConfig,
    socket: &tokio::net::UdpSocket,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut overlay = Overlay::new(surface, config.overlay.style);
    overlay
        .run(socket, config.overlay.poll_interval(), shutdown)
        .await?;
    Ok(())
}

async fn serve(cli: &Cli, config: &ScreenGazeConfig) -> Result<()> {
    // Without a listening socket there is nothing to show.
    let socket = match bind_telemetry_socket(config.overlay.bind).await {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            log::error!("Is another overlay already running?");
            return Err(e.into());
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal...");
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    #[cfg(windows)]
    if !cli.headless {
        let surface = screengaze::overlay::Win32Surface::create()?;
        return run_overlay(surface, config, &socket, shutdown).await;
    }

    #[cfg(not(windows))]
    if !cli.headless {
        log::warn!("No native overlay window on this platform, rendering headless");
    }

    let mut surface =
        RasterSurface::new(config.overlay.headless_width, config.overlay.headless_height);
    if let Some(path) = &cli.snapshot {
        surface = surface.with_snapshot(path);
    }
    run_overlay(surface, config, &socket, shutdown).await
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let mut config = ScreenGazeConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.overlay.bind = bind;
    }

    // Window handles stay on this thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(&cli, &config))?;

    log::info!("Overlay shutdown complete");
    Ok(())
}
