//! ScreenGaze producer
//!
//! Pulls scene frames and gaze samples, maps gaze onto the detected screen
//! and streams telemetry to the overlay.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::LevelFilter;
use screengaze::config::ScreenGazeConfig;
use screengaze::homography::ScreenMapper;
use screengaze::producer::{DebugDump, Producer};
use screengaze::reload::ParameterReloader;
use screengaze::sources::{
    FrameSource, GazeSource, ImageDirSource, SimulatedGazeSource, UdpGazeSource,
};
use screengaze::telemetry::TelemetrySender;
use screengaze::vision::{ParameterHandle, ScreenDetector};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "screengaze-producer")]
#[command(about = "Map eye-tracker gaze onto a screen seen by the scene camera", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Replay scene frames from a directory of images
    #[arg(long, value_name = "DIR")]
    frames: Option<PathBuf>,

    /// Restart the frame directory when it runs out
    #[arg(long = "loop")]
    looping: bool,

    /// Capture scene frames from a camera
    #[cfg(feature = "vision")]
    #[arg(long, value_name = "INDEX")]
    camera: Option<i32>,

    /// Receive gaze samples as UDP datagrams on this address
    #[arg(long, value_name = "ADDR")]
    gaze_udp: Option<SocketAddr>,

    /// Use a synthetic gaze pattern
    #[arg(long)]
    simulate_gaze: bool,

    /// Telemetry destination
    #[arg(short, long, value_name = "ADDR")]
    destination: Option<SocketAddr>,

    /// Reload detection parameters when the config file changes
    #[arg(long)]
    watch_config: bool,

    /// Write annotated frames into this directory
    #[arg(long, value_name = "DIR")]
    debug_dir: Option<PathBuf>,
}

#[cfg_attr(not(feature = "vision"), allow(unused_variables))]
fn frame_source(cli: &Cli, config: &ScreenGazeConfig) -> Result<Box<dyn FrameSource>> {
    #[cfg(feature = "vision")]
    if let Some(index) = cli.camera {
        let camera = screengaze::sources::CameraSource::open(index, config.producer.frame_wait())
            .context("Failed to open camera")?;
        return Ok(Box::new(camera));
    }

    if let Some(dir) = &cli.frames {
        let source = ImageDirSource::open(dir, cli.looping)
            .with_context(|| format!("Failed to open frame directory {}", dir.display()))?;
        return Ok(Box::new(source));
    }

    bail!("No frame source: pass --frames <DIR> (or --camera <INDEX> with the `vision` feature)")
}

async fn gaze_source(cli: &Cli, config: &ScreenGazeConfig) -> Result<Box<dyn GazeSource>> {
    let udp = cli.gaze_udp.or(config.producer.gaze_udp_addr);
    match udp {
        Some(addr) if !cli.simulate_gaze => {
            let source = UdpGazeSource::bind(addr, config.producer.gaze_wait())
                .await
                .with_context(|| format!("Failed to bind gaze listener on {addr}"))?;
            Ok(Box::new(source))
        }
        _ => {
            if !cli.simulate_gaze {
                log::warn!("No gaze input configured, using simulated gaze");
            }
            Ok(Box::new(SimulatedGazeSource::default()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    let mut config = ScreenGazeConfig::load(cli.config.as_deref())?;
    if let Some(destination) = cli.destination {
        config.producer.destination = destination;
    }
    if let Some(dir) = &cli.debug_dir {
        config.producer.debug_dir = Some(dir.clone());
    }

    let params = ParameterHandle::new(config.producer.detection);
    let _reloader = match (&cli.config, cli.watch_config) {
        (Some(path), true) => Some(ParameterReloader::watch(path, params.clone())?),
        (None, true) => {
            log::warn!("--watch-config needs --config, ignoring");
            None
        }
        _ => None,
    };

    let frames = frame_source(&cli, &config)?;
    let gaze = gaze_source(&cli, &config).await?;
    let sender = TelemetrySender::bind(config.producer.destination).await?;

    let mut producer = Producer::new(
        frames,
        gaze,
        ScreenDetector::new(params),
        ScreenMapper::new(config.producer.target, config.producer.ransac.clone()),
        sender,
    )
    .with_gaze_space(config.producer.gaze_space)
    .with_stats_interval(config.producer.stats_interval());
    if let Some(dir) = &config.producer.debug_dir {
        producer = producer.with_debug_dump(DebugDump::new(dir, config.producer.debug_every)?);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal...");
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    log::info!("Press Ctrl+C to exit");
    let stats = producer.run(shutdown).await?;
    log::info!(
        "Producer finished: {} frames, {} packets sent",
        stats.frames,
        stats.packets_sent
    );
    Ok(())
}
