//! Frame and gaze collaborators
//!
//! The producer pulls from a [`FrameSource`] and a [`GazeSource`]. Each pull
//! either yields a value, yields `Ok(None)` when nothing arrived within the
//! source's bounded wait, or fails with [`SourceError::Closed`] once the
//! source is exhausted.

use crate::types::GazeSample;
use async_trait::async_trait;
use image::RgbImage;

#[cfg(feature = "vision")]
mod camera;
mod channel;
mod image_dir;
mod simulated;
mod udp_gaze;

#[cfg(feature = "vision")]
pub use camera::CameraSource;
pub use channel::{ChannelFrameSource, ChannelGazeSource};
pub use image_dir::ImageDirSource;
pub use simulated::SimulatedGazeSource;
pub use udp_gaze::{parse_gaze_message, UdpGazeSource, GAZE_UDP_ADDR_ENV};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source closed")]
    Closed,
    #[error("source I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode input: {0}")]
    Decode(String),
}

#[async_trait]
pub trait FrameSource: Send {
    /// Next decoded color frame, or `None` if none arrived within the bounded wait
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError>;
}

#[async_trait]
pub trait GazeSource: Send {
    /// Next gaze sample, or `None` if none arrived within the bounded wait
    async fn next_gaze(&mut self) -> Result<Option<GazeSample>, SourceError>;
}

/// Nanoseconds since the Unix epoch
pub fn now_ns() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
