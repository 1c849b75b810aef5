//! Channel-backed sources for embedding a device SDK running on its own thread

use super::{FrameSource, GazeSource, SourceError};
use crate::types::GazeSample;
use async_trait::async_trait;
use crossbeam_channel::{Receiver, TryRecvError};
use image::RgbImage;
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

// Poll `rx` without blocking the runtime until a value arrives or `wait` elapses.
async fn recv_within<T>(rx: &Receiver<T>, wait: Duration) -> Result<Option<T>, SourceError> {
    let deadline = Instant::now() + wait;
    loop {
        match rx.try_recv() {
            Ok(value) => return Ok(Some(value)),
            Err(TryRecvError::Disconnected) => return Err(SourceError::Closed),
            Err(TryRecvError::Empty) => {}
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub struct ChannelFrameSource {
    rx: Receiver<RgbImage>,
    wait: Duration,
}

impl ChannelFrameSource {
    pub fn new(rx: Receiver<RgbImage>, wait: Duration) -> Self {
        Self { rx, wait }
    }
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        recv_within(&self.rx, self.wait).await
    }
}

pub struct ChannelGazeSource {
    rx: Receiver<GazeSample>,
    wait: Duration,
}

impl ChannelGazeSource {
    pub fn new(rx: Receiver<GazeSample>, wait: Duration) -> Self {
        Self { rx, wait }
    }
}

#[async_trait]
impl GazeSource for ChannelGazeSource {
    async fn next_gaze(&mut self) -> Result<Option<GazeSample>, SourceError> {
        recv_within(&self.rx, self.wait).await
    }
}
