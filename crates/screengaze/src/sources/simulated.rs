//! Synthetic gaze for running the pipeline without an eye tracker

use super::{now_ns, GazeSource, SourceError};
use crate::types::GazeSample;
use async_trait::async_trait;
use std::time::Duration;

/// Slow Lissajous wander around the frame center, always worn.
///
/// Emits normalized coordinates at a fixed rate.
pub struct SimulatedGazeSource {
    interval: Duration,
    started_ns: u64,
}

impl SimulatedGazeSource {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started_ns: now_ns(),
        }
    }

    /// Gaze position `t` seconds into the pattern
    pub fn position_at(t: f64) -> (f32, f32) {
        let x = 0.5 + 0.2 * (t * 0.5).sin();
        let y = 0.5 + 0.15 * (t * 0.3).cos();
        (x as f32, y as f32)
    }
}

impl Default for SimulatedGazeSource {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

#[async_trait]
impl GazeSource for SimulatedGazeSource {
    async fn next_gaze(&mut self) -> Result<Option<GazeSample>, SourceError> {
        tokio::time::sleep(self.interval).await;

        let timestamp_ns = now_ns();
        let t = timestamp_ns.saturating_sub(self.started_ns) as f64 / 1e9;
        let (gx, gy) = Self::position_at(t);
        Ok(Some(GazeSample {
            timestamp_ns,
            gx,
            gy,
            worn: true,
        }))
    }
}
