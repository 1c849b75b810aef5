//! Producer loop - frame in, telemetry datagram out
//!
//! Each iteration pulls one frame, looks for the screen, fits a fresh
//! homography, pulls one gaze sample and, when everything lines up, sends a
//! [`TelemetryPacket`]. Nothing carries over between iterations: a frame
//! without a detection drops the previously held homography.

use crate::homography::{Homography, ScreenMapper};
use crate::sources::{FrameSource, GazeSource, SourceError};
use crate::telemetry::TelemetrySender;
use crate::types::{GazeSpace, Quadrilateral, TelemetryPacket};
use crate::vision::{annotate_detection, ScreenDetector};
use anyhow::Result;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pause after a failed pull before trying the sources again
const SOURCE_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Furthest pipeline state reached in one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NoScreen,
    ScreenFound,
    HomographyReady,
    Sent,
}

/// What happened in one producer iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// The frame source had nothing within its wait
    NoFrame,
    NoScreen,
    /// A screen was found but the homography fit was degenerate
    FitFailed,
    NoGaze,
    NotWorn,
    /// Zero perspective denominator for this sample
    ProjectionFailed,
    Sent(TelemetryPacket),
}

impl StepOutcome {
    pub fn state(&self) -> PipelineState {
        match self {
            // A degenerate fit counts as a detection miss.
            StepOutcome::NoFrame | StepOutcome::NoScreen | StepOutcome::FitFailed => {
                PipelineState::NoScreen
            }
            StepOutcome::NoGaze | StepOutcome::NotWorn | StepOutcome::ProjectionFailed => {
                PipelineState::HomographyReady
            }
            StepOutcome::Sent(_) => PipelineState::Sent,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub iterations: u64,
    pub frames: u64,
    pub detections: u64,
    pub fits: u64,
    pub projections: u64,
    pub packets_sent: u64,
}

impl ProducerStats {
    fn record(&mut self, outcome: &StepOutcome, sent: bool) {
        self.iterations += 1;
        if *outcome == StepOutcome::NoFrame {
            return;
        }
        self.frames += 1;
        match outcome {
            StepOutcome::NoFrame | StepOutcome::NoScreen => {}
            StepOutcome::FitFailed => self.detections += 1,
            StepOutcome::NoGaze | StepOutcome::NotWorn | StepOutcome::ProjectionFailed => {
                self.detections += 1;
                self.fits += 1;
            }
            StepOutcome::Sent(_) => {
                self.detections += 1;
                self.fits += 1;
                self.projections += 1;
                if sent {
                    self.packets_sent += 1;
                }
            }
        }
    }
}

/// Writes every `every`-th frame, annotated, as a PNG into `dir`
#[derive(Debug, Clone)]
pub struct DebugDump {
    dir: PathBuf,
    every: u64,
}

impl DebugDump {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        log::info!("Writing annotated debug frames to {}", dir.display());
        Ok(Self {
            dir,
            every: every.max(1),
        })
    }

    fn maybe_write(&self, index: u64, frame: &RgbImage, quad: Option<&Quadrilateral>) {
        if index % self.every != 0 {
            return;
        }
        let path = self.dir.join(format!("frame_{index:06}.png"));
        if let Err(e) = annotate_detection(frame, quad).save(&path) {
            log::warn!("Failed to write debug frame {}: {e}", path.display());
        }
    }
}

pub struct Producer {
    frames: Box<dyn FrameSource>,
    gaze: Box<dyn GazeSource>,
    detector: ScreenDetector,
    mapper: ScreenMapper,
    sender: TelemetrySender,
    gaze_space: GazeSpace,
    homography: Option<Homography>,
    debug: Option<DebugDump>,
    stats: ProducerStats,
    stats_interval: Duration,
}

impl Producer {
    pub fn new(
        frames: Box<dyn FrameSource>,
        gaze: Box<dyn GazeSource>,
        detector: ScreenDetector,
        mapper: ScreenMapper,
        sender: TelemetrySender,
    ) -> Self {
        Self {
            frames,
            gaze,
            detector,
            mapper,
            sender,
            gaze_space: GazeSpace::default(),
            homography: None,
            debug: None,
            stats: ProducerStats::default(),
            stats_interval: Duration::from_secs(5),
        }
    }

    pub fn with_gaze_space(mut self, space: GazeSpace) -> Self {
        self.gaze_space = space;
        self
    }

    pub fn with_debug_dump(mut self, dump: DebugDump) -> Self {
        self.debug = Some(dump);
        self
    }

    pub fn with_stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Homography fitted in the latest iteration, if any
    pub fn homography(&self) -> Option<&Homography> {
        self.homography.as_ref()
    }

    pub fn stats(&self) -> ProducerStats {
        self.stats
    }

    /// Run one iteration
    pub async fn step(&mut self) -> Result<StepOutcome, SourceError> {
        let outcome = self.step_inner().await?;
        let sent = match &outcome {
            StepOutcome::Sent(packet) => self.sender.send(packet).await,
            _ => false,
        };
        self.stats.record(&outcome, sent);
        log::trace!("Producer step: {:?}", outcome);
        Ok(outcome)
    }

    async fn step_inner(&mut self) -> Result<StepOutcome, SourceError> {
        let Some(frame) = self.frames.next_frame().await? else {
            return Ok(StepOutcome::NoFrame);
        };

        let quad = self.detector.detect(&frame);
        if let Some(dump) = &self.debug {
            dump.maybe_write(self.stats.frames, &frame, quad.as_ref());
        }

        let Some(quad) = quad else {
            self.homography = None;
            return Ok(StepOutcome::NoScreen);
        };
        self.homography = self.mapper.fit(&quad);
        let Some(homography) = self.homography else {
            return Ok(StepOutcome::FitFailed);
        };

        let Some(sample) = self.gaze.next_gaze().await? else {
            return Ok(StepOutcome::NoGaze);
        };
        if !sample.worn {
            return Ok(StepOutcome::NotWorn);
        }

        match self.mapper.map_gaze(
            &homography,
            &sample,
            self.gaze_space,
            frame.width(),
            frame.height(),
        ) {
            Some(mapped) => Ok(StepOutcome::Sent(TelemetryPacket::new(&sample, mapped))),
            None => {
                log::debug!("Zero perspective denominator, dropping gaze sample");
                Ok(StepOutcome::ProjectionFailed)
            }
        }
    }

    /// Loop until `shutdown` is raised or a source closes
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<ProducerStats> {
        log::info!(
            "Producer running, sending telemetry to {}",
            self.sender.destination()
        );
        let mut last_report = Instant::now();

        while !shutdown.load(Ordering::SeqCst) {
            match self.step().await {
                Ok(_) => {}
                Err(SourceError::Closed) => {
                    log::info!("Input source closed, stopping producer");
                    break;
                }
                Err(e) => {
                    log::warn!("Source error: {e}");
                    tokio::time::sleep(SOURCE_ERROR_BACKOFF).await;
                }
            }

            if last_report.elapsed() >= self.stats_interval {
                let s = self.stats;
                log::info!(
                    "frames={} detections={} fits={} sent={}",
                    s.frames,
                    s.detections,
                    s.fits,
                    s.packets_sent
                );
                last_report = Instant::now();
            }
        }

        log::info!("Producer stopped after {} iterations", self.stats.iterations);
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homography::{RansacConfig, ScreenTarget};
    use crate::sources::{ChannelFrameSource, ChannelGazeSource};
    use crate::telemetry;
    use crate::types::GazeSample;
    use crossbeam_channel::Sender;
    use image::Rgb;
    use std::sync::atomic::AtomicUsize;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use tokio::net::UdpSocket;

    const WAIT: Duration = Duration::from_millis(20);

    fn screen_frame() -> RgbImage {
        let mut img = RgbImage::new(1200, 760);
        draw_filled_rect_mut(&mut img, Rect::at(100, 100).of_size(901, 551), Rgb([255, 255, 255]));
        img
    }

    fn gaze(gx: f32, gy: f32, worn: bool) -> GazeSample {
        GazeSample {
            timestamp_ns: 77,
            gx,
            gy,
            worn,
        }
    }

    struct FailingFrames {
        pulls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl FrameSource for FailingFrames {
        async fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::Decode("corrupt frame".into()))
        }
    }

    struct Harness {
        producer: Producer,
        frames: Sender<RgbImage>,
        gaze: Sender<GazeSample>,
        listener: UdpSocket,
    }

    async fn harness() -> Harness {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = TelemetrySender::bind(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
        let (gaze_tx, gaze_rx) = crossbeam_channel::unbounded();
        let producer = Producer::new(
            Box::new(ChannelFrameSource::new(frame_rx, WAIT)),
            Box::new(ChannelGazeSource::new(gaze_rx, WAIT)),
            ScreenDetector::default(),
            ScreenMapper::default(),
            sender,
        );
        Harness {
            producer,
            frames: frame_tx,
            gaze: gaze_tx,
            listener,
        }
    }

    async fn recv_packet(listener: &UdpSocket) -> TelemetryPacket {
        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), listener.recv_from(&mut buf))
            .await
            .expect("datagram in time")
            .unwrap();
        telemetry::decode(&buf[..len]).expect("well-formed packet")
    }

    #[tokio::test]
    async fn maps_gaze_and_sends_packet() {
        let mut h = harness().await;
        h.frames.send(screen_frame()).unwrap();
        h.gaze.send(gaze(0.5, 0.5, true)).unwrap();

        let outcome = h.producer.step().await.unwrap();
        assert_eq!(outcome.state(), PipelineState::Sent);

        let packet = recv_packet(&h.listener).await;
        assert_eq!(packet.timestamp, 77.0);
        assert_eq!((packet.gx, packet.gy), (0.5, 0.5));
        // Frame center (600, 380) inside the 900x550 screen at (100, 100)
        assert!((packet.px - 1066.7).abs() < 15.0, "px = {}", packet.px);
        assert!((packet.py - 549.8).abs() < 15.0, "py = {}", packet.py);
        assert_eq!(h.producer.stats().packets_sent, 1);
    }

    #[tokio::test]
    async fn lost_screen_discards_homography() {
        let mut h = harness().await;
        h.frames.send(screen_frame()).unwrap();
        assert_eq!(h.producer.step().await.unwrap(), StepOutcome::NoGaze);
        assert!(h.producer.homography().is_some());

        h.frames.send(RgbImage::new(1200, 760)).unwrap();
        h.gaze.send(gaze(0.5, 0.5, true)).unwrap();
        assert_eq!(h.producer.step().await.unwrap(), StepOutcome::NoScreen);
        assert!(h.producer.homography().is_none());
    }

    #[tokio::test]
    async fn skips_missing_frames_and_unworn_gaze() {
        let mut h = harness().await;
        assert_eq!(h.producer.step().await.unwrap(), StepOutcome::NoFrame);

        h.frames.send(screen_frame()).unwrap();
        h.gaze.send(gaze(0.5, 0.5, false)).unwrap();
        let outcome = h.producer.step().await.unwrap();
        assert_eq!(outcome, StepOutcome::NotWorn);
        assert_eq!(outcome.state(), PipelineState::HomographyReady);

        let stats = h.producer.stats();
        assert_eq!(stats.iterations, 2);
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.packets_sent, 0);
    }

    #[tokio::test]
    async fn run_stops_when_sources_close() {
        let mut h = harness().await;
        h.frames.send(screen_frame()).unwrap();
        h.gaze.send(gaze(0.25, 0.25, true)).unwrap();
        drop(h.frames);

        let stats = h
            .producer
            .run(Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();
        assert_eq!(stats.packets_sent, 1);
        recv_packet(&h.listener).await;
    }

    #[tokio::test]
    async fn degenerate_fit_counts_as_missed_screen() {
        let mut h = harness().await;
        // Four corners can never reach five inliers.
        h.producer.mapper = ScreenMapper::new(
            ScreenTarget::default(),
            RansacConfig {
                min_inliers: 5,
                ..Default::default()
            },
        );

        h.frames.send(screen_frame()).unwrap();
        h.gaze.send(gaze(0.5, 0.5, true)).unwrap();
        let outcome = h.producer.step().await.unwrap();
        assert_eq!(outcome, StepOutcome::FitFailed);
        assert_eq!(outcome.state(), PipelineState::NoScreen);
        assert!(h.producer.homography().is_none());

        let stats = h.producer.stats();
        assert_eq!((stats.detections, stats.fits, stats.packets_sent), (1, 0, 0));

        let mut buf = [0u8; 64];
        let received =
            tokio::time::timeout(Duration::from_millis(100), h.listener.recv_from(&mut buf)).await;
        assert!(received.is_err(), "no datagram expected");
    }

    #[tokio::test]
    async fn failed_fit_drops_previous_homography() {
        let mut h = harness().await;
        h.frames.send(screen_frame()).unwrap();
        assert_eq!(h.producer.step().await.unwrap(), StepOutcome::NoGaze);
        assert!(h.producer.homography().is_some());

        h.producer.mapper = ScreenMapper::new(
            ScreenTarget::default(),
            RansacConfig {
                min_inliers: 5,
                ..Default::default()
            },
        );
        h.frames.send(screen_frame()).unwrap();
        assert_eq!(h.producer.step().await.unwrap(), StepOutcome::FitFailed);
        assert!(h.producer.homography().is_none());
    }

    #[tokio::test]
    async fn source_errors_back_off_instead_of_spinning() {
        let mut h = harness().await;
        let pulls = Arc::new(AtomicUsize::new(0));
        h.producer.frames = Box::new(FailingFrames {
            pulls: Arc::clone(&pulls),
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.store(true, Ordering::SeqCst);
        });

        tokio::time::timeout(Duration::from_secs(2), h.producer.run(shutdown))
            .await
            .expect("run stops on shutdown")
            .unwrap();
        // 100 ms at one retry per backoff interval
        let pulls = pulls.load(Ordering::SeqCst);
        assert!((1..=20).contains(&pulls), "pulls = {pulls}");
    }

    #[tokio::test]
    async fn run_honours_shutdown_flag() {
        let mut h = harness().await;
        let stats = h
            .producer
            .run(Arc::new(AtomicBool::new(true)))
            .await
            .unwrap();
        assert_eq!(stats.iterations, 0);
    }

    #[tokio::test]
    async fn debug_dump_writes_annotated_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = harness().await;
        h.producer = h
            .producer
            .with_debug_dump(DebugDump::new(dir.path(), 1).unwrap());
        h.frames.send(RgbImage::new(320, 180)).unwrap();
        h.producer.step().await.unwrap();

        let written = dir.path().join("frame_000000.png");
        let img = image::open(&written).unwrap().to_rgb8();
        assert_eq!(*img.get_pixel(5, 5), Rgb([255, 0, 0]));
    }
}
