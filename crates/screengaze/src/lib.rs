//! # ScreenGaze
//!
//! Maps a wearable eye tracker's gaze onto the pixels of a physical screen
//! visible in the tracker's scene camera, and streams the result to an
//! always-on-top overlay.
//!
//! Two processes share nothing but a UDP port:
//! - the **producer** detects the screen outline in each scene frame, fits a
//!   homography onto a fixed target rectangle, projects the current gaze
//!   sample through it and sends a 24-byte telemetry datagram;
//! - the **overlay** receives those datagrams and redraws a circle whenever
//!   the mapped point moves.

pub mod config;
pub mod geometry;
pub mod homography;
pub mod overlay;
pub mod producer;
pub mod reload;
pub mod sources;
pub mod telemetry;
pub mod types;
pub mod vision;

pub use config::ScreenGazeConfig;
pub use homography::{Homography, ScreenMapper, ScreenTarget};
pub use producer::{PipelineState, Producer, StepOutcome};
pub use types::*;
pub use vision::{DetectionParameters, ParameterHandle, ScreenDetector};
