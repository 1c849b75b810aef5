//! TOML configuration with environment overrides
//!
//! ```toml
//! [producer]
//! destination = "127.0.0.1:5005"
//! gaze_space = "normalized"
//!
//! [producer.detection]
//! canny_low = 5
//! canny_high = 25
//!
//! [producer.target]
//! width = 1920.0
//! height = 1080.0
//!
//! [overlay]
//! bind = "127.0.0.1:5005"
//! radius = 30
//! ```
//!
//! Every field is optional.

use crate::homography::{RansacConfig, ScreenTarget};
use crate::overlay::OverlayStyle;
use crate::sources::GAZE_UDP_ADDR_ENV;
use crate::types::GazeSpace;
use crate::vision::DetectionParameters;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEST_ENV: &str = "SCREENGAZE_DEST";
pub const BIND_ENV: &str = "SCREENGAZE_BIND";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid address in {var}: {value}")]
    Address { var: &'static str, value: String },
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5005))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenGazeConfig {
    pub producer: ProducerConfig,
    pub overlay: OverlayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Telemetry destination
    pub destination: SocketAddr,
    /// Bounded wait for one frame
    pub frame_wait_ms: u64,
    /// Bounded wait for one gaze sample
    pub gaze_wait_ms: u64,
    pub gaze_space: GazeSpace,
    /// UDP gaze input address (off when unset)
    pub gaze_udp_addr: Option<SocketAddr>,
    pub stats_interval_secs: u64,
    /// Annotated frame dump directory (off when unset)
    pub debug_dir: Option<PathBuf>,
    pub debug_every: u64,
    pub detection: DetectionParameters,
    pub target: ScreenTarget,
    pub ransac: RansacConfig,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            destination: default_addr(),
            frame_wait_ms: 100,
            gaze_wait_ms: 50,
            gaze_space: GazeSpace::default(),
            gaze_udp_addr: None,
            stats_interval_secs: 5,
            debug_dir: None,
            debug_every: 30,
            detection: DetectionParameters::default(),
            target: ScreenTarget::default(),
            ransac: RansacConfig::default(),
        }
    }
}

impl ProducerConfig {
    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms)
    }

    pub fn gaze_wait(&self) -> Duration {
        Duration::from_millis(self.gaze_wait_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Telemetry port to listen on
    pub bind: SocketAddr,
    #[serde(flatten)]
    pub style: OverlayStyle,
    pub poll_interval_ms: u64,
    /// Surface size for headless runs
    pub headless_width: u32,
    pub headless_height: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            bind: default_addr(),
            style: OverlayStyle::default(),
            poll_interval_ms: 5,
            headless_width: 1920,
            headless_height: 1080,
        }
    }
}

impl OverlayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ScreenGazeConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read `path` if given, otherwise start from defaults; then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply `SCREENGAZE_*` overrides read through `lookup`
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let parse = |var: &'static str| -> Result<Option<SocketAddr>, ConfigError> {
            let Some(value) = lookup(var) else {
                return Ok(None);
            };
            match value.parse::<SocketAddr>() {
                Ok(addr) => Ok(Some(addr)),
                Err(_) => Err(ConfigError::Address { var, value }),
            }
        };

        if let Some(addr) = parse(DEST_ENV)? {
            log::info!("Telemetry destination overridden via {DEST_ENV}={addr}");
            self.producer.destination = addr;
        }
        if let Some(addr) = parse(BIND_ENV)? {
            log::info!("Overlay bind overridden via {BIND_ENV}={addr}");
            self.overlay.bind = addr;
        }
        if let Some(addr) = parse(GAZE_UDP_ADDR_ENV)? {
            log::info!("UDP gaze input enabled via environment ({addr})");
            self.producer.gaze_udp_addr = Some(addr);
        }
        Ok(())
    }
}

/// Only the `[producer.detection]` table, for live reloads
pub fn detection_from_toml(content: &str) -> Result<DetectionParameters, ConfigError> {
    Ok(ScreenGazeConfig::from_toml(content)?.producer.detection)
}
