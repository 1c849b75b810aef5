//! Core data types shared by the producer and the overlay

use serde::{Deserialize, Serialize};

/// A point in image-pixel (or target-rectangle) space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// The four ordered corners of a detected screen outline.
///
/// Invariant (established by [`crate::geometry::order_points`]): `tl` has the
/// smallest `x + y`, `br` the largest; `tr` has the smallest `y - x`, `bl`
/// the largest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrilateral {
    pub tl: Point,
    pub tr: Point,
    pub br: Point,
    pub bl: Point,
}

impl Quadrilateral {
    /// Corners in `TL, TR, BR, BL` order
    pub fn corners(&self) -> [Point; 4] {
        [self.tl, self.tr, self.br, self.bl]
    }

    /// Mean of the top and bottom edge lengths
    pub fn average_width(&self) -> f64 {
        (self.tl.distance(&self.tr) + self.bl.distance(&self.br)) / 2.0
    }

    /// Mean of the left and right edge lengths
    pub fn average_height(&self) -> f64 {
        (self.tl.distance(&self.bl) + self.tr.distance(&self.br)) / 2.0
    }
}

/// One gaze sample from the eye tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    /// Nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
    /// Gaze X in the tracker's native frame
    pub gx: f32,
    /// Gaze Y in the tracker's native frame
    pub gy: f32,
    /// Whether the glasses are currently worn
    pub worn: bool,
}

/// A gaze sample projected into screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappedPoint {
    pub px: f32,
    pub py: f32,
}

/// One telemetry datagram: `(timestamp, gx, gy, px, py)`.
///
/// Wire layout lives in [`crate::telemetry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPacket {
    pub timestamp: f64,
    pub gx: f32,
    pub gy: f32,
    pub px: f32,
    pub py: f32,
}

impl TelemetryPacket {
    pub fn new(sample: &GazeSample, mapped: MappedPoint) -> Self {
        Self {
            timestamp: sample.timestamp_ns as f64,
            gx: sample.gx,
            gy: sample.gy,
            px: mapped.px,
            py: mapped.py,
        }
    }
}

/// Coordinate convention of incoming gaze samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeSpace {
    /// `0.0..=1.0` across the scene frame; scaled by the frame size before projection
    #[default]
    Normalized,
    /// Scene-camera pixels; projected as-is
    Pixels,
}

impl GazeSpace {
    /// Lift a gaze sample into the pixel space of a `width` x `height` frame
    pub fn to_frame_pixels(self, gx: f32, gy: f32, width: u32, height: u32) -> (f32, f32) {
        match self {
            GazeSpace::Normalized => (gx * width as f32, gy * height as f32),
            GazeSpace::Pixels => (gx, gy),
        }
    }
}
