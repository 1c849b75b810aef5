//! Tunable detection parameters and their live handoff

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MIN_APPROX_POLY_FACTOR: f64 = 0.01;
pub const MIN_ASPECT_RATIO_TOLERANCE: f64 = 0.01;
pub const MIN_AREA_FRACTION: f64 = 0.0001;

/// Geometric constraints for the screen corner detector.
///
/// Values are stored as published; the floor clamps are applied by the
/// accessor methods at detection time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParameters {
    /// Canny hysteresis low threshold
    pub canny_low: u32,
    /// Canny hysteresis high threshold
    pub canny_high: u32,
    /// Gaussian blur radius; kernel size is `2r + 1`
    pub blur_radius: u32,
    /// Polygon approximation epsilon as a fraction of the contour perimeter
    pub approx_poly_factor: f64,
    /// Allowed relative deviation from the target aspect ratio
    pub aspect_ratio_tolerance: f64,
    /// Minimum polygon area as a fraction of the image area
    pub min_area_fraction: f64,
    /// Expected width / height of the physical screen
    pub target_aspect_ratio: f64,
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            canny_low: 5,
            canny_high: 25,
            blur_radius: 4,
            approx_poly_factor: 0.14,
            aspect_ratio_tolerance: 0.26,
            min_area_fraction: 0.017,
            target_aspect_ratio: 16.0 / 9.0,
        }
    }
}

impl DetectionParameters {
    /// Odd Gaussian kernel size, at least 1
    pub fn blur_kernel_size(&self) -> u32 {
        self.blur_radius.saturating_mul(2).saturating_add(1)
    }

    /// Sigma OpenCV derives for a kernel of [`Self::blur_kernel_size`] when given sigma 0.
    ///
    /// `None` for a 1x1 kernel (no blur).
    pub fn blur_sigma(&self) -> Option<f32> {
        let k = self.blur_kernel_size();
        if k <= 1 {
            return None;
        }
        Some(0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8)
    }

    pub fn approx_poly_factor(&self) -> f64 {
        self.approx_poly_factor.max(MIN_APPROX_POLY_FACTOR)
    }

    pub fn aspect_ratio_tolerance(&self) -> f64 {
        self.aspect_ratio_tolerance.max(MIN_ASPECT_RATIO_TOLERANCE)
    }

    pub fn min_area_fraction(&self) -> f64 {
        self.min_area_fraction.max(MIN_AREA_FRACTION)
    }
}

/// Raw slider positions from a tuning UI.
///
/// A UI owns one of these, updates the field behind whichever slider moved
/// and hands the whole set to [`ParameterHandle::apply_trackbars`].
///
/// Ranges: Canny 0-255, blur 0-4 (kernel 1-9), approx 1-50 (0.01-0.50),
/// aspect tolerance 1-30 (0.01-0.30), min area 1-50 (0.1%-5.0%).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackbarPositions {
    pub canny_low: u32,
    pub canny_high: u32,
    pub blur: u32,
    pub approx_poly: u32,
    pub aspect_ratio_tolerance: u32,
    pub min_area: u32,
}

impl Default for TrackbarPositions {
    fn default() -> Self {
        Self {
            canny_low: 5,
            canny_high: 25,
            blur: 4,
            approx_poly: 14,
            aspect_ratio_tolerance: 26,
            min_area: 17,
        }
    }
}

impl TrackbarPositions {
    pub const CANNY_MAX: u32 = 255;
    pub const BLUR_MAX: u32 = 4;
    pub const APPROX_POLY_MAX: u32 = 50;
    pub const ASPECT_RATIO_MAX: u32 = 30;
    pub const MIN_AREA_MAX: u32 = 50;

    /// Translate slider positions into parameters, keeping the target aspect of `base`
    pub fn to_parameters(&self, base: &DetectionParameters) -> DetectionParameters {
        DetectionParameters {
            canny_low: self.canny_low.min(Self::CANNY_MAX),
            canny_high: self.canny_high.min(Self::CANNY_MAX),
            blur_radius: self.blur.min(Self::BLUR_MAX),
            approx_poly_factor: self.approx_poly.min(Self::APPROX_POLY_MAX) as f64 / 100.0,
            aspect_ratio_tolerance: self.aspect_ratio_tolerance.min(Self::ASPECT_RATIO_MAX) as f64
                / 100.0,
            min_area_fraction: self.min_area.min(Self::MIN_AREA_MAX) as f64 / 1000.0,
            target_aspect_ratio: base.target_aspect_ratio,
        }
    }
}

/// Latest-value cell shared between the tuning collaborator and the detector
#[derive(Debug, Clone, Default)]
pub struct ParameterHandle {
    inner: Arc<RwLock<DetectionParameters>>,
}

impl ParameterHandle {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    /// Publish a new parameter set; the next detection uses it
    pub fn set_parameters(&self, params: DetectionParameters) {
        *self.inner.write() = params;
    }

    /// Publish slider positions, keeping the current target aspect ratio
    pub fn apply_trackbars(&self, positions: &TrackbarPositions) -> DetectionParameters {
        let mut guard = self.inner.write();
        let params = positions.to_parameters(&guard);
        *guard = params;
        params
    }

    /// Snapshot of the current parameters
    pub fn current(&self) -> DetectionParameters {
        *self.inner.read()
    }
}
