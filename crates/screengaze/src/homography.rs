//! Gaze-to-screen mapping
//!
//! Fits a homography from the detected screen quadrilateral (scene-camera
//! pixels) onto a fixed target rectangle (screen pixels), then pushes single
//! gaze points through it with an explicit perspective divide.

use crate::geometry;
use crate::types::{GazeSample, GazeSpace, MappedPoint, Point, Quadrilateral};
use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HomographyError {
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("degenerate correspondence: source points are collinear or duplicated")]
    Degenerate,
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
    #[error("insufficient inliers: need {needed}, found {found}")]
    InsufficientInliers { needed: usize, found: usize },
}

/// A 3x3 projective transform from scene-camera pixels to screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn identity() -> Self {
        Self::from_matrix(Matrix3::identity())
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Project one point. `None` when the perspective denominator is exactly zero.
    pub fn project(&self, gx: f32, gy: f32) -> Option<MappedPoint> {
        let h = &self.matrix;
        let (x, y) = (gx as f64, gy as f64);

        let denom = h[(2, 0)] * x + h[(2, 1)] * y + h[(2, 2)];
        if denom == 0.0 {
            return None;
        }
        let px = (h[(0, 0)] * x + h[(0, 1)] * y + h[(0, 2)]) / denom;
        let py = (h[(1, 0)] * x + h[(1, 1)] * y + h[(1, 2)]) / denom;

        Some(MappedPoint {
            px: px as f32,
            py: py as f32,
        })
    }

    fn project_point(&self, p: &Point) -> Option<Point> {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        if v[2] == 0.0 {
            return None;
        }
        Some(Point::new(v[0] / v[2], v[1] / v[2]))
    }

    fn reprojection_error(&self, src: &Point, dst: &Point) -> f64 {
        self.project_point(src)
            .map(|p| p.distance(dst))
            .unwrap_or(f64::INFINITY)
    }
}

/// The screen rectangle gaze is mapped into
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenTarget {
    pub width: f64,
    pub height: f64,
}

impl Default for ScreenTarget {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl ScreenTarget {
    /// Corners in `TL, TR, BR, BL` order
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(0.0, 0.0),
            Point::new(self.width, 0.0),
            Point::new(self.width, self.height),
            Point::new(0.0, self.height),
        ]
    }
}

/// RANSAC settings for the homography fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Inlier threshold (reprojection error in target pixels)
    pub inlier_threshold: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 200,
            inlier_threshold: 5.0,
            min_inliers: 4,
            seed: 0,
        }
    }
}

// Hartley normalization: centroid to origin, mean distance sqrt(2).
fn normalize_points(pts: &[Point]) -> (Matrix3<f64>, Vec<Point>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| Point::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    (t, normalized)
}

/// Direct linear transform from >= 4 correspondences, `dst ~ H * src`.
pub fn estimate_homography_dlt(src: &[Point], dst: &[Point]) -> Result<Matrix3<f64>, HomographyError> {
    let n = src.len();
    if n < 4 || dst.len() < 4 {
        return Err(HomographyError::TooFewPoints {
            needed: 4,
            got: n.min(dst.len()),
        });
    }
    if n != dst.len() {
        return Err(HomographyError::NumericalFailure(
            "src and dst must have the same length".into(),
        ));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i].x, src_n[i].y);
        let (dx, dy) = (dst_n[i].x, dst_n[i].y);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // Null vector of A = eigenvector of A^T A with the smallest eigenvalue.
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let mut min_idx = 0;
    for i in 1..9 {
        if eig.eigenvalues[i].abs() < eig.eigenvalues[min_idx].abs() {
            min_idx = i;
        }
    }
    let h = |j: usize| eig.eigenvectors[(j, min_idx)];
    let h_norm = Matrix3::new(h(0), h(1), h(2), h(3), h(4), h(5), h(6), h(7), h(8));

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| HomographyError::NumericalFailure("T_dst not invertible".into()))?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Ok(h)
    } else {
        Ok(h / scale)
    }
}

/// Consensus-sampled homography fit.
///
/// Samples minimal 4-point sets, keeps the model with the most inliers and
/// refits on them. Fails on degenerate source geometry.
pub fn fit_homography_ransac(
    src: &[Point],
    dst: &[Point],
    config: &RansacConfig,
) -> Result<Homography, HomographyError> {
    let n = src.len();
    if n < 4 {
        return Err(HomographyError::TooFewPoints { needed: 4, got: n });
    }
    if geometry::has_collinear_triple(src, degeneracy_tolerance(src)) {
        return Err(HomographyError::Degenerate);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(usize, Vec<bool>)> = None;

    for _ in 0..config.max_iters.max(1) {
        let sample = rand::seq::index::sample(&mut rng, n, 4);
        let s4: Vec<Point> = sample.iter().map(|i| src[i]).collect();
        let d4: Vec<Point> = sample.iter().map(|i| dst[i]).collect();
        if geometry::has_collinear_triple(&s4, degeneracy_tolerance(&s4)) {
            continue;
        }
        let Ok(h) = estimate_homography_dlt(&s4, &d4) else {
            continue;
        };
        let h = Homography::from_matrix(h);

        let mask: Vec<bool> = (0..n)
            .map(|i| h.reprojection_error(&src[i], &dst[i]) < config.inlier_threshold)
            .collect();
        let count = mask.iter().filter(|&&m| m).count();

        if best.as_ref().map_or(true, |(c, _)| count > *c) {
            best = Some((count, mask));
            if count == n {
                break;
            }
        }
    }

    let (count, mask) = best.unwrap_or((0, vec![false; n]));
    if count < config.min_inliers.max(4) {
        return Err(HomographyError::InsufficientInliers {
            needed: config.min_inliers.max(4),
            found: count,
        });
    }

    let inlier_src: Vec<Point> = (0..n).filter(|&i| mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<Point> = (0..n).filter(|&i| mask[i]).map(|i| dst[i]).collect();
    let h = estimate_homography_dlt(&inlier_src, &inlier_dst)?;

    if !h.iter().all(|v| v.is_finite()) || h.determinant().abs() < 1e-12 {
        return Err(HomographyError::NumericalFailure("singular homography".into()));
    }
    Ok(Homography::from_matrix(h))
}

// Twice-triangle-area threshold, scaled to the point spread.
fn degeneracy_tolerance(pts: &[Point]) -> f64 {
    let span = pts
        .iter()
        .flat_map(|p| [p.x.abs(), p.y.abs()])
        .fold(1.0f64, f64::max);
    1e-9 * span * span
}

/// Fits quadrilateral-to-screen homographies and maps gaze through them
#[derive(Debug, Clone, Default)]
pub struct ScreenMapper {
    target: ScreenTarget,
    ransac: RansacConfig,
}

impl ScreenMapper {
    pub fn new(target: ScreenTarget, ransac: RansacConfig) -> Self {
        Self { target, ransac }
    }

    pub fn target(&self) -> &ScreenTarget {
        &self.target
    }

    /// Homography taking the quadrilateral's corners onto the target rectangle
    pub fn fit(&self, quad: &Quadrilateral) -> Option<Homography> {
        match fit_homography_ransac(&quad.corners(), &self.target.corners(), &self.ransac) {
            Ok(h) => Some(h),
            Err(e) => {
                log::debug!("Homography fit failed: {e}");
                None
            }
        }
    }

    /// Map a gaze sample from a `frame_width` x `frame_height` frame onto the screen
    pub fn map_gaze(
        &self,
        homography: &Homography,
        sample: &GazeSample,
        space: GazeSpace,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<MappedPoint> {
        let (x, y) = space.to_frame_pixels(sample.gx, sample.gy, frame_width, frame_height);
        homography.project(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad(pts: [(f64, f64); 4]) -> Quadrilateral {
        Quadrilateral {
            tl: Point::new(pts[0].0, pts[0].1),
            tr: Point::new(pts[1].0, pts[1].1),
            br: Point::new(pts[2].0, pts[2].1),
            bl: Point::new(pts[3].0, pts[3].1),
        }
    }

    #[test]
    fn identity_fit_maps_normalized_center_to_screen_center() {
        let mapper = ScreenMapper::default();
        let q = quad([(0.0, 0.0), (1920.0, 0.0), (1920.0, 1080.0), (0.0, 1080.0)]);
        let h = mapper.fit(&q).expect("fit");

        let sample = GazeSample {
            timestamp_ns: 1,
            gx: 0.5,
            gy: 0.5,
            worn: true,
        };
        let p = mapper
            .map_gaze(&h, &sample, GazeSpace::Normalized, 1920, 1080)
            .expect("projected");
        assert_relative_eq!(p.px, 960.0, epsilon = 1e-2);
        assert_relative_eq!(p.py, 540.0, epsilon = 1e-2);
    }

    #[test]
    fn perspective_quad_corners_land_on_target_corners() {
        let mapper = ScreenMapper::default();
        let q = quad([(212.0, 140.0), (1010.0, 96.0), (1064.0, 620.0), (180.0, 588.0)]);
        let h = mapper.fit(&q).expect("fit");

        for (src, dst) in q.corners().iter().zip(mapper.target().corners()) {
            let p = h.project(src.x as f32, src.y as f32).expect("projected");
            assert_relative_eq!(p.px as f64, dst.x, epsilon = 0.5);
            assert_relative_eq!(p.py as f64, dst.y, epsilon = 0.5);
        }
    }

    #[test]
    fn pixel_space_gaze_is_projected_as_is() {
        let mapper = ScreenMapper::default();
        let q = quad([(100.0, 100.0), (1060.0, 100.0), (1060.0, 640.0), (100.0, 640.0)]);
        let h = mapper.fit(&q).expect("fit");
        let sample = GazeSample {
            timestamp_ns: 0,
            gx: 580.0,
            gy: 370.0,
            worn: true,
        };
        let p = mapper
            .map_gaze(&h, &sample, GazeSpace::Pixels, 1280, 720)
            .expect("projected");
        assert_relative_eq!(p.px, 960.0, epsilon = 0.5);
        assert_relative_eq!(p.py, 540.0, epsilon = 0.5);
    }

    #[test]
    fn degenerate_quadrilaterals_do_not_fit() {
        let mapper = ScreenMapper::default();
        let collinear = quad([(0.0, 0.0), (100.0, 100.0), (200.0, 200.0), (0.0, 300.0)]);
        assert!(mapper.fit(&collinear).is_none());

        let duplicate = quad([(10.0, 10.0), (10.0, 10.0), (400.0, 300.0), (0.0, 300.0)]);
        assert!(mapper.fit(&duplicate).is_none());

        assert_eq!(
            fit_homography_ransac(
                &[Point::new(0.0, 0.0); 3],
                &[Point::new(0.0, 0.0); 3],
                &RansacConfig::default()
            ),
            Err(HomographyError::TooFewPoints { needed: 4, got: 3 })
        );
    }

    #[test]
    fn zero_denominator_is_absent() {
        // denom = gx - 0.5
        let h = Homography::from_matrix(Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, -0.5));
        assert_eq!(h.project(0.5, 0.25), None);
        assert!(h.project(0.75, 0.25).is_some());
    }

    #[test]
    fn projection_applies_perspective_divide() {
        let h = Homography::from_matrix(Matrix3::new(2.0, 0.0, 1.0, 0.0, 3.0, 2.0, 0.0, 0.0, 2.0));
        let p = h.project(1.0, 2.0).expect("projected");
        assert_relative_eq!(p.px, 1.5);
        assert_relative_eq!(p.py, 4.0);
        assert_eq!(Homography::identity().project(3.0, 4.0), Some(MappedPoint { px: 3.0, py: 4.0 }));
    }
}
