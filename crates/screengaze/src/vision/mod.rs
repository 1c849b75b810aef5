//! Vision pathway - screen corner detection in scene-camera frames
//!
//! One frame in, zero or one ordered quadrilateral out. The detector keeps no
//! state between frames; it reads the current [`DetectionParameters`] from its
//! [`ParameterHandle`] on every call.

mod annotate;
mod params;

pub use annotate::annotate_detection;
pub use params::{
    DetectionParameters, ParameterHandle, TrackbarPositions, MIN_APPROX_POLY_FACTOR,
    MIN_AREA_FRACTION, MIN_ASPECT_RATIO_TOLERANCE,
};

use crate::geometry;
use crate::types::{Point, Quadrilateral};
use image::{GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point as ImgPoint;

/// Why a candidate polygon was turned down
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CandidateRejection {
    /// The approximation did not have exactly four vertices
    VertexCount(usize),
    NotConvex,
    /// Average width or height collapsed to zero
    ZeroExtent,
    AspectRatio { detected: f64 },
    TooSmall { area: f64, min_area: f64 },
}

/// Stateless screen detector bound to a live parameter source
#[derive(Debug, Clone, Default)]
pub struct ScreenDetector {
    params: ParameterHandle,
}

impl ScreenDetector {
    pub fn new(params: ParameterHandle) -> Self {
        Self { params }
    }

    pub fn parameters(&self) -> &ParameterHandle {
        &self.params
    }

    /// Detect the screen outline in `image` using the parameters current right now
    pub fn detect(&self, image: &RgbImage) -> Option<Quadrilateral> {
        detect_screen(image, &self.params.current())
    }
}

/// Grayscale, blur and Canny-edge a frame
pub fn edge_map(image: &RgbImage, params: &DetectionParameters) -> GrayImage {
    let gray = image::imageops::grayscale(image);
    let blurred = match params.blur_sigma() {
        Some(sigma) => imageproc::filter::gaussian_blur_f32(&gray, sigma),
        None => gray,
    };

    let (low, high) = if params.canny_low <= params.canny_high {
        (params.canny_low, params.canny_high)
    } else {
        (params.canny_high, params.canny_low)
    };
    imageproc::edges::canny(&blurred, low as f32, high as f32)
}

/// Find the largest contour in `image` that passes every screen check.
pub fn detect_screen(image: &RgbImage, params: &DetectionParameters) -> Option<Quadrilateral> {
    let edges = edge_map(image, params);
    let image_area = image.width() as f64 * image.height() as f64;

    // External contours only, largest enclosed area first.
    let mut contours: Vec<(f64, Vec<ImgPoint<i32>>)> = find_contours::<i32>(&edges)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| (geometry::polygon_area(&geometry::to_points(&c.points)), c.points))
        .collect();
    contours.sort_by(|a, b| b.0.total_cmp(&a.0));

    for (area, contour) in &contours {
        if contour.len() < 4 {
            continue;
        }
        let perimeter = arc_length(contour, true);
        let epsilon = params.approx_poly_factor() * perimeter;
        if !(epsilon > 0.0) {
            continue;
        }

        let mut approx = geometry::to_points(&approximate_closed_contour(contour, epsilon));
        if approx.len() == 4 {
            refine_corners(&mut approx, &geometry::to_points(contour));
        }
        match screen_candidate(&approx, params, image_area) {
            Ok(quad) => {
                log::trace!("Screen contour accepted (contour area {:.0})", area);
                return Some(quad);
            }
            Err(rejection) => log::trace!("Contour rejected: {:?}", rejection),
        }
    }

    None
}

/// Douglas-Peucker over a closed contour.
///
/// The curve is split at its min-`x + y` point and the point farthest from
/// it, and each half is simplified as an open curve. Both split points are
/// extreme points of the outline, so the raster-scan start of the contour
/// never becomes a vertex on its own.
pub fn approximate_closed_contour(contour: &[ImgPoint<i32>], epsilon: f64) -> Vec<ImgPoint<i32>> {
    let n = contour.len();
    let Some(start) = (0..n).min_by_key(|&i| contour[i].x + contour[i].y) else {
        return Vec::new();
    };
    let a = contour[start];
    let dist2 = |p: &ImgPoint<i32>| {
        let (dx, dy) = ((p.x - a.x) as i64, (p.y - a.y) as i64);
        dx * dx + dy * dy
    };
    let rotated: Vec<ImgPoint<i32>> = contour[start..]
        .iter()
        .chain(&contour[..start])
        .copied()
        .collect();
    let Some(split) = (1..n).max_by_key(|&i| dist2(&rotated[i])) else {
        return Vec::new();
    };
    if dist2(&rotated[split]) == 0 {
        return Vec::new();
    }

    let mut closing = rotated[split..].to_vec();
    closing.push(a);

    let mut polygon = approximate_polygon_dp(&rotated[..=split], epsilon, false);
    let back = approximate_polygon_dp(&closing, epsilon, false);
    polygon.pop();
    polygon.extend_from_slice(&back[..back.len() - 1]);
    polygon
}

/// Replace each vertex of a four-sided approximation with the crossing of
/// straight lines fitted to the contour along its two sides.
///
/// Only the middle 80% of each side feeds the fit, so rounded edge-map
/// corners do not pull the lines. A vertex whose sides cannot be fitted is
/// left as is.
fn refine_corners(approx: &mut [Point], contour: &[Point]) {
    let n = approx.len();
    let lines: Vec<Option<geometry::Line>> = (0..n)
        .map(|i| side_line(approx[i], approx[(i + 1) % n], contour))
        .collect();

    let refined: Vec<Point> = (0..n)
        .map(|i| match (&lines[(i + n - 1) % n], &lines[i]) {
            (Some(before), Some(after)) => before.intersect(after).unwrap_or(approx[i]),
            _ => approx[i],
        })
        .collect();
    approx.copy_from_slice(&refined);
}

fn side_line(a: Point, b: Point, contour: &[Point]) -> Option<geometry::Line> {
    let (ux, uy) = (b.x - a.x, b.y - a.y);
    let len2 = ux * ux + uy * uy;
    if len2 == 0.0 {
        return None;
    }
    let len = len2.sqrt();
    let band = (0.02 * len).max(3.0);

    let near: Vec<Point> = contour
        .iter()
        .filter(|p| {
            let (wx, wy) = (p.x - a.x, p.y - a.y);
            let t = (wx * ux + wy * uy) / len2;
            let off = (ux * wy - uy * wx).abs() / len;
            (0.1..=0.9).contains(&t) && off <= band
        })
        .copied()
        .collect();
    geometry::Line::fit(&near)
}

/// Apply the vertex, convexity, aspect-ratio and area checks to one approximated polygon.
pub fn screen_candidate(
    polygon: &[Point],
    params: &DetectionParameters,
    image_area: f64,
) -> Result<Quadrilateral, CandidateRejection> {
    if polygon.len() != 4 {
        return Err(CandidateRejection::VertexCount(polygon.len()));
    }
    if !geometry::is_convex(polygon) {
        return Err(CandidateRejection::NotConvex);
    }

    let quad = geometry::order_points([polygon[0], polygon[1], polygon[2], polygon[3]]);
    let width = quad.average_width();
    let height = quad.average_height();
    if width == 0.0 || height == 0.0 {
        return Err(CandidateRejection::ZeroExtent);
    }

    let target = params.target_aspect_ratio;
    let detected = width / height;
    if (detected - target).abs() > params.aspect_ratio_tolerance() * target {
        return Err(CandidateRejection::AspectRatio { detected });
    }

    let min_area = params.min_area_fraction() * image_area;
    let area = geometry::polygon_area(polygon);
    if area < min_area {
        return Err(CandidateRejection::TooSmall { area, min_area });
    }

    Ok(quad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
    use imageproc::rect::Rect;

    const IMAGE_AREA: f64 = 1280.0 * 720.0;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> [Point; 4] {
        [
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ]
    }

    fn frame_with_rect(x: i32, y: i32, w: u32, h: u32) -> RgbImage {
        let mut img = RgbImage::new(1200, 760);
        draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(w, h), Rgb([255, 255, 255]));
        img
    }

    #[test]
    fn exact_sixteen_by_nine_accepted_for_any_tolerance() {
        let poly = rect(100.0, 100.0, 640.0, 360.0);
        for tolerance in [0.0, 0.001, 0.01, 0.26, 1.0] {
            let params = DetectionParameters {
                aspect_ratio_tolerance: tolerance,
                ..Default::default()
            };
            let quad = screen_candidate(&poly, &params, IMAGE_AREA).expect("16:9 accepted");
            assert_eq!(quad.tl, Point::new(100.0, 100.0));
            assert_eq!(quad.br, Point::new(740.0, 460.0));
        }
    }

    #[test]
    fn aspect_ratio_outside_tolerance_rejected() {
        let params = DetectionParameters {
            aspect_ratio_tolerance: 0.1,
            ..Default::default()
        };
        // 4:3 deviates by 0.444, beyond 0.1 * 16/9 = 0.178
        let poly = rect(100.0, 100.0, 400.0, 300.0);
        assert!(matches!(
            screen_candidate(&poly, &params, IMAGE_AREA),
            Err(CandidateRejection::AspectRatio { .. })
        ));

        // Square at the default tolerance (limit 0.462, deviation 0.778)
        let square = rect(0.0, 0.0, 500.0, 500.0);
        assert!(matches!(
            screen_candidate(&square, &DetectionParameters::default(), IMAGE_AREA),
            Err(CandidateRejection::AspectRatio { .. })
        ));
    }

    #[test]
    fn small_polygon_rejected_by_area() {
        // 1.7% of 1280x720 is ~15667 px; a 64x36 screen is 2304 px
        let poly = rect(10.0, 10.0, 64.0, 36.0);
        assert!(matches!(
            screen_candidate(&poly, &DetectionParameters::default(), IMAGE_AREA),
            Err(CandidateRejection::TooSmall { .. })
        ));
    }

    #[test]
    fn non_quadrilaterals_and_concave_shapes_rejected() {
        let params = DetectionParameters::default();
        let triangle = [
            Point::new(0.0, 0.0),
            Point::new(600.0, 0.0),
            Point::new(300.0, 300.0),
        ];
        assert_eq!(
            screen_candidate(&triangle, &params, IMAGE_AREA),
            Err(CandidateRejection::VertexCount(3))
        );

        let dart = [
            Point::new(0.0, 0.0),
            Point::new(800.0, 0.0),
            Point::new(300.0, 100.0),
            Point::new(0.0, 450.0),
        ];
        assert_eq!(
            screen_candidate(&dart, &params, IMAGE_AREA),
            Err(CandidateRejection::NotConvex)
        );
    }

    #[test]
    fn detects_synthetic_screen() {
        let img = frame_with_rect(100, 100, 901, 551);
        let quad = detect_screen(&img, &DetectionParameters::default()).expect("screen detected");

        // Edge pixels sit on either side of the step, so allow one pixel per axis.
        let near = |p: Point, x: f64, y: f64| p.distance(&Point::new(x, y)) <= 1.5;
        assert!(near(quad.tl, 100.0, 100.0), "tl = {:?}", quad.tl);
        assert!(near(quad.tr, 1000.0, 100.0), "tr = {:?}", quad.tr);
        assert!(near(quad.br, 1000.0, 650.0), "br = {:?}", quad.br);
        assert!(near(quad.bl, 100.0, 650.0), "bl = {:?}", quad.bl);
    }

    #[test]
    fn detects_skewed_screen_corners() {
        let mut img = RgbImage::new(1200, 760);
        let corners = [
            ImgPoint::new(150, 120),
            ImgPoint::new(1000, 110),
            ImgPoint::new(980, 640),
            ImgPoint::new(120, 660),
        ];
        draw_polygon_mut(&mut img, &corners, Rgb([255, 255, 255]));

        let quad = detect_screen(&img, &DetectionParameters::default()).expect("screen detected");
        for (found, drawn) in quad.corners().iter().zip(corners) {
            let expected = Point::new(drawn.x as f64, drawn.y as f64);
            assert!(found.distance(&expected) <= 2.5, "{found:?} vs {expected:?}");
        }
    }

    #[test]
    fn closed_approximation_ignores_contour_start() {
        // Outline of a 40x20 rectangle, traced from the middle of its top edge
        let mut outline = Vec::new();
        outline.extend((20..=40).map(|x| ImgPoint::new(x, 0)));
        outline.extend((1..=20).map(|y| ImgPoint::new(40, y)));
        outline.extend((0..40).rev().map(|x| ImgPoint::new(x, 20)));
        outline.extend((0..20).rev().map(|y| ImgPoint::new(0, y)));
        outline.extend((1..20).map(|x| ImgPoint::new(x, 0)));

        let approx = approximate_closed_contour(&outline, 5.0);
        assert_eq!(approx.len(), 4, "{approx:?}");
        for corner in [(0, 0), (40, 0), (40, 20), (0, 20)] {
            assert!(approx.contains(&ImgPoint::new(corner.0, corner.1)), "{approx:?}");
        }
        assert!(!approx.contains(&ImgPoint::new(20, 0)));
    }

    #[test]
    fn blank_frame_has_no_screen() {
        let img = RgbImage::new(640, 360);
        assert_eq!(detect_screen(&img, &DetectionParameters::default()), None);
    }

    #[test]
    fn tall_rectangle_is_not_a_screen() {
        let img = frame_with_rect(300, 100, 300, 550);
        assert_eq!(detect_screen(&img, &DetectionParameters::default()), None);
    }

    #[test]
    fn detector_reads_live_parameters() {
        let handle = ParameterHandle::default();
        let detector = ScreenDetector::new(handle.clone());
        let img = frame_with_rect(100, 100, 901, 551);
        assert!(detector.detect(&img).is_some());

        // A screen this size needs more than 90% of the frame once tuned up.
        handle.set_parameters(DetectionParameters {
            min_area_fraction: 0.9,
            ..Default::default()
        });
        assert!(detector.detect(&img).is_none());
    }
}
