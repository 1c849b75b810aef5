//! Planar geometry helpers used by the detector and the mapper

use crate::types::{Point, Quadrilateral};

/// Order four corner points as `TL, TR, BR, BL`.
///
/// TL/BR take the minimum/maximum `x + y`; TR/BL take the minimum/maximum
/// `y - x`. Ties resolve to the earliest input point.
pub fn order_points(pts: [Point; 4]) -> Quadrilateral {
    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.y - p.x;

    Quadrilateral {
        tl: pts[arg_extreme(&pts, sum, false)],
        tr: pts[arg_extreme(&pts, diff, false)],
        br: pts[arg_extreme(&pts, sum, true)],
        bl: pts[arg_extreme(&pts, diff, true)],
    }
}

fn arg_extreme(pts: &[Point; 4], key: impl Fn(&Point) -> f64, max: bool) -> usize {
    let mut best = 0;
    for i in 1..pts.len() {
        let better = if max {
            key(&pts[i]) > key(&pts[best])
        } else {
            key(&pts[i]) < key(&pts[best])
        };
        if better {
            best = i;
        }
    }
    best
}

/// Unsigned area enclosed by a closed polygon (shoelace formula)
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += p.x * q.y - q.x * p.y;
    }
    (twice / 2.0).abs()
}

/// Z component of `(b - a) x (c - b)`
fn turn(a: &Point, b: &Point, c: &Point) -> f64 {
    (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x)
}

/// True when every turn of the closed polygon has the same, non-zero sign.
///
/// A straight (zero) turn counts as non-convex.
pub fn is_convex(points: &[Point]) -> bool {
    if points.len() < 3 {
        return false;
    }
    let n = points.len();
    let mut sign = 0.0f64;
    for i in 0..n {
        let t = turn(&points[i], &points[(i + 1) % n], &points[(i + 2) % n]);
        if t == 0.0 {
            return false;
        }
        if sign == 0.0 {
            sign = t.signum();
        } else if t.signum() != sign {
            return false;
        }
    }
    true
}

/// True when any three of the points are collinear (or coincide) within `tolerance`,
/// measured as twice the triangle area.
pub fn has_collinear_triple(points: &[Point], tolerance: f64) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let (a, b, c) = (&points[i], &points[j], &points[k]);
                let cross = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
                if cross.abs() <= tolerance {
                    return true;
                }
            }
        }
    }
    false
}

/// Infinite line through `origin` along the unit vector `direction`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub origin: Point,
    pub direction: (f64, f64),
}

impl Line {
    /// Total least-squares fit: centroid plus the principal axis of the scatter.
    ///
    /// `None` for fewer than two distinct points.
    pub fn fit(points: &[Point]) -> Option<Line> {
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let mx = points.iter().map(|p| p.x).sum::<f64>() / n;
        let my = points.iter().map(|p| p.y).sum::<f64>() / n;

        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for p in points {
            let (dx, dy) = (p.x - mx, p.y - my);
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        if sxx + syy == 0.0 {
            return None;
        }

        let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
        Some(Line {
            origin: Point::new(mx, my),
            direction: (theta.cos(), theta.sin()),
        })
    }

    /// Crossing point of two lines; `None` when they are (nearly) parallel
    pub fn intersect(&self, other: &Line) -> Option<Point> {
        let (d1, d2) = (self.direction, other.direction);
        let denom = d1.0 * d2.1 - d1.1 * d2.0;
        if denom.abs() < 1e-9 {
            return None;
        }
        let (wx, wy) = (other.origin.x - self.origin.x, other.origin.y - self.origin.y);
        let t = (wx * d2.1 - wy * d2.0) / denom;
        Some(Point::new(
            self.origin.x + t * d1.0,
            self.origin.y + t * d1.1,
        ))
    }
}

/// Convert imageproc contour points into floating-point image coordinates
pub fn to_points(points: &[imageproc::point::Point<i32>]) -> Vec<Point> {
    points
        .iter()
        .map(|p| Point::new(p.x as f64, p.y as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_invariant(q: &Quadrilateral, pts: &[Point; 4]) {
        let sums: Vec<f64> = pts.iter().map(|p| p.x + p.y).collect();
        let diffs: Vec<f64> = pts.iter().map(|p| p.y - p.x).collect();
        let min = |v: &[f64]| v.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = |v: &[f64]| v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        assert_eq!(q.tl.x + q.tl.y, min(&sums));
        assert_eq!(q.br.x + q.br.y, max(&sums));
        assert_eq!(q.tr.y - q.tr.x, min(&diffs));
        assert_eq!(q.bl.y - q.bl.x, max(&diffs));
    }

    #[test]
    fn orders_axis_aligned_rectangle_from_any_start() {
        let tl = Point::new(100.0, 100.0);
        let tr = Point::new(1000.0, 100.0);
        let br = Point::new(1000.0, 650.0);
        let bl = Point::new(100.0, 650.0);

        let permutations = [
            [tl, tr, br, bl],
            [br, bl, tl, tr],
            [bl, tl, tr, br],
            [tr, bl, br, tl],
        ];
        for pts in permutations {
            let q = order_points(pts);
            assert_eq!(q.corners(), [tl, tr, br, bl]);
            check_invariant(&q, &pts);
        }
    }

    #[test]
    fn orders_perspective_quad() {
        let pts = [
            Point::new(310.0, 420.0),
            Point::new(80.0, 95.0),
            Point::new(355.0, 60.0),
            Point::new(40.0, 380.0),
        ];
        let q = order_points(pts);
        check_invariant(&q, &pts);
        assert_eq!(q.tl, Point::new(80.0, 95.0));
        assert_eq!(q.tr, Point::new(355.0, 60.0));
        assert_eq!(q.br, Point::new(310.0, 420.0));
        assert_eq!(q.bl, Point::new(40.0, 380.0));
    }

    #[test]
    fn shoelace_area_ignores_orientation() {
        let cw = [
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 3.0),
            Point::new(0.0, 3.0),
        ];
        let mut ccw = cw;
        ccw.reverse();
        assert_eq!(polygon_area(&cw), 12.0);
        assert_eq!(polygon_area(&ccw), 12.0);
        assert_eq!(polygon_area(&cw[..2]), 0.0);
    }

    #[test]
    fn convexity() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(is_convex(&square));

        let dart = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(3.0, 3.0),
            Point::new(0.0, 10.0),
        ];
        assert!(!is_convex(&dart));

        let flat = [
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ];
        assert!(!is_convex(&flat));
    }

    #[test]
    fn fitted_lines_meet_at_corner() {
        let top: Vec<Point> = (110..990).map(|x| Point::new(x as f64, 100.0)).collect();
        let left: Vec<Point> = (110..640).map(|y| Point::new(100.0, y as f64)).collect();
        let top = Line::fit(&top).expect("top edge");
        let left = Line::fit(&left).expect("left edge");

        let corner = top.intersect(&left).expect("edges cross");
        assert!(corner.distance(&Point::new(100.0, 100.0)) < 1e-9, "{corner:?}");
        assert!(top.intersect(&top).is_none());
        assert!(Line::fit(&[Point::new(3.0, 3.0), Point::new(3.0, 3.0)]).is_none());
    }

    #[test]
    fn collinear_and_duplicate_points() {
        let collinear = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(0.0, 5.0),
        ];
        assert!(has_collinear_triple(&collinear, 1e-9));

        let duplicate = [
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(3.0, 1.0),
            Point::new(0.0, 5.0),
        ];
        assert!(has_collinear_triple(&duplicate, 1e-9));

        let square = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!(!has_collinear_triple(&square, 1e-9));
    }
}
