// Skew estimation from the minimum-area rectangle around the foreground.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{Interpolation, rotate};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use tracing::{debug, instrument};

use super::is_empty;

/// Rotations smaller than this (degrees) are skipped.
const MIN_CORRECTION_DEG: f64 = 0.01;

/// A rotated rectangle as produced by [`min_area_rect`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: (f64, f64),
    /// Extent along the rectangle's first side.
    pub width: f64,
    /// Extent perpendicular to the first side.
    pub height: f64,
    /// Angle of the first side in degrees, normalized into `[-90, 0)`.
    pub angle: f64,
}

impl RotatedRect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Skew angle in `[-45, 45)`: angles below -45 wrap by adding 90.
    pub fn skew_angle(&self) -> f64 {
        if self.angle < -45.0 {
            self.angle + 90.0
        } else {
            self.angle
        }
    }
}

/// Coordinates of every nonzero pixel.
pub fn foreground_points(gray: &GrayImage) -> Vec<Point<i32>> {
    gray.enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] != 0)
        .map(|(x, y, _)| Point::new(x as i32, y as i32))
        .collect()
}

/// Smallest-area enclosing rectangle of a point set (rotating calipers over
/// the convex hull). `None` for an empty set.
pub fn min_area_rect(points: &[Point<i32>]) -> Option<RotatedRect> {
    if points.is_empty() {
        return None;
    }

    let hull: Vec<(f64, f64)> = convex_hull(points)
        .into_iter()
        .map(|p| (p.x as f64, p.y as f64))
        .collect();

    if hull.len() == 1 {
        return Some(RotatedRect {
            center: hull[0],
            width: 0.0,
            height: 0.0,
            angle: -90.0,
        });
    }

    let mut best: Option<RotatedRect> = None;
    for i in 0..hull.len() {
        let (ax, ay) = hull[i];
        let (bx, by) = hull[(i + 1) % hull.len()];
        let length = (bx - ax).hypot(by - ay);
        if length == 0.0 {
            continue;
        }
        // Unit vector along the edge and its normal.
        let (ux, uy) = ((bx - ax) / length, (by - ay) / length);
        let (nx, ny) = (-uy, ux);

        let (mut u_min, mut u_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut v_min, mut v_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for &(px, py) in &hull {
            let u = px * ux + py * uy;
            let v = px * nx + py * ny;
            u_min = u_min.min(u);
            u_max = u_max.max(u);
            v_min = v_min.min(v);
            v_max = v_max.max(v);
        }

        let u_mid = (u_min + u_max) / 2.0;
        let v_mid = (v_min + v_max) / 2.0;
        let candidate = RotatedRect {
            center: (ux * u_mid + nx * v_mid, uy * u_mid + ny * v_mid),
            width: u_max - u_min,
            height: v_max - v_min,
            angle: normalize_angle(uy.atan2(ux).to_degrees()),
        };

        if best.is_none_or(|b| candidate.area() < b.area()) {
            best = Some(candidate);
        }
    }

    best
}

/// Fold an edge direction into `[-90, 0)`. A rectangle is symmetric under
/// quarter turns, so every edge direction has exactly one representative.
fn normalize_angle(degrees: f64) -> f64 {
    let folded = degrees.rem_euclid(90.0);
    if folded == 0.0 { -90.0 } else { folded - 90.0 }
}

/// Estimated skew of the nonzero foreground in degrees, in `[-45, 45)`.
///
/// Positive angles mean the content slopes down to the right.
pub fn estimate_skew_angle(gray: &GrayImage) -> Option<f64> {
    let points = foreground_points(gray);
    min_area_rect(&points).map(|rect| rect.skew_angle())
}

/// Rotate the image so that the foreground's bounding rectangle is axis
/// aligned. Foreground = nonzero pixels.
///
/// Deskewing is advisory: an image with no foreground (or an empty image)
/// comes back unchanged. The output always has the input's dimensions;
/// uncovered corners are filled with 0.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn deskew(gray: &GrayImage) -> GrayImage {
    if is_empty(gray) {
        return gray.clone();
    }

    let points = foreground_points(gray);
    let Some(rect) = min_area_rect(&points) else {
        debug!("No foreground pixels; skipping deskew");
        return gray.clone();
    };

    let angle = rect.skew_angle();
    debug!(angle, center = ?rect.center, "Estimated skew");
    if angle.abs() < MIN_CORRECTION_DEG {
        return gray.clone();
    }

    // `rotate` turns clockwise for positive theta; undo a clockwise skew.
    rotate(
        gray,
        (rect.center.0 as f32, rect.center.1 as f32),
        (-angle).to_radians() as f32,
        Interpolation::Bicubic,
        Luma([0]),
    )
}
