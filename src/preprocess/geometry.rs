// Page geometry corrections: perspective dewarp and quarter-turn orientation.

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use tracing::{debug, instrument, warn};

use super::is_empty;
use super::threshold::{ThresholdParams, adaptive_threshold, binarize_otsu};

/// Douglas-Peucker tolerance used to reduce the page outline to a polygon.
const OUTLINE_EPSILON: f64 = 20.0;

/// Flatten a photographed page: find the largest external outline of the
/// mean-thresholded image, reduce it to a polygon and, when that polygon is a
/// quadrilateral, warp it onto an upright rectangle.
///
/// Anything other than a clean quadrilateral leaves the image unchanged.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn dewarp(gray: &GrayImage) -> GrayImage {
    if is_empty(gray) {
        return gray.clone();
    }

    let binary = adaptive_threshold(gray, &ThresholdParams::mean(31, 10));
    let contours = find_contours::<i32>(&binary);

    let Some(largest) = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .max_by(|a, b| polygon_area(&a.points).total_cmp(&polygon_area(&b.points)))
    else {
        debug!("No external contour; skipping dewarp");
        return gray.clone();
    };

    let quad = approximate_polygon_dp(&largest.points, OUTLINE_EPSILON, true);
    if quad.len() != 4 {
        debug!(vertices = quad.len(), "Page outline is not a quadrilateral");
        return gray.clone();
    }

    let [top_left, top_right, bottom_left, bottom_right] = order_corners(&quad);
    let distance = |a: (f32, f32), b: (f32, f32)| (a.0 - b.0).hypot(a.1 - b.1);
    let out_w = distance(top_left, top_right).max(distance(bottom_left, bottom_right));
    let out_h = distance(top_left, bottom_left).max(distance(top_right, bottom_right));
    if out_w < 2.0 || out_h < 2.0 {
        warn!(out_w, out_h, "Degenerate page outline; returning unchanged");
        return gray.clone();
    }

    let src = [top_left, top_right, bottom_left, bottom_right];
    let dst = [
        (0.0, 0.0),
        (out_w - 1.0, 0.0),
        (0.0, out_h - 1.0),
        (out_w - 1.0, out_h - 1.0),
    ];
    let Some(projection) = Projection::from_control_points(src, dst) else {
        warn!("Failed to compute projective transform; returning unchanged");
        return gray.clone();
    };

    let mut output = GrayImage::new(out_w as u32, out_h as u32);
    warp_into(gray, &projection, Interpolation::Bilinear, Luma([255]), &mut output);
    debug!(
        out_w = output.width(),
        out_h = output.height(),
        "Dewarp applied"
    );
    output
}

/// Order four points as top-left, top-right, bottom-left, bottom-right.
fn order_corners(quad: &[Point<i32>]) -> [(f32, f32); 4] {
    let mut sorted: Vec<Point<i32>> = quad.to_vec();
    sorted.sort_by_key(|p| p.y);
    let (top, bottom) = sorted.split_at(2);
    let pair = |pts: &[Point<i32>]| {
        let (a, b) = (pts[0], pts[1]);
        if a.x <= b.x { (a, b) } else { (b, a) }
    };
    let (tl, tr) = pair(top);
    let (bl, br) = pair(bottom);
    let f = |p: Point<i32>| (p.x as f32, p.y as f32);
    [f(tl), f(tr), f(bl), f(br)]
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for i in 0..n {
        let j = (i + 1) % n;
        twice_area += points[i].x as i64 * points[j].y as i64;
        twice_area -= points[j].x as i64 * points[i].y as i64;
    }
    twice_area.abs() as f64 / 2.0
}

/// Rotate a page lying on its side by a quarter turn clockwise.
///
/// Text lines make row sums of the binarized page vary strongly while column
/// sums stay flat. When the column profile varies more than the row profile
/// the page is assumed to be sideways.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn auto_orient(gray: &GrayImage) -> GrayImage {
    if is_empty(gray) {
        return gray.clone();
    }

    let binary = binarize_otsu(gray);
    let (width, height) = binary.dimensions();
    let mut rows = vec![0f64; height as usize];
    let mut cols = vec![0f64; width as usize];
    for (x, y, p) in binary.enumerate_pixels() {
        let v = p.0[0] as f64;
        rows[y as usize] += v;
        cols[x as usize] += v;
    }

    let row_var = variance(&rows);
    let col_var = variance(&cols);
    debug!(row_var, col_var, "Projection variances");

    if col_var > row_var {
        debug!("Rotating page 90 degrees clockwise");
        image::imageops::rotate90(gray)
    } else {
        gray.clone()
    }
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn striped(width: u32, height: u32, horizontal: bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let k = if horizontal { y } else { x };
            if (k / 10) % 2 == 1 { Luma([0]) } else { Luma([255]) }
        })
    }

    #[test]
    fn test_auto_orient_keeps_horizontal_text() {
        let page = striped(120, 80, true);
        let out = auto_orient(&page);
        assert_eq!(out, page);
    }

    #[test]
    fn test_auto_orient_rotates_vertical_text() {
        let page = striped(120, 80, false);
        let out = auto_orient(&page);
        assert_eq!(out.dimensions(), (80, 120));
    }

    #[test]
    fn test_auto_orient_blank_page_unchanged() {
        let page = GrayImage::from_pixel(30, 20, Luma([255]));
        assert_eq!(auto_orient(&page), page);
    }

    #[test]
    fn test_order_corners() {
        let quad = vec![
            Point::new(90, 95),
            Point::new(5, 10),
            Point::new(100, 0),
            Point::new(0, 100),
        ];
        let [tl, tr, bl, br] = order_corners(&quad);
        assert_eq!(tl, (5.0, 10.0));
        assert_eq!(tr, (100.0, 0.0));
        assert_eq!(bl, (0.0, 100.0));
        assert_eq!(br, (90.0, 95.0));
    }

    #[test]
    fn test_polygon_area_square() {
        let square = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert_eq!(polygon_area(&square), 100.0);
    }

    #[test]
    fn test_dewarp_document_on_dark_background() {
        // Bright sheet on a dark table: the outline is the sheet.
        let img = GrayImage::from_fn(160, 200, |x, y| {
            if (20..140).contains(&x) && (30..180).contains(&y) {
                Luma([235])
            } else {
                Luma([25])
            }
        });
        let out = dewarp(&img);
        assert!(out.width() > 0 && out.height() > 0);
        assert!(out.width() <= img.width() && out.height() <= img.height());
    }

    #[test]
    fn test_dewarp_and_orient_empty() {
        assert!(is_empty(&dewarp(&GrayImage::new(0, 0))));
        assert!(is_empty(&auto_orient(&GrayImage::new(4, 0))));
    }
}
