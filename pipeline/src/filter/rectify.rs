use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::{debug, warn};

/// A region-of-interest corner in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

/// Assign corner roles to four arbitrarily ordered points.
///
/// Returns `[top_left, top_right, bottom_right, bottom_left]`: smallest
/// `x + y` is top-left, largest is bottom-right, smallest `y - x` is
/// top-right and largest is bottom-left.
pub fn order_corners(points: &[Point; 4]) -> [Point; 4] {
    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.y - p.x;
    [
        extreme(points, sum, false),
        extreme(points, diff, false),
        extreme(points, sum, true),
        extreme(points, diff, true),
    ]
}

fn extreme(points: &[Point; 4], key: impl Fn(&Point) -> f64, largest: bool) -> Point {
    points[1..].iter().fold(points[0], |best, p| {
        let better = if largest {
            key(p) > key(&best)
        } else {
            key(p) < key(&best)
        };
        if better {
            *p
        } else {
            best
        }
    })
}

/// Output size for an ordered quadrilateral: the longer of the top/bottom
/// edges by the longer of the left/right edges, at least 1x1.
pub fn destination_size(corners: &[Point; 4]) -> (u32, u32) {
    let [tl, tr, br, bl] = corners;
    let width = tl.distance(tr).max(bl.distance(br));
    let height = tl.distance(bl).max(tr.distance(br));
    (
        (width.round() as u32).max(1),
        (height.round() as u32).max(1),
    )
}

/// Warp the quadrilateral `points` of `image` onto an upright rectangle.
///
/// Anything other than exactly four points leaves the frame unchanged.
/// Degenerate quadrilaterals produce a best-effort image rather than an
/// error.
pub fn rectify(image: &RgbImage, points: &[Point]) -> RgbImage {
    let points: &[Point; 4] = match points.try_into() {
        Ok(p) => p,
        Err(_) => {
            if !points.is_empty() {
                debug!(count = points.len(), "region does not have 4 points, not rectifying");
            }
            return image.clone();
        }
    };

    let corners = order_corners(points);
    let (out_w, out_h) = destination_size(&corners);
    let (max_x, max_y) = ((out_w - 1) as f32, (out_h - 1) as f32);

    let src = corners.map(|p| (p.x as f32, p.y as f32));
    let dst = [(0.0, 0.0), (max_x, 0.0), (max_x, max_y), (0.0, max_y)];

    let projection = match Projection::from_control_points(src, dst) {
        Some(p) => p,
        None => {
            warn!(?src, "degenerate region, falling back to a plain resize");
            return image::imageops::resize(
                image,
                out_w,
                out_h,
                image::imageops::FilterType::Triangle,
            );
        }
    };

    let mut output = RgbImage::new(out_w, out_h);
    warp_into(
        image,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut output,
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 255 / (w - 1)) as u8, (y * 255 / (h - 1)) as u8, 128])
        })
    }

    #[test]
    fn corner_roles_from_shuffled_points() {
        let points = [
            Point::new(90.0, 80.0),
            Point::new(10.0, 75.0),
            Point::new(95.0, 5.0),
            Point::new(5.0, 10.0),
        ];
        let [tl, tr, br, bl] = order_corners(&points);
        assert_eq!(tl, Point::new(5.0, 10.0));
        assert_eq!(tr, Point::new(95.0, 5.0));
        assert_eq!(br, Point::new(90.0, 80.0));
        assert_eq!(bl, Point::new(10.0, 75.0));
    }

    #[test]
    fn size_uses_longer_edges() {
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(80.0, 60.0),
            Point::new(20.0, 50.0),
        ];
        let (w, h) = destination_size(&corners);
        assert_eq!(w, 100);
        // Right edge: (100,0)-(80,60) is longer than the left edge.
        assert_eq!(h, (20f64.powi(2) + 60f64.powi(2)).sqrt().round() as u32);
    }

    #[test]
    fn wrong_point_count_passes_through() {
        let image = gradient(20, 10);
        assert_eq!(rectify(&image, &[]), image);
        let three = [Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(5.0, 5.0)];
        assert_eq!(rectify(&image, &three), image);
    }

    #[test]
    fn full_frame_region_reproduces_frame() {
        let (w, h) = (64u32, 48u32);
        let image = gradient(w, h);
        let max = ((w - 1) as f64, (h - 1) as f64);
        let region = [
            Point::new(max.0, max.1),
            Point::new(0.0, 0.0),
            Point::new(0.0, max.1),
            Point::new(max.0, 0.0),
        ];
        let output = rectify(&image, &region);
        assert_eq!(output.dimensions(), (w - 1, h - 1));

        let expected = image::imageops::resize(
            &image,
            w - 1,
            h - 1,
            image::imageops::FilterType::Triangle,
        );
        // The outermost ring samples exactly on the source border, where
        // bilinear lookups may fall back to the default pixel.
        let mut worst = 0u8;
        for y in 1..h - 2 {
            for x in 1..w - 2 {
                let (a, b) = (output.get_pixel(x, y), expected.get_pixel(x, y));
                for c in 0..3 {
                    worst = worst.max(a.0[c].abs_diff(b.0[c]));
                }
            }
        }
        assert!(worst <= 12, "resampling error too large: {worst}");
    }

    #[test]
    fn degenerate_region_does_not_panic() {
        let image = gradient(30, 30);
        let collinear = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(29.0, 29.0),
        ];
        let output = rectify(&image, &collinear);
        assert!(output.width() >= 1 && output.height() >= 1);
    }
}
