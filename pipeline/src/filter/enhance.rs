use std::f32::consts::PI;

use image::{Rgb, RgbImage};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use kaptchi_common::config::EnhanceConfig;

use super::traits::ImageFilter;

/// Whiteboard enhancement.
///
/// 1. Estimate local illumination with a median blur (removes strokes)
///    followed by a small Gaussian blur
/// 2. Divide each channel by the estimate, capped at 1
/// 3. Push the ratio through `0.5 - 0.5 * cos(ratio^p * PI)`
///
/// Paper ends up near white and ink is driven towards saturated dark
/// colours. A uniform frame has ratio 1 everywhere and comes out white.
pub struct EnhanceFilter {
    median_radius: u32,
    sigma: f32,
    exponent: f32,
}

impl EnhanceFilter {
    pub fn new(config: &EnhanceConfig) -> Self {
        Self {
            median_radius: config.median_kernel / 2,
            sigma: config.gaussian_sigma,
            exponent: config.exponent,
        }
    }

    pub fn illumination(&self, image: &RgbImage) -> RgbImage {
        let median = median_filter(image, self.median_radius, self.median_radius);
        gaussian_blur_f32(&median, self.sigma)
    }

    fn curve(&self, value: u8, estimate: u8) -> u8 {
        // Estimates below 1 would blow the ratio up; they only occur in
        // fully black regions where the result is 0 either way.
        let ratio = (value as f32 / (estimate as f32).max(1.0)).min(1.0);
        let boosted = 0.5 - 0.5 * (ratio.powf(self.exponent) * PI).cos();
        (boosted * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

impl ImageFilter for EnhanceFilter {
    fn apply(&self, image: &RgbImage) -> RgbImage {
        let estimate = self.illumination(image);
        RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let p = image.get_pixel(x, y).0;
            let e = estimate.get_pixel(x, y).0;
            Rgb([
                self.curve(p[0], e[0]),
                self.curve(p[1], e[1]),
                self.curve(p[2], e[2]),
            ])
        })
    }

    fn name(&self) -> &str {
        "whiteboard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> EnhanceFilter {
        EnhanceFilter::new(&EnhanceConfig::default())
    }

    #[test]
    fn white_frame_is_a_fixed_point() {
        let input = RgbImage::from_pixel(32, 24, Rgb([255, 255, 255]));
        let output = filter().apply(&input);
        assert_eq!(output.dimensions(), input.dimensions());
        for (a, b) in input.pixels().zip(output.pixels()) {
            for c in 0..3 {
                assert!(a.0[c].abs_diff(b.0[c]) <= 1, "uniform frame should stay put");
            }
        }
    }

    #[test]
    fn uniform_grey_paper_becomes_white() {
        let output = filter().apply(&RgbImage::from_pixel(16, 16, Rgb([180, 170, 160])));
        assert!(output.pixels().all(|p| p.0.iter().all(|&c| c >= 254)));
    }

    #[test]
    fn thin_stroke_darkens_and_paper_whitens() {
        let mut input = RgbImage::from_pixel(40, 40, Rgb([190, 190, 190]));
        for y in 0..40 {
            input.put_pixel(20, y, Rgb([60, 60, 60]));
        }
        let output = filter().apply(&input);
        assert!(output.get_pixel(20, 20).0[0] < 20, "ink should be pushed dark");
        assert!(output.get_pixel(5, 20).0[0] >= 254, "paper should be white");
    }

    #[test]
    fn black_estimate_does_not_blow_up() {
        let f = filter();
        assert_eq!(f.curve(0, 0), 0);
        assert_eq!(f.curve(255, 0), 255, "ratio is capped at 1");
    }
}
