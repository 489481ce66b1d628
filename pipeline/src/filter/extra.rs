use image::{Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use kaptchi_common::config::EnhanceConfig;

use super::traits::ImageFilter;

/// Per-channel colour inversion. Useful for blackboards.
pub struct InvertFilter;

impl ImageFilter for InvertFilter {
    fn apply(&self, image: &RgbImage) -> RgbImage {
        let mut out = image.clone();
        image::imageops::invert(&mut out);
        out
    }

    fn name(&self) -> &str {
        "invert"
    }
}

/// Binarise against a Gaussian-weighted local mean.
///
/// A pixel becomes white if it is brighter than the local mean minus
/// `offset`, black otherwise. The single channel result is replicated to
/// RGB so downstream stages see a consistent pixel type.
pub struct AdaptiveThresholdFilter {
    sigma: f32,
    offset: f32,
}

impl AdaptiveThresholdFilter {
    pub fn new(config: &EnhanceConfig) -> Self {
        Self {
            sigma: block_sigma(config.threshold_block),
            offset: config.threshold_offset,
        }
    }
}

/// Gaussian sigma matching a square block of side `block`.
fn block_sigma(block: u32) -> f32 {
    (0.3 * ((block as f32 - 1.0) * 0.5 - 1.0) + 0.8).max(0.1)
}

impl ImageFilter for AdaptiveThresholdFilter {
    fn apply(&self, image: &RgbImage) -> RgbImage {
        let gray = image::imageops::grayscale(image);
        let mean = gaussian_blur_f32(&gray, self.sigma);
        RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let v = gray.get_pixel(x, y).0[0] as f32;
            let m = mean.get_pixel(x, y).0[0] as f32;
            if v > m - self.offset {
                Rgb([255; 3])
            } else {
                Rgb([0; 3])
            }
        })
    }

    fn name(&self) -> &str {
        "threshold"
    }
}

/// Unsharp mask: `(1 + amount) * frame - amount * blur(frame)`.
pub struct SharpenFilter {
    sigma: f32,
    amount: f32,
}

impl SharpenFilter {
    pub fn new(config: &EnhanceConfig) -> Self {
        Self {
            sigma: config.sharpen_sigma,
            amount: config.sharpen_amount,
        }
    }
}

impl ImageFilter for SharpenFilter {
    fn apply(&self, image: &RgbImage) -> RgbImage {
        let blurred = gaussian_blur_f32(image, self.sigma);
        let mut out = image.clone();
        for (o, b) in out.iter_mut().zip(blurred.iter()) {
            let v = (1.0 + self.amount) * *o as f32 - self.amount * *b as f32;
            *o = v.round().clamp(0.0, 255.0) as u8;
        }
        out
    }

    fn name(&self) -> &str {
        "sharpen"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_flips_channels() {
        let image = RgbImage::from_pixel(3, 2, Rgb([0, 100, 255]));
        let out = InvertFilter.apply(&image);
        assert!(out.pixels().all(|p| p.0 == [255, 155, 0]));
    }

    #[test]
    fn threshold_marks_dark_strokes() {
        let mut image = RgbImage::from_pixel(60, 60, Rgb([200, 200, 200]));
        for x in 0..60 {
            image.put_pixel(x, 30, Rgb([20, 20, 20]));
        }
        let out = AdaptiveThresholdFilter::new(&EnhanceConfig::default()).apply(&image);
        assert_eq!(out.get_pixel(10, 30).0, [0, 0, 0], "stroke should be black");
        assert_eq!(out.get_pixel(10, 5).0, [255, 255, 255], "paper should be white");
    }

    #[test]
    fn block_sigma_for_default_block() {
        assert!((block_sigma(21) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn sharpen_leaves_flat_regions_alone() {
        let image = RgbImage::from_pixel(20, 20, Rgb([90, 120, 150]));
        let out = SharpenFilter::new(&EnhanceConfig::default()).apply(&image);
        for p in out.pixels() {
            for (c, expected) in [90u8, 120, 150].iter().enumerate() {
                assert!(p.0[c].abs_diff(*expected) <= 1);
            }
        }
    }

    #[test]
    fn sharpen_increases_edge_contrast() {
        let image = RgbImage::from_fn(40, 10, |x, _| if x < 20 { Rgb([80; 3]) } else { Rgb([160; 3]) });
        let out = SharpenFilter::new(&EnhanceConfig::default()).apply(&image);
        assert!(out.get_pixel(19, 5).0[0] < 80, "dark side of the edge gets darker");
        assert!(out.get_pixel(20, 5).0[0] > 160, "bright side gets brighter");
    }
}
