mod classifier;

pub use classifier::MotionClassifier;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use kaptchi_common::config::BackgroundConfig;
use tracing::{debug, warn};

/// Persistent document canvas refreshed strip by strip.
///
/// The frame width is split into vertical strips. A strip is copied from the
/// live frame only while it and its neighbours show no motion, so a hand
/// moving over the board leaves the previously seen content in place.
pub struct BackgroundModel {
    strip_count: u32,
    downsample: f64,
    classifier: MotionClassifier,
    canvas: Option<RgbImage>,
    still: Vec<bool>,
}

impl BackgroundModel {
    pub fn new(config: &BackgroundConfig) -> Self {
        Self {
            strip_count: config.strip_count.max(1),
            downsample: config.downsample,
            classifier: MotionClassifier::new(config.history, config.distance_threshold),
            canvas: None,
            still: Vec::new(),
        }
    }

    /// Forget the canvas and all motion history.
    pub fn reset(&mut self) {
        self.canvas = None;
        self.still.clear();
        self.classifier.reset();
    }

    pub fn canvas(&self) -> Option<&RgbImage> {
        self.canvas.as_ref()
    }

    /// Smoothed per-strip decisions from the last update, left to right.
    pub fn still_strips(&self) -> &[bool] {
        &self.still
    }

    /// Fold `frame` into the model and return the updated canvas.
    pub fn update(&mut self, frame: &RgbImage) -> &RgbImage {
        let (width, height) = frame.dimensions();
        let strips = self.strip_count.min(width.max(1));

        let canvas = match self.canvas.take() {
            None => {
                debug!(width, height, "background canvas initialised");
                let small = self.downsampled(frame);
                self.classifier.apply(&small);
                self.still = vec![true; strips as usize];
                return self.canvas.insert(frame.clone());
            }
            Some(c) if c.dimensions() != (width, height) => {
                warn!(
                    old_width = c.width(),
                    old_height = c.height(),
                    width,
                    height,
                    "frame size changed, resizing background canvas"
                );
                self.classifier.reset();
                imageops::resize(&c, width, height, FilterType::Triangle)
            }
            Some(c) => c,
        };

        let small = self.downsampled(frame);
        let mask = self.classifier.apply(&small);
        self.still = smooth_still(&strip_activity(&mask, strips));

        let canvas = self.canvas.insert(canvas);
        for (i, still) in self.still.iter().enumerate() {
            if !*still {
                continue;
            }
            let start = strip_bound(i as u32, width, strips);
            let end = strip_bound(i as u32 + 1, width, strips);
            copy_columns(frame, canvas, start, end);
        }

        canvas
    }

    fn downsampled(&self, frame: &RgbImage) -> RgbImage {
        if self.downsample >= 1.0 {
            return frame.clone();
        }
        let w = ((frame.width() as f64 * self.downsample).round() as u32).max(1);
        let h = ((frame.height() as f64 * self.downsample).round() as u32).max(1);
        imageops::resize(frame, w, h, FilterType::Triangle)
    }
}

/// Left edge of strip `i`. `strip_bound(strips, ..)` is the full width.
fn strip_bound(i: u32, width: u32, strips: u32) -> u32 {
    (i as u64 * width as u64 / strips as u64) as u32
}

/// True for every strip whose mask columns contain no foreground.
///
/// Mask strips are derived from the same fractions as the full-resolution
/// strips and always cover at least one mask column.
fn strip_activity(mask: &GrayImage, strips: u32) -> Vec<bool> {
    let mask_width = mask.width();
    (0..strips)
        .map(|i| {
            let start = strip_bound(i, mask_width, strips).min(mask_width.saturating_sub(1));
            let end = strip_bound(i + 1, mask_width, strips)
                .max(start + 1)
                .min(mask_width);
            (start..end).all(|x| (0..mask.height()).all(|y| mask.get_pixel(x, y).0[0] == 0))
        })
        .collect()
}

/// A strip is still only if it and its immediate neighbours are. Edge
/// strips have a single neighbour.
fn smooth_still(local: &[bool]) -> Vec<bool> {
    (0..local.len())
        .map(|i| {
            let left = i == 0 || local[i - 1];
            let right = i + 1 >= local.len() || local[i + 1];
            local[i] && left && right
        })
        .collect()
}

fn copy_columns(src: &RgbImage, dst: &mut RgbImage, start: u32, end: u32) {
    if start >= end {
        return;
    }
    let row_len = src.width() as usize * 3;
    let (from, to) = (start as usize * 3, end as usize * 3);
    let src_raw: &[u8] = src;
    let dst_raw: &mut [u8] = dst;
    for y in 0..src.height() as usize {
        let base = y * row_len;
        dst_raw[base + from..base + to].copy_from_slice(&src_raw[base + from..base + to]);
    }
}
