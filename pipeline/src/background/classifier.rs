use image::{GrayImage, Luma, RgbImage};

/// Per-pixel samples kept by the classifier.
const SAMPLES: usize = 7;
/// Samples that must lie within the distance threshold for a pixel to count
/// as background.
const MIN_MATCHES: usize = 2;

const FOREGROUND: u8 = 255;

/// Sample-based background subtractor.
///
/// Every pixel keeps a small set of past colours. A pixel is background when
/// enough of those samples are close to its current colour, so a value that
/// was seen before (the board behind a hand that has just moved away) is
/// recognised immediately. One sample slot is refreshed every
/// `history / SAMPLES` frames, which lets a lasting change (new ink) become
/// background after a few refreshes.
pub struct MotionClassifier {
    distance_threshold: f32,
    update_interval: u64,
    model: Option<SampleModel>,
}

struct SampleModel {
    width: u32,
    height: u32,
    /// `SAMPLES` colours per pixel, pixel-major.
    samples: Vec<[u8; 3]>,
    frames_seen: u64,
    next_slot: usize,
}

impl MotionClassifier {
    pub fn new(history: u32, distance_threshold: f32) -> Self {
        Self {
            distance_threshold,
            update_interval: (history as u64 / SAMPLES as u64).max(1),
            model: None,
        }
    }

    pub fn reset(&mut self) {
        self.model = None;
    }

    /// Classify every pixel of `image` and fold it into the model.
    ///
    /// Returns a mask of the same size where non-zero marks foreground.
    /// The first image after a reset or a size change seeds the model and
    /// is reported as all background.
    pub fn apply(&mut self, image: &RgbImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let model = match &mut self.model {
            Some(m) if m.width == width && m.height == height => m,
            _ => {
                self.model = Some(SampleModel::seed(image));
                return GrayImage::new(width, height);
            }
        };

        let mut mask = GrayImage::new(width, height);
        for (i, (pixel, out)) in image.pixels().zip(mask.pixels_mut()).enumerate() {
            let samples = &model.samples[i * SAMPLES..(i + 1) * SAMPLES];
            let matches = samples
                .iter()
                .filter(|s| squared_distance(s, &pixel.0) <= self.distance_threshold)
                .count();
            if matches < MIN_MATCHES {
                *out = Luma([FOREGROUND]);
            }
        }

        model.frames_seen += 1;
        if model.frames_seen % self.update_interval == 0 {
            let slot = model.next_slot;
            for (i, pixel) in image.pixels().enumerate() {
                model.samples[i * SAMPLES + slot] = pixel.0;
            }
            model.next_slot = (slot + 1) % SAMPLES;
        }

        mask
    }
}

impl SampleModel {
    fn seed(image: &RgbImage) -> Self {
        let mut samples = Vec::with_capacity(image.pixels().len() * SAMPLES);
        for pixel in image.pixels() {
            samples.extend(std::iter::repeat(pixel.0).take(SAMPLES));
        }
        Self {
            width: image.width(),
            height: image.height(),
            samples,
            frames_seen: 0,
            next_slot: 0,
        }
    }
}

fn squared_distance(a: &[u8; 3], b: &[u8; 3]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f32 - y as f32;
            d * d
        })
        .sum()
}
