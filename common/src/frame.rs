use image::RgbImage;

/// A decoded RGB frame with acquisition metadata.
///
/// `seq` increases by one per frame read from a source and is what the
/// scheduler uses to decide whether a processed frame is newer than the one
/// currently displayed.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            image,
            captured_at_ms,
            seq,
        }
    }

    /// Stamp a frame with the current wall-clock time.
    pub fn now(image: RgbImage, seq: u64) -> Self {
        Self::new(image, chrono::Utc::now().timestamp_millis(), seq)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// True when either dimension is zero. Such frames are never processed.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Same metadata, different pixels. Used by transform stages.
    pub fn with_image(&self, image: RgbImage) -> Self {
        Self {
            image,
            captured_at_ms: self.captured_at_ms,
            seq: self.seq,
        }
    }
}
