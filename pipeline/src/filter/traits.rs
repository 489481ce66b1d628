use image::RgbImage;

/// Stateless per-frame image filter.
///
/// Implementations receive the current frame and return a new buffer of
/// any size; the input is left untouched.
pub trait ImageFilter: Send + Sync {
    fn apply(&self, image: &RgbImage) -> RgbImage;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
