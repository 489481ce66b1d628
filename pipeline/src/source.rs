use image::RgbImage;

/// Supplier of raw frames and their approximate pacing.
///
/// `read` returns `Ok(None)` once a finite source is exhausted. That is not
/// an error: the scheduler stops ticking and keeps the last frame on screen.
pub trait FrameSource: Send {
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError>;

    /// Frames per second the source is paced at, if known.
    fn approximate_fps(&self) -> Option<f64> {
        None
    }

    /// Total length of a finite source.
    fn duration_seconds(&self) -> Option<f64> {
        None
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The device or stream could not be opened; it produces no frames.
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    /// A single read failed; later reads may succeed.
    #[error("failed to read frame: {0}")]
    Read(String),
}
