use kaptchi_common::frame::Frame;

pub use crate::capture::SavedSnapshot;

/// Receives the frame to show on every display tick.
///
/// Must accept any frame size. There is no backpressure: a slow sink slows
/// the tick, never the transform worker.
pub trait DisplaySink: Send {
    fn render(&mut self, frame: &Frame);
}

/// Write-only snapshot store. The pipeline never reads snapshots back.
pub trait Gallery: Send {
    fn add(&mut self, snapshot: &SavedSnapshot) -> Result<(), GalleryError>;

    fn remove(&mut self, id: u64) -> Result<(), GalleryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("gallery storage error: {0}")]
    Storage(String),
    #[error("gallery I/O error: {0}")]
    Io(#[from] std::io::Error),
}
