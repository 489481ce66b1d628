mod detector;
mod worker;

pub use detector::{ink_coverage, AutoCaptureDetector, SavedSnapshot};
pub use worker::{history_capacity, spawn_capture_worker, CaptureItem, CaptureQueue, CaptureStats};
