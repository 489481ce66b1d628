use std::collections::VecDeque;

use image::RgbImage;
use kaptchi_common::frame::Frame;
use tracing::{debug, info};

/// A frame chosen for saving, with an id that increases per emission.
#[derive(Debug, Clone)]
pub struct SavedSnapshot {
    pub id: u64,
    pub frame: Frame,
}

/// Number of pixels at or below `threshold` intensity.
pub fn ink_coverage(image: &RgbImage, threshold: u8) -> u64 {
    image::imageops::grayscale(image)
        .pixels()
        .filter(|p| p.0[0] <= threshold)
        .count() as u64
}

/// Rolling ink-drop detector.
///
/// Keeps the last `capacity` frames with their ink score. Every frame is
/// judged once, when it leaves the window: if its score exceeds the newest
/// score by more than `drop_ratio`, the board has since been wiped and the
/// fuller frame is emitted. The frame at the front is also judged the
/// moment the window first fills.
pub struct AutoCaptureDetector {
    capacity: usize,
    drop_ratio: f64,
    ink_threshold: u8,
    history: VecDeque<(Frame, u64)>,
    next_id: u64,
}

impl AutoCaptureDetector {
    pub fn new(capacity: usize, drop_ratio: f64, ink_threshold: u8) -> Self {
        Self {
            capacity: capacity.max(1),
            drop_ratio,
            ink_threshold,
            history: VecDeque::with_capacity(capacity.max(1)),
            next_id: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Resize the window, dropping the oldest entries if it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    /// Forget the window. Snapshot ids keep counting.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn observe(&mut self, frame: Frame) -> Option<SavedSnapshot> {
        let score = ink_coverage(&frame.image, self.ink_threshold);
        self.observe_scored(frame, score)
    }

    pub fn observe_scored(&mut self, frame: Frame, score: u64) -> Option<SavedSnapshot> {
        let evicted = if self.history.len() >= self.capacity {
            self.history.pop_front()
        } else {
            None
        };
        self.history.push_back((frame, score));

        if let Some((oldest, oldest_score)) = evicted {
            return self
                .exceeds(oldest_score, score)
                .then(|| self.emit(oldest, oldest_score, score));
        }

        if self.history.len() == self.capacity {
            let front_score = self.history.front().map(|(_, s)| *s).unwrap_or(0);
            if self.capacity > 1 && self.exceeds(front_score, score) {
                let (oldest, oldest_score) = self.history.pop_front()?;
                return Some(self.emit(oldest, oldest_score, score));
            }
        }
        debug!(score, window = self.history.len(), "ink coverage observed");
        None
    }

    fn exceeds(&self, oldest: u64, newest: u64) -> bool {
        oldest as f64 > self.drop_ratio * newest as f64
    }

    fn emit(&mut self, frame: Frame, oldest_score: u64, newest_score: u64) -> SavedSnapshot {
        let id = self.next_id;
        self.next_id += 1;
        info!(
            id,
            seq = frame.seq,
            oldest_score,
            newest_score,
            "ink dropped, capturing snapshot"
        );
        SavedSnapshot { id, frame }
    }
}
