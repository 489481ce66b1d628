use std::time::Duration;

use kaptchi_common::config::AutoCaptureConfig;
use kaptchi_common::frame::Frame;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::detector::AutoCaptureDetector;
use crate::sink::Gallery;

/// Processed frame handed to the auto-capture worker.
#[derive(Debug, Clone)]
pub struct CaptureItem {
    pub frame: Frame,
    /// Source generation; a new value clears the history window.
    pub epoch: u64,
    pub capacity: usize,
}

/// History window length for a source paced at `fps`.
pub fn history_capacity(history_seconds: f64, fps: f64) -> usize {
    ((history_seconds * fps).round() as usize).max(2)
}

/// Bounded, non-blocking sender side of the capture queue.
#[derive(Clone)]
pub struct CaptureQueue {
    tx: mpsc::Sender<CaptureItem>,
}

impl CaptureQueue {
    /// Enqueue without waiting. Returns false if the item was dropped.
    pub fn offer(&self, item: CaptureItem) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(item)) => {
                debug!(seq = item.frame.seq, "capture queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureStats {
    pub observed: u64,
    pub saved: u64,
    pub failed: u64,
}

/// Spawn the auto-capture loop on the blocking pool.
///
/// The loop drains its queue, sleeps `idle` when starved and exits once
/// every [`CaptureQueue`] has been dropped.
pub fn spawn_capture_worker(
    config: &AutoCaptureConfig,
    mut gallery: Box<dyn Gallery>,
    idle: Duration,
) -> (CaptureQueue, JoinHandle<CaptureStats>) {
    let (tx, mut rx) = mpsc::channel::<CaptureItem>(config.queue_capacity.max(1));
    let mut detector = AutoCaptureDetector::new(2, config.drop_ratio, config.ink_threshold);

    let handle = tokio::task::spawn_blocking(move || {
        let mut stats = CaptureStats::default();
        let mut epoch = None;

        loop {
            let item = match rx.try_recv() {
                Ok(item) => item,
                Err(TryRecvError::Empty) => {
                    std::thread::sleep(idle);
                    continue;
                }
                Err(TryRecvError::Disconnected) => break,
            };

            if epoch != Some(item.epoch) {
                if epoch.is_some() {
                    debug!(epoch = item.epoch, "source changed, clearing capture history");
                }
                detector.clear();
                epoch = Some(item.epoch);
            }
            if detector.capacity() != item.capacity {
                detector.set_capacity(item.capacity);
            }

            stats.observed += 1;
            let Some(snapshot) = detector.observe(item.frame) else {
                continue;
            };
            match gallery.add(&snapshot) {
                Ok(()) => stats.saved += 1,
                Err(e) => {
                    warn!(id = snapshot.id, error = %e, "failed to store snapshot");
                    stats.failed += 1;
                }
            }
        }

        info!(
            observed = stats.observed,
            saved = stats.saved,
            failed = stats.failed,
            "capture worker stopped"
        );
        stats
    });

    (CaptureQueue { tx }, handle)
}
