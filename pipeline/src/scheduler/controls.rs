use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kaptchi_common::frame::Frame;
use tracing::debug;

use crate::filter::{Point, ViewportState};
use crate::mailbox::Mailbox;
use crate::transform::{PipelineConfig, Stage};

/// Everything the control surface and the transform worker share.
///
/// The pending input frame lives under the same lock as the configuration,
/// so a control change and the discard of a frame captured under the old
/// configuration happen atomically.
struct Controls {
    config: PipelineConfig,
    sensitivity: f64,
    /// Bumped by every configuration change.
    generation: u64,
    /// Bumped by every source switch.
    source_epoch: u64,
    history_capacity: usize,
    reset_pending: bool,
    in_flight: bool,
    input: Mailbox<Frame>,
}

/// Unit of work for the transform worker.
pub struct Job {
    pub frame: Frame,
    pub config: PipelineConfig,
    pub generation: u64,
    pub source_epoch: u64,
    pub history_capacity: usize,
    /// The background model must be cleared before this frame.
    pub reset: bool,
}

/// Cloneable handle to the shared pipeline configuration and input slot.
#[derive(Clone)]
pub struct PipelineHandle {
    inner: Arc<Mutex<Controls>>,
}

impl PipelineHandle {
    pub fn new(config: PipelineConfig, sensitivity: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Controls {
                config,
                sensitivity,
                generation: 0,
                source_epoch: 0,
                history_capacity: 2,
                reset_pending: false,
                in_flight: false,
                input: Mailbox::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Controls> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a configuration change and discard the pending input frame.
    fn mutate(&self, field: &'static str, f: impl FnOnce(&mut PipelineConfig, f64)) {
        let mut controls = self.lock();
        let sensitivity = controls.sensitivity;
        f(&mut controls.config, sensitivity);
        controls.generation += 1;
        if controls.input.clear() {
            debug!(field, "discarded frame captured under previous configuration");
        }
    }

    pub fn set_foreground_removal(&self, enabled: bool) {
        self.mutate("remove_foreground", |c, _| c.remove_foreground = enabled);
    }

    pub fn set_whiteboard_filter(&self, enabled: bool) {
        self.mutate("whiteboard_filter", |c, _| c.whiteboard_filter = enabled);
    }

    pub fn set_auto_save(&self, enabled: bool) {
        self.mutate("auto_save", |c, _| c.auto_save = enabled);
    }

    /// Set the rectification corners. An empty list disables rectification;
    /// so does any count other than four.
    pub fn set_region(&self, points: Vec<Point>) {
        if !points.is_empty() && points.len() != 4 {
            debug!(count = points.len(), "region needs 4 points, rectification disabled");
        }
        self.mutate("region", |c, _| c.region = points);
    }

    /// Zoom in the normalized control domain [0, 1].
    pub fn set_zoom(&self, zoom: f64) {
        self.mutate("zoom", |c, _| c.viewport.set_normalized_zoom(zoom));
    }

    /// Pan the zoom window by a pointer delta.
    pub fn recenter(&self, dx: f64, dy: f64) {
        self.mutate("viewport", |c, sensitivity| {
            c.viewport.recenter(dx, dy, sensitivity)
        });
    }

    pub fn set_stages(&self, stages: Vec<Stage>) {
        self.mutate("stages", |c, _| c.stages = stages);
    }

    pub fn snapshot(&self) -> PipelineConfig {
        self.lock().config.clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn source_epoch(&self) -> u64 {
        self.lock().source_epoch
    }

    /// Offer a frame read while `generation` was current. Frames captured
    /// before a configuration change are refused.
    pub fn offer_frame(&self, frame: Frame, generation: u64) -> bool {
        let mut controls = self.lock();
        if controls.generation != generation {
            debug!(seq = frame.seq, "configuration changed during capture, dropping frame");
            return false;
        }
        if let Some(stale) = controls.input.offer(frame) {
            debug!(seq = stale.seq, "transform busy, replacing pending frame");
        }
        true
    }

    /// Take the pending frame together with the configuration it must be
    /// processed under. Marks a job in flight until [`finish_job`].
    ///
    /// [`finish_job`]: Self::finish_job
    pub fn take_job(&self) -> Option<Job> {
        let mut controls = self.lock();
        let frame = controls.input.take()?;
        controls.in_flight = true;
        Some(Job {
            frame,
            config: controls.config.clone(),
            generation: controls.generation,
            source_epoch: controls.source_epoch,
            history_capacity: controls.history_capacity,
            reset: std::mem::take(&mut controls.reset_pending),
        })
    }

    pub fn finish_job(&self) {
        self.lock().in_flight = false;
    }

    /// No frame pending and none being transformed.
    pub fn is_idle(&self) -> bool {
        let controls = self.lock();
        controls.input.is_empty() && !controls.in_flight
    }

    /// Store viewport state derived during a transform, unless a control
    /// changed since the job was taken.
    pub fn commit_viewport(&self, generation: u64, viewport: ViewportState) -> bool {
        let mut controls = self.lock();
        if controls.generation != generation {
            return false;
        }
        controls.config.viewport = viewport;
        true
    }

    /// Frames that were replaced or discarded before reaching the worker.
    pub fn dropped_frames(&self) -> u64 {
        self.lock().input.dropped()
    }

    pub fn set_history_capacity(&self, capacity: usize) {
        self.lock().history_capacity = capacity;
    }

    /// Forget all state tied to the previous source: the region, the zoom
    /// centre, the pending frame and, on the next job, the background model.
    pub fn begin_source_switch(&self, history_capacity: usize) {
        let mut controls = self.lock();
        controls.config.region.clear();
        controls.config.viewport.reset();
        controls.reset_pending = true;
        controls.history_capacity = history_capacity;
        controls.source_epoch += 1;
        controls.generation += 1;
        controls.input.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame(seq: u64) -> Frame {
        Frame::new(RgbImage::new(4, 4), 0, seq)
    }

    fn handle() -> PipelineHandle {
        PipelineHandle::new(PipelineConfig::default(), 9.0)
    }

    #[test]
    fn config_change_drains_pending_frame() {
        let handle = handle();
        assert!(handle.offer_frame(frame(1), handle.generation()));
        handle.set_whiteboard_filter(true);
        assert!(handle.take_job().is_none(), "stale frame must not be processed");

        assert!(handle.offer_frame(frame(2), handle.generation()));
        let job = handle.take_job().unwrap();
        assert_eq!(job.frame.seq, 2);
        assert!(job.config.whiteboard_filter);
    }

    #[test]
    fn frame_read_before_change_is_refused() {
        let handle = handle();
        let generation = handle.generation();
        handle.set_auto_save(true);
        assert!(!handle.offer_frame(frame(1), generation));
        assert!(handle.is_idle());
    }

    #[test]
    fn newer_frame_replaces_pending() {
        let handle = handle();
        let generation = handle.generation();
        handle.offer_frame(frame(1), generation);
        handle.offer_frame(frame(2), generation);
        assert_eq!(handle.take_job().unwrap().frame.seq, 2);
        assert_eq!(handle.dropped_frames(), 1);
    }

    #[test]
    fn in_flight_job_is_not_idle() {
        let handle = handle();
        handle.offer_frame(frame(1), handle.generation());
        let _job = handle.take_job().unwrap();
        assert!(!handle.is_idle());
        handle.finish_job();
        assert!(handle.is_idle());
    }

    #[test]
    fn viewport_commit_skipped_after_change() {
        let handle = handle();
        handle.offer_frame(frame(1), handle.generation());
        let job = handle.take_job().unwrap();
        let mut viewport = job.config.viewport.clone();
        viewport.center = Some((1.0, 1.0));

        handle.set_zoom(0.5);
        assert!(!handle.commit_viewport(job.generation, viewport.clone()));
        assert_eq!(handle.snapshot().viewport.center, None);

        let generation = handle.generation();
        assert!(handle.commit_viewport(generation, viewport));
        assert_eq!(handle.snapshot().viewport.center, Some((1.0, 1.0)));
    }

    #[test]
    fn source_switch_clears_region_and_requests_reset() {
        let handle = handle();
        handle.set_region(vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(3.0, 3.0),
            Point::new(0.0, 3.0),
        ]);
        handle.offer_frame(frame(1), handle.generation());
        handle.begin_source_switch(45);
        assert!(handle.snapshot().region.is_empty());
        assert!(handle.is_idle(), "pending frame from the old source is dropped");

        handle.offer_frame(frame(2), handle.generation());
        let job = handle.take_job().unwrap();
        assert!(job.reset);
        assert_eq!(job.source_epoch, 1);
        assert_eq!(job.history_capacity, 45);

        handle.finish_job();
        handle.offer_frame(frame(3), handle.generation());
        assert!(!handle.take_job().unwrap().reset, "reset is requested once");
    }
}
