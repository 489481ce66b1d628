mod controls;

pub use controls::{Job, PipelineHandle};

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kaptchi_common::config::{AutoCaptureConfig, Config};
use kaptchi_common::frame::Frame;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::capture::{history_capacity, spawn_capture_worker, CaptureItem, CaptureQueue};
use crate::mailbox::SharedMailbox;
use crate::sink::{DisplaySink, Gallery};
use crate::source::FrameSource;
use crate::transform::Transform;

/// Requests accepted by a running [`Scheduler`].
pub enum Command {
    /// Replace the frame source. Source-bound state is reset.
    SwitchSource(Box<dyn FrameSource>),
    Stop,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Transform worker backoff when there is no frame to process.
    pub idle_sleep: Duration,
    /// Tick rate for sources that do not report one.
    pub default_fps: f64,
    pub autocapture: AutoCaptureConfig,
}

impl SchedulerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_sleep: Duration::from_millis(config.scheduler.idle_sleep_ms),
            default_fps: config.scheduler.default_fps,
            autocapture: config.autocapture.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub ticks: u64,
    pub rendered: u64,
    pub processed: u64,
    pub transform_failures: u64,
    pub dropped_frames: u64,
    /// Results replaced by a newer one before a tick displayed them.
    pub superseded_results: u64,
    pub snapshots_saved: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("worker task failed: {0}")]
    WorkerJoin(String),
}

#[derive(Default)]
struct WorkerCounters {
    processed: AtomicU64,
    failures: AtomicU64,
}

/// Paces a frame source and keeps the display fed while the transform
/// runs on its own worker.
///
/// Each tick reads one frame, offers it to the single-slot input and shows
/// the newest finished frame. The tick never waits for the transform: a
/// slow transform only means frames are dropped and the display repeats
/// the last result.
pub struct Scheduler {
    handle: PipelineHandle,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(handle: PipelineHandle, options: SchedulerOptions) -> Self {
        Self { handle, options }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Run until the source is exhausted, [`Command::Stop`] arrives or the
    /// source fails to open.
    ///
    /// Source reads and renders run via `block_in_place`, so this must be
    /// driven by a multi-threaded runtime.
    pub async fn run<T: Transform + 'static>(
        self,
        transform: T,
        mut source: Box<dyn FrameSource>,
        mut sink: Box<dyn DisplaySink>,
        gallery: Option<Box<dyn Gallery>>,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<RunSummary, SchedulerError> {
        let handle = self.handle;
        let options = self.options;

        let shutdown = Arc::new(AtomicBool::new(false));
        let output: SharedMailbox<Frame> = SharedMailbox::new();
        let counters = Arc::new(WorkerCounters::default());

        let mut fps = source_fps(source.as_ref(), options.default_fps);
        handle.set_history_capacity(history_capacity(options.autocapture.history_seconds, fps));

        let (capture, capture_task) = match gallery {
            Some(gallery) => {
                let (queue, task) =
                    spawn_capture_worker(&options.autocapture, gallery, options.idle_sleep);
                (Some(queue), Some(task))
            }
            None => (None, None),
        };

        let worker = tokio::task::spawn_blocking({
            let handle = handle.clone();
            let output = output.clone();
            let shutdown = Arc::clone(&shutdown);
            let counters = Arc::clone(&counters);
            let idle = options.idle_sleep;
            move || transform_loop(transform, handle, output, capture, shutdown, counters, idle)
        });

        let initial = handle.snapshot();
        info!(
            source = source.name(),
            fps,
            stages = ?initial.stages,
            remove_foreground = initial.remove_foreground,
            whiteboard_filter = initial.whiteboard_filter,
            auto_save = initial.auto_save,
            "starting display tick"
        );
        let mut ticker = tick_interval(fps);
        let mut summary = RunSummary::default();
        let mut displayed: Option<Frame> = None;
        let mut next_seq: u64 = 0;
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    summary.ticks += 1;
                    let generation = handle.generation();
                    // Decoding can hit the disk; keep it off the async workers.
                    match tokio::task::block_in_place(|| source.read()) {
                        Ok(Some(image)) => {
                            let frame = Frame::now(image, next_seq);
                            next_seq += 1;
                            handle.offer_frame(frame, generation);
                        }
                        Ok(None) => {
                            info!(source = source.name(), "source exhausted, draining transform");
                            drain(&handle, options.idle_sleep).await;
                            adopt_newer(&output, &mut displayed);
                            if let Some(frame) = &displayed {
                                tokio::task::block_in_place(|| sink.render(frame));
                                summary.rendered += 1;
                            }
                            break;
                        }
                        Err(e) => {
                            warn!(source = source.name(), error = %e, "frame read failed");
                        }
                    }

                    adopt_newer(&output, &mut displayed);
                    if let Some(frame) = &displayed {
                        tokio::task::block_in_place(|| sink.render(frame));
                        summary.rendered += 1;
                    }
                }
                command = commands.recv(), if commands_open => match command {
                    Some(Command::SwitchSource(next)) => {
                        info!(from = source.name(), to = next.name(), "switching frame source");
                        source = next;
                        fps = source_fps(source.as_ref(), options.default_fps);
                        handle.begin_source_switch(history_capacity(
                            options.autocapture.history_seconds,
                            fps,
                        ));
                        ticker = tick_interval(fps);
                        debug!(epoch = handle.source_epoch(), fps, "source switched");
                    }
                    Some(Command::Stop) => {
                        info!("stop requested");
                        break;
                    }
                    None => commands_open = false,
                },
            }
        }

        shutdown.store(true, Ordering::Release);
        worker
            .await
            .map_err(|e| SchedulerError::WorkerJoin(e.to_string()))?;
        if let Some(task) = capture_task {
            let stats = task
                .await
                .map_err(|e| SchedulerError::WorkerJoin(e.to_string()))?;
            summary.snapshots_saved = stats.saved;
        }

        summary.processed = counters.processed.load(Ordering::Relaxed);
        summary.transform_failures = counters.failures.load(Ordering::Relaxed);
        summary.dropped_frames = handle.dropped_frames();
        summary.superseded_results = output.dropped();
        info!(
            ticks = summary.ticks,
            rendered = summary.rendered,
            processed = summary.processed,
            dropped = summary.dropped_frames,
            superseded = summary.superseded_results,
            epoch = handle.source_epoch(),
            failures = summary.transform_failures,
            snapshots = summary.snapshots_saved,
            "scheduler stopped"
        );
        Ok(summary)
    }
}

fn source_fps(source: &dyn FrameSource, default_fps: f64) -> f64 {
    source
        .approximate_fps()
        .filter(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or(default_fps)
}

fn tick_interval(fps: f64) -> Interval {
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Move the newest finished frame into `displayed` unless it is older than
/// what is already shown.
fn adopt_newer(output: &SharedMailbox<Frame>, displayed: &mut Option<Frame>) {
    let Some(ready) = output.take() else {
        return;
    };
    match displayed {
        Some(current) if current.seq >= ready.seq => {
            debug!(current = current.seq, ready = ready.seq, "ignoring stale result");
        }
        _ => *displayed = Some(ready),
    }
}

async fn drain(handle: &PipelineHandle, poll: Duration) {
    let poll = poll.min(Duration::from_millis(10));
    while !handle.is_idle() {
        tokio::time::sleep(poll).await;
    }
}

fn transform_loop<T: Transform>(
    mut transform: T,
    handle: PipelineHandle,
    output: SharedMailbox<Frame>,
    capture: Option<CaptureQueue>,
    shutdown: Arc<AtomicBool>,
    counters: Arc<WorkerCounters>,
    idle: Duration,
) {
    debug!("transform worker started");
    while !shutdown.load(Ordering::Acquire) {
        let Some(job) = handle.take_job() else {
            std::thread::sleep(idle);
            continue;
        };
        if job.reset {
            debug!(epoch = job.source_epoch, "resetting background model for new source");
            transform.reset();
        }

        let seq = job.frame.seq;
        let mut config = job.config;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            transform.process(&job.frame, &mut config)
        }));

        match result {
            Ok(Ok(processed)) => {
                handle.commit_viewport(job.generation, config.viewport);
                if config.auto_save {
                    if let Some(queue) = &capture {
                        queue.offer(CaptureItem {
                            frame: processed.clone(),
                            epoch: job.source_epoch,
                            capacity: job.history_capacity,
                        });
                    }
                }
                output.offer(processed);
                counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                warn!(seq, error = %e, "transform failed, dropping frame");
                counters.failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                error!(seq, "transform panicked, resetting background model");
                transform.reset();
                counters.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        handle.finish_job();
    }
    debug!("transform worker stopped");
}
