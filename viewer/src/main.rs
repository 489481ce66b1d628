mod keys;
mod sinks;
mod sources;

use std::path::PathBuf;

use kaptchi_common::config::Config;
use kaptchi_pipeline::scheduler::{Command, PipelineHandle, Scheduler, SchedulerOptions};
use kaptchi_pipeline::sink::Gallery;
use kaptchi_pipeline::transform::{PipelineConfig, TransformChain};
use sinks::{DirectoryGallery, PreviewSink};
use sources::ImageSequenceSource;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        source = ?config.source.path,
        fps = config.source.fps,
        stages = ?config.pipeline.stages,
        remove_foreground = config.pipeline.remove_foreground,
        whiteboard_filter = config.pipeline.whiteboard_filter,
        auto_save = config.pipeline.auto_save,
        "starting kaptchi viewer"
    );

    let Some(source_dir) = config.source.path.clone() else {
        error!("no [source] path configured");
        std::process::exit(1);
    };
    let source =
        match ImageSequenceSource::open(&source_dir, config.source.fps, config.source.looping) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to open frame source");
                std::process::exit(1);
            }
        };

    let pipeline_config = match PipelineConfig::from_settings(&config.pipeline) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid [pipeline] settings");
            std::process::exit(1);
        }
    };

    let gallery: Option<Box<dyn Gallery>> =
        match DirectoryGallery::open(&config.gallery.dir, &config.gallery.prefix) {
            Ok(g) => Some(Box::new(g)),
            Err(e) => {
                warn!(error = %e, "failed to open snapshot gallery; auto-capture disabled");
                None
            }
        };
    let sink = PreviewSink::new(config.preview.path.clone(), config.preview.every_n);

    let (commands, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            let _ = commands.send(Command::Stop).await;
        }
    });

    let handle = PipelineHandle::new(pipeline_config, config.viewport.sensitivity);
    let scheduler = Scheduler::new(handle, SchedulerOptions::from_config(&config));
    match scheduler
        .run(
            TransformChain::new(&config),
            Box::new(source),
            Box::new(sink),
            gallery,
            rx,
        )
        .await
    {
        Ok(summary) => info!(
            rendered = summary.rendered,
            processed = summary.processed,
            snapshots = summary.snapshots_saved,
            "viewer finished"
        ),
        Err(e) => {
            error!(error = %e, "scheduler failed");
            std::process::exit(1);
        }
    }
}
