use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub enhance: EnhanceConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub autocapture: AutoCaptureConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gallery: GalleryConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Directory of still images played back as a frame stream.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_source_fps")]
    pub fps: f64,
    #[serde(default)]
    pub looping: bool,
}

/// Initial state of the runtime-mutable pipeline controls.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub remove_foreground: bool,
    #[serde(default)]
    pub whiteboard_filter: bool,
    #[serde(default)]
    pub auto_save: bool,
    /// Zoom in the external normalized domain [0, 1].
    #[serde(default)]
    pub zoom: f64,
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,
    /// Rectification corners in source pixel coordinates. Anything other
    /// than exactly four points leaves rectification disabled.
    #[serde(default)]
    pub region: Vec<[f64; 2]>,
}

/// Motion classifier and strip model parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct BackgroundConfig {
    #[serde(default = "default_strip_count")]
    pub strip_count: u32,
    #[serde(default = "default_downsample")]
    pub downsample: f64,
    #[serde(default = "default_history")]
    pub history: u32,
    /// Squared RGB distance above which a pixel counts as foreground.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnhanceConfig {
    #[serde(default = "default_median_kernel")]
    pub median_kernel: u32,
    #[serde(default = "default_gaussian_sigma")]
    pub gaussian_sigma: f32,
    #[serde(default = "default_exponent")]
    pub exponent: f32,
    #[serde(default = "default_threshold_block")]
    pub threshold_block: u32,
    #[serde(default = "default_threshold_offset")]
    pub threshold_offset: f32,
    #[serde(default = "default_sharpen_sigma")]
    pub sharpen_sigma: f32,
    #[serde(default = "default_sharpen_amount")]
    pub sharpen_amount: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportConfig {
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoCaptureConfig {
    /// History window length; capacity is this many seconds of frames.
    #[serde(default = "default_history_seconds")]
    pub history_seconds: f64,
    #[serde(default = "default_drop_ratio")]
    pub drop_ratio: f64,
    #[serde(default = "default_ink_threshold")]
    pub ink_threshold: u8,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
    /// Tick rate used when a source cannot report its own pacing.
    #[serde(default = "default_fps")]
    pub default_fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GalleryConfig {
    #[serde(default = "default_gallery_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_gallery_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_preview_every_n")]
    pub every_n: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            fps: default_source_fps(),
            looping: false,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            remove_foreground: false,
            whiteboard_filter: false,
            auto_save: false,
            zoom: 0.0,
            stages: default_stages(),
            region: Vec::new(),
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            strip_count: default_strip_count(),
            downsample: default_downsample(),
            history: default_history(),
            distance_threshold: default_distance_threshold(),
        }
    }
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            median_kernel: default_median_kernel(),
            gaussian_sigma: default_gaussian_sigma(),
            exponent: default_exponent(),
            threshold_block: default_threshold_block(),
            threshold_offset: default_threshold_offset(),
            sharpen_sigma: default_sharpen_sigma(),
            sharpen_amount: default_sharpen_amount(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            sensitivity: default_sensitivity(),
        }
    }
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            history_seconds: default_history_seconds(),
            drop_ratio: default_drop_ratio(),
            ink_threshold: default_ink_threshold(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_sleep_ms: default_idle_sleep_ms(),
            default_fps: default_fps(),
        }
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            dir: default_gallery_dir(),
            prefix: default_gallery_prefix(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            path: None,
            every_n: default_preview_every_n(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the frame pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.source.fps > 0.0) {
            return Err(ConfigError::invalid("source.fps", "must be greater than 0"));
        }
        if self.background.strip_count == 0 {
            return Err(ConfigError::invalid("background.strip_count", "must be at least 1"));
        }
        if !(self.background.downsample > 0.0 && self.background.downsample <= 1.0) {
            return Err(ConfigError::invalid("background.downsample", "must be in (0, 1]"));
        }
        if self.background.history == 0 {
            return Err(ConfigError::invalid("background.history", "must be at least 1"));
        }
        if self.enhance.median_kernel == 0 || self.enhance.median_kernel % 2 == 0 {
            return Err(ConfigError::invalid("enhance.median_kernel", "must be odd"));
        }
        if self.enhance.threshold_block < 3 || self.enhance.threshold_block % 2 == 0 {
            return Err(ConfigError::invalid(
                "enhance.threshold_block",
                "must be odd and at least 3",
            ));
        }
        if !(self.enhance.gaussian_sigma > 0.0) || !(self.enhance.sharpen_sigma > 0.0) {
            return Err(ConfigError::invalid("enhance", "blur sigmas must be positive"));
        }
        if !(self.enhance.exponent > 0.0) {
            return Err(ConfigError::invalid("enhance.exponent", "must be positive"));
        }
        if !(self.autocapture.drop_ratio > 0.0) {
            return Err(ConfigError::invalid("autocapture.drop_ratio", "must be positive"));
        }
        if self.autocapture.queue_capacity == 0 {
            return Err(ConfigError::invalid("autocapture.queue_capacity", "must be at least 1"));
        }
        if !(self.scheduler.default_fps > 0.0) {
            return Err(ConfigError::invalid("scheduler.default_fps", "must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: &str) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

// Default value functions
fn default_source_fps() -> f64 {
    10.0
}
fn default_stages() -> Vec<String> {
    vec!["rectify".into(), "whiteboard".into(), "zoom".into()]
}
fn default_strip_count() -> u32 {
    15
}
fn default_downsample() -> f64 {
    0.1
}
fn default_history() -> u32 {
    300
}
fn default_distance_threshold() -> f32 {
    400.0
}
fn default_median_kernel() -> u32 {
    7
}
fn default_gaussian_sigma() -> f32 {
    0.8
}
fn default_exponent() -> f32 {
    5.0
}
fn default_threshold_block() -> u32 {
    21
}
fn default_threshold_offset() -> f32 {
    15.0
}
fn default_sharpen_sigma() -> f32 {
    3.0
}
fn default_sharpen_amount() -> f32 {
    0.5
}
fn default_sensitivity() -> f64 {
    9.0
}
fn default_history_seconds() -> f64 {
    3.0
}
fn default_drop_ratio() -> f64 {
    1.5
}
fn default_ink_threshold() -> u8 {
    127
}
fn default_queue_capacity() -> usize {
    4
}
fn default_idle_sleep_ms() -> u64 {
    100
}
fn default_fps() -> f64 {
    30.0
}
fn default_gallery_dir() -> PathBuf {
    PathBuf::from("snapshots")
}
fn default_gallery_prefix() -> String {
    "board".into()
}
fn default_preview_every_n() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}
