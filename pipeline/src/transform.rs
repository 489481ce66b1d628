use std::str::FromStr;

use image::RgbImage;
use kaptchi_common::config::{Config, PipelineSettings};
use kaptchi_common::frame::Frame;
use tracing::debug;

use crate::background::BackgroundModel;
use crate::filter::{
    rectify, AdaptiveThresholdFilter, EnhanceFilter, ImageFilter, InvertFilter, Point,
    SharpenFilter, ViewportState,
};

/// One step of the post-background chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Perspective-correct the region; active only with exactly 4 points.
    Rectify,
    /// Illumination normalisation; active only with the whiteboard flag.
    Whiteboard,
    Invert,
    Threshold,
    Sharpen,
    /// Digital zoom; identity at the widest setting.
    Zoom,
}

impl Stage {
    pub const DEFAULT_ORDER: [Stage; 3] = [Stage::Rectify, Stage::Whiteboard, Stage::Zoom];

    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Stage>, ParseStageError> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

impl FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rectify" => Ok(Stage::Rectify),
            "whiteboard" => Ok(Stage::Whiteboard),
            "invert" => Ok(Stage::Invert),
            "threshold" => Ok(Stage::Threshold),
            "sharpen" => Ok(Stage::Sharpen),
            "zoom" => Ok(Stage::Zoom),
            other => Err(ParseStageError(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown pipeline stage '{0}'")]
pub struct ParseStageError(pub String);

/// Runtime pipeline controls. One value is shared between the control
/// surface and the transform worker; the worker gets a snapshot per frame.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub remove_foreground: bool,
    pub whiteboard_filter: bool,
    pub auto_save: bool,
    /// Rectification corners. Any count other than 4 disables the stage.
    pub region: Vec<Point>,
    pub viewport: ViewportState,
    pub stages: Vec<Stage>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            remove_foreground: false,
            whiteboard_filter: false,
            auto_save: false,
            region: Vec::new(),
            viewport: ViewportState::default(),
            stages: Stage::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl PipelineConfig {
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self, ParseStageError> {
        Ok(Self {
            remove_foreground: settings.remove_foreground,
            whiteboard_filter: settings.whiteboard_filter,
            auto_save: settings.auto_save,
            region: settings.region.iter().copied().map(Point::from).collect(),
            viewport: ViewportState::with_normalized_zoom(settings.zoom),
            stages: Stage::parse_list(&settings.stages)?,
        })
    }

    pub fn rectify_enabled(&self) -> bool {
        self.region.len() == 4
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("cannot process empty frame ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("stage produced an invalid image: {0}")]
    Geometry(String),
}

/// Per-frame processing run on the transform worker.
///
/// `config` is a snapshot private to this call. Changes the transform makes
/// to it (the viewport centre) are written back by the caller only if no
/// control changed in the meantime.
pub trait Transform: Send {
    fn process(&mut self, frame: &Frame, config: &mut PipelineConfig)
        -> Result<Frame, TransformError>;

    /// Drop all state tied to the current source.
    fn reset(&mut self);
}

/// Background model followed by the configured stages.
pub struct TransformChain {
    background: BackgroundModel,
    whiteboard: EnhanceFilter,
    invert: InvertFilter,
    threshold: AdaptiveThresholdFilter,
    sharpen: SharpenFilter,
}

impl TransformChain {
    pub fn new(config: &Config) -> Self {
        Self {
            background: BackgroundModel::new(&config.background),
            whiteboard: EnhanceFilter::new(&config.enhance),
            invert: InvertFilter,
            threshold: AdaptiveThresholdFilter::new(&config.enhance),
            sharpen: SharpenFilter::new(&config.enhance),
        }
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }
}

impl Transform for TransformChain {
    fn process(
        &mut self,
        frame: &Frame,
        config: &mut PipelineConfig,
    ) -> Result<Frame, TransformError> {
        if frame.is_empty() {
            return Err(TransformError::EmptyFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }

        // The canvas is maintained even when its output is not wanted.
        let canvas = self.background.update(&frame.image);
        let mut image: RgbImage = if config.remove_foreground {
            canvas.clone()
        } else {
            frame.image.clone()
        };

        for stage in &config.stages {
            let filter: &dyn ImageFilter = match stage {
                Stage::Rectify => {
                    if config.rectify_enabled() {
                        image = rectify(&image, &config.region);
                    }
                    continue;
                }
                Stage::Zoom => {
                    image = config.viewport.apply_zoom(&image);
                    continue;
                }
                Stage::Whiteboard if !config.whiteboard_filter => continue,
                Stage::Whiteboard => &self.whiteboard,
                Stage::Invert => &self.invert,
                Stage::Threshold => &self.threshold,
                Stage::Sharpen => &self.sharpen,
            };
            image = filter.apply(&image);
            if image.width() == 0 || image.height() == 0 {
                return Err(TransformError::Geometry(format!(
                    "{} produced an empty image",
                    filter.name()
                )));
            }
        }

        debug!(
            seq = frame.seq,
            width = image.width(),
            height = image.height(),
            still_strips = self.background.still_strips().iter().filter(|s| **s).count(),
            "frame processed"
        );
        Ok(frame.with_image(image))
    }

    fn reset(&mut self) {
        self.background.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(value: u8, seq: u64) -> Frame {
        Frame::new(RgbImage::from_pixel(60, 40, Rgb([value; 3])), 0, seq)
    }

    #[test]
    fn parses_stage_names() {
        let stages = Stage::parse_list(&["Rectify", " zoom", "sharpen"]).unwrap();
        assert_eq!(stages, vec![Stage::Rectify, Stage::Zoom, Stage::Sharpen]);
        assert!(Stage::parse_list(&["blur"]).is_err());
    }

    #[test]
    fn settings_convert_to_config() {
        let settings = PipelineSettings {
            region: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
            ..PipelineSettings::default()
        };
        let config = PipelineConfig::from_settings(&settings).unwrap();
        assert_eq!(config.stages, Stage::DEFAULT_ORDER.to_vec());
        assert!(!config.rectify_enabled(), "three points means disabled");
        assert!(config.viewport.is_identity());
    }

    #[test]
    fn default_chain_passes_frame_through() {
        let mut chain = TransformChain::new(&Config::default());
        let mut config = PipelineConfig::default();
        let input = frame(123, 5);
        let output = chain.process(&input, &mut config).unwrap();
        assert_eq!(output.seq, 5);
        assert_eq!(output.image, input.image);
    }

    #[test]
    fn empty_frame_is_rejected() {
        let mut chain = TransformChain::new(&Config::default());
        let empty = Frame::new(RgbImage::new(0, 0), 0, 0);
        let err = chain.process(&empty, &mut PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, TransformError::EmptyFrame { .. }));
    }

    #[test]
    fn background_tracks_while_removal_disabled() {
        let mut chain = TransformChain::new(&Config::default());
        let mut config = PipelineConfig::default();
        chain.process(&frame(50, 0), &mut config).unwrap();
        chain.process(&frame(52, 1), &mut config).unwrap();
        let canvas = chain.background().canvas().unwrap();
        assert_eq!(canvas.get_pixel(0, 0).0, [52; 3], "canvas follows still frames");

        config.remove_foreground = true;
        let output = chain.process(&frame(51, 2), &mut config).unwrap();
        assert_eq!(output.image.get_pixel(30, 20).0, [51; 3]);
    }

    #[test]
    fn stage_order_is_respected() {
        let mut chain = TransformChain::new(&Config::default());
        let mut config = PipelineConfig {
            region: vec![
                Point::new(0.0, 0.0),
                Point::new(29.0, 0.0),
                Point::new(29.0, 19.0),
                Point::new(0.0, 19.0),
            ],
            stages: vec![Stage::Invert, Stage::Rectify],
            ..PipelineConfig::default()
        };
        let output = chain.process(&frame(10, 0), &mut config).unwrap();
        assert_eq!(output.image.dimensions(), (29, 19));
        assert_eq!(output.image.get_pixel(10, 10).0, [245; 3]);
    }

    #[test]
    fn zoom_keeps_size_and_updates_viewport() {
        let mut chain = TransformChain::new(&Config::default());
        let mut config = PipelineConfig {
            viewport: ViewportState::with_normalized_zoom(0.7),
            ..PipelineConfig::default()
        };
        let output = chain.process(&frame(80, 0), &mut config).unwrap();
        assert_eq!(output.image.dimensions(), (60, 40));
        assert_eq!(config.viewport.center, Some((30.0, 20.0)));
    }
}
