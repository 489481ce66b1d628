use std::path::{Path, PathBuf};

use image::RgbImage;
use kaptchi_pipeline::source::{FrameSource, SourceError};
use tracing::{debug, info};

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Plays back a directory of still images, in file name order, as a finite
/// (or looping) frame stream.
pub struct ImageSequenceSource {
    name: String,
    paths: Vec<PathBuf>,
    next: usize,
    fps: f64,
    looping: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64, looping: bool) -> Result<Self, SourceError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", dir.display())))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(SourceError::Unavailable(format!(
                "no images found in {}",
                dir.display()
            )));
        }
        info!(dir = %dir.display(), frames = paths.len(), fps, looping, "opened image sequence");

        Ok(Self {
            name: dir.display().to_string(),
            paths,
            next: 0,
            fps,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        if self.next >= self.paths.len() {
            if !self.looping {
                return Ok(None);
            }
            debug!(source = %self.name, "restarting image sequence");
            self.next = 0;
        }
        let path = &self.paths[self.next];
        self.next += 1;
        image::open(path)
            .map(|img| Some(img.to_rgb8()))
            .map_err(|e| SourceError::Read(format!("{}: {e}", path.display())))
    }

    fn approximate_fps(&self) -> Option<f64> {
        Some(self.fps)
    }

    fn duration_seconds(&self) -> Option<f64> {
        (!self.looping).then(|| self.paths.len() as f64 / self.fps)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, values: &[u8]) {
        for (i, v) in values.iter().enumerate() {
            RgbImage::from_pixel(4, 3, Rgb([*v; 3]))
                .save(dir.join(format!("frame_{i:03}.png")))
                .unwrap();
        }
    }

    #[test]
    fn plays_frames_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[10, 20, 30]);
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 15.0, false).unwrap();
        assert_eq!(source.len(), 3, "non-image files are skipped");
        assert_eq!(source.duration_seconds(), Some(0.2));

        let values: Vec<u8> = std::iter::from_fn(|| source.read().unwrap())
            .map(|img| img.get_pixel(0, 0).0[0])
            .collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert!(source.read().unwrap().is_none(), "stays exhausted");
    }

    #[test]
    fn looping_restarts() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &[1, 2]);
        let mut source = ImageSequenceSource::open(dir.path(), 10.0, true).unwrap();
        let values: Vec<u8> = (0..5)
            .map(|_| source.read().unwrap().unwrap().get_pixel(0, 0).0[0])
            .collect();
        assert_eq!(values, vec![1, 2, 1, 2, 1]);
        assert_eq!(source.duration_seconds(), None);
    }

    #[test]
    fn missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageSequenceSource::open(&dir.path().join("nope"), 10.0, false)
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[test]
    fn empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path(), 10.0, false),
            Err(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn unreadable_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let mut source = ImageSequenceSource::open(dir.path(), 10.0, false).unwrap();
        assert!(matches!(source.read(), Err(SourceError::Read(_))));
    }
}
