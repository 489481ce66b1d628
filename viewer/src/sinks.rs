use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kaptchi_common::frame::Frame;
use kaptchi_pipeline::sink::{DisplaySink, Gallery, GalleryError, SavedSnapshot};
use tracing::{debug, info, warn};

use crate::keys::snapshot_key;

/// Headless display: logs every render and writes every `every_n`-th frame
/// to a preview image, if a path is configured.
pub struct PreviewSink {
    path: Option<PathBuf>,
    every_n: u64,
    renders: u64,
    last_seq: Option<u64>,
}

impl PreviewSink {
    pub fn new(path: Option<PathBuf>, every_n: u64) -> Self {
        Self {
            path,
            every_n: every_n.max(1),
            renders: 0,
            last_seq: None,
        }
    }
}

impl DisplaySink for PreviewSink {
    fn render(&mut self, frame: &Frame) {
        self.renders += 1;
        let fresh = self.last_seq != Some(frame.seq);
        self.last_seq = Some(frame.seq);
        debug!(seq = frame.seq, fresh, renders = self.renders, "render");

        if (self.renders - 1) % self.every_n != 0 {
            return;
        }
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = frame.image.save(path) {
            warn!(path = %path.display(), error = %e, "failed to write preview");
        }
    }
}

/// Snapshot gallery backed by a directory of PNG files.
pub struct DirectoryGallery {
    root: PathBuf,
    prefix: String,
    /// Saved files by snapshot id, so `remove` can find them. One entry per
    /// snapshot until it is removed; the pipeline itself never removes.
    files: HashMap<u64, PathBuf>,
}

impl DirectoryGallery {
    pub fn open(root: &Path, prefix: &str) -> Result<Self, GalleryError> {
        std::fs::create_dir_all(root)?;
        info!(dir = %root.display(), prefix, "snapshot gallery ready");
        Ok(Self {
            root: root.to_path_buf(),
            prefix: prefix.to_string(),
            files: HashMap::new(),
        })
    }
}

impl Gallery for DirectoryGallery {
    fn add(&mut self, snapshot: &SavedSnapshot) -> Result<(), GalleryError> {
        let key = snapshot_key(&self.prefix, snapshot.id, snapshot.frame.captured_at_ms);
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        snapshot
            .frame
            .image
            .save(&path)
            .map_err(|e| GalleryError::Storage(e.to_string()))?;
        info!(id = snapshot.id, path = %path.display(), "snapshot saved");
        self.files.insert(snapshot.id, path);
        Ok(())
    }

    fn remove(&mut self, id: u64) -> Result<(), GalleryError> {
        let path = self
            .files
            .remove(&id)
            .ok_or_else(|| GalleryError::Storage(format!("unknown snapshot id {id}")))?;
        std::fs::remove_file(&path)?;
        debug!(id, path = %path.display(), "snapshot removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn snapshot(id: u64) -> SavedSnapshot {
        SavedSnapshot {
            id,
            frame: Frame::new(RgbImage::from_pixel(5, 4, Rgb([1, 2, 3])), 1739871000000, 77),
        }
    }

    #[test]
    fn gallery_writes_and_removes_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mut gallery = DirectoryGallery::open(&dir.path().join("shots"), "board").unwrap();

        gallery.add(&snapshot(0)).unwrap();
        let path = dir
            .path()
            .join("shots/2025-02-18/board_0000_20250218T093000000Z.png");
        assert!(path.exists(), "snapshot file should be written");
        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.get_pixel(4, 3).0, [1, 2, 3]);

        gallery.remove(0).unwrap();
        assert!(!path.exists());
        assert!(gallery.remove(0).is_err(), "second removal is an error");
    }

    #[test]
    fn preview_written_every_n_renders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let mut sink = PreviewSink::new(Some(path.clone()), 3);

        let frame = |v: u8, seq: u64| Frame::new(RgbImage::from_pixel(2, 2, Rgb([v; 3])), 0, seq);
        sink.render(&frame(10, 0));
        assert!(path.exists(), "first render is written");
        sink.render(&frame(20, 1));
        sink.render(&frame(30, 2));
        assert_eq!(image::open(&path).unwrap().to_rgb8().get_pixel(0, 0).0, [10; 3]);
        sink.render(&frame(40, 3));
        assert_eq!(image::open(&path).unwrap().to_rgb8().get_pixel(0, 0).0, [40; 3]);
    }
}
