//! Replay recorded scene-camera frames from disk

use super::{FrameSource, SourceError};
use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Frames from a directory of images, in file-name order
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>, looping: bool) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        log::info!("Replaying {} frames from {}", files.len(), dir.display());
        Ok(Self {
            files,
            next: 0,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FrameSource for ImageDirSource {
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        if self.next >= self.files.len() {
            if !self.looping || self.files.is_empty() {
                return Err(SourceError::Closed);
            }
            self.next = 0;
        }
        let path = self.files[self.next].clone();
        self.next += 1;

        let load = path.clone();
        let decoded = tokio::task::spawn_blocking(move || image::open(load))
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        match decoded {
            Ok(img) => Ok(Some(img.to_rgb8())),
            Err(e) => {
                // Unreadable file: skip this cycle, keep replaying.
                log::warn!("Skipping unreadable frame {}: {e}", path.display());
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frames(dir: &Path) {
        for (name, w) in [("b.png", 3), ("a.png", 2), ("c.png", 4)] {
            RgbImage::new(w, 2).save(dir.join(name)).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();
    }

    #[tokio::test]
    async fn replays_in_name_order_then_closes() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path());

        let mut source = ImageDirSource::open(dir.path(), false).unwrap();
        assert_eq!(source.len(), 3);
        let mut widths = Vec::new();
        for _ in 0..3 {
            widths.push(source.next_frame().await.unwrap().unwrap().width());
        }
        assert_eq!(widths, vec![2, 3, 4]);
        assert!(matches!(source.next_frame().await, Err(SourceError::Closed)));
    }

    #[tokio::test]
    async fn loops_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path());

        let mut source = ImageDirSource::open(dir.path(), true).unwrap();
        for _ in 0..3 {
            source.next_frame().await.unwrap();
        }
        let again = source.next_frame().await.unwrap().unwrap();
        assert_eq!(again.width(), 2);
    }

    #[tokio::test]
    async fn empty_directory_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageDirSource::open(dir.path(), true).unwrap();
        assert!(source.is_empty());
        assert!(matches!(source.next_frame().await, Err(SourceError::Closed)));
    }
}
