use super::source::CaptureSource;
use crate::error::PipelineError;
use crate::frame::Frame;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// File-backed source: plays the images in a directory in name order.
pub struct DirectorySource {
    dir: PathBuf,
    repeat: bool,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, repeat: bool) -> Self {
        Self {
            dir: dir.into(),
            repeat,
            files: Vec::new(),
            cursor: 0,
        }
    }

    fn list_frames(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl CaptureSource for DirectorySource {
    fn describe(&self) -> String {
        format!("directory {:?}", self.dir)
    }

    async fn open(&mut self) -> Result<(), PipelineError> {
        let files = Self::list_frames(&self.dir).map_err(|e| {
            PipelineError::Acquisition(format!("cannot read {:?}: {}", self.dir, e))
        })?;

        if files.is_empty() {
            return Err(PipelineError::Acquisition(format!(
                "no image files in {:?}",
                self.dir
            )));
        }

        tracing::info!("Opened {:?} with {} frames", self.dir, files.len());
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    async fn grab(&mut self, frame: &mut Frame) -> Result<bool, PipelineError> {
        if self.files.is_empty() {
            return Ok(false);
        }
        if self.cursor >= self.files.len() {
            if !self.repeat {
                return Ok(false);
            }
            self.cursor = 0;
        }

        let path = self.files[self.cursor].clone();
        self.cursor += 1;

        let decoded = tokio::task::spawn_blocking(move || {
            image::open(&path)
                .map(|img| img.to_rgb8())
                .map_err(|e| format!("failed to decode {:?}: {}", path, e))
        })
        .await
        .map_err(|e| PipelineError::Acquisition(format!("decode task failed: {}", e)))?
        .map_err(PipelineError::Acquisition)?;

        frame.load(&decoded);
        Ok(true)
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frame(dir: &Path, name: &str, shade: u8) {
        RgbImage::from_pixel(8, 6, Rgb([shade, shade, shade]))
            .save(dir.join(name))
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = DirectorySource::new(dir.path(), true);

        let err = source.open().await.unwrap_err();
        assert!(matches!(err, PipelineError::Acquisition(_)));
    }

    #[tokio::test]
    async fn test_open_missing_directory_fails() {
        let mut source = DirectorySource::new("/nonexistent/beltwatch/frames", true);
        assert!(matches!(
            source.open().await,
            Err(PipelineError::Acquisition(_))
        ));
    }

    #[tokio::test]
    async fn test_frames_played_in_name_order_and_looped() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "b.png", 200);
        write_frame(dir.path(), "a.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = DirectorySource::new(dir.path(), true);
        source.open().await.unwrap();
        let mut frame = Frame::new();

        let mut shades = Vec::new();
        for _ in 0..3 {
            assert!(source.grab(&mut frame).await.unwrap());
            shades.push(frame.pixels().get_pixel(0, 0).0[0]);
        }

        assert_eq!(shades, vec![10, 200, 10]);
        assert_eq!((frame.width(), frame.height()), (8, 6));
    }

    #[tokio::test]
    async fn test_not_ready_when_exhausted_without_repeat() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "only.png", 50);

        let mut source = DirectorySource::new(dir.path(), false);
        source.open().await.unwrap();
        let mut frame = Frame::new();

        assert!(source.grab(&mut frame).await.unwrap());
        assert!(!source.grab(&mut frame).await.unwrap());
    }
}
