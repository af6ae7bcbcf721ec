use crate::error::PipelineError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Serializes a raster buffer into a compressed payload.
#[async_trait]
pub trait FrameEncoder: Send + Sync {
    fn content_type(&self) -> &'static str;

    async fn encode(&self, image: Arc<RgbImage>) -> Result<Vec<u8>, PipelineError>;
}

/// JPEG encoder running on the blocking pool.
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

#[async_trait]
impl FrameEncoder for JpegFrameEncoder {
    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }

    async fn encode(&self, image: Arc<RgbImage>) -> Result<Vec<u8>, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::Encode(format!(
                "raster buffer is {}x{}",
                image.width(),
                image.height()
            )));
        }

        let quality = self.quality;
        tokio::task::spawn_blocking(move || encode_jpeg(&image, quality))
            .await
            .map_err(|e| PipelineError::Encode(format!("encode task failed: {}", e)))?
    }
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    Ok(buffer)
}

/// Write `image` as JPEG to `path` atomically.
///
/// The file is written next to the destination and renamed into place, so
/// readers polling `path` never see a partial image.
pub async fn write_snapshot(path: PathBuf, image: Arc<RgbImage>, quality: u8) -> Result<()> {
    tokio::task::spawn_blocking(move || write_snapshot_blocking(&path, &image, quality))
        .await
        .context("snapshot task failed")?
}

/// Background writer for the latest annotated frame.
///
/// Writes happen one at a time on a single task. Frames published while a
/// write is running collapse into the newest, so the file on disk never goes
/// back to an older frame.
pub struct SnapshotWriter {
    tx: watch::Sender<Option<Arc<RgbImage>>>,
}

impl SnapshotWriter {
    pub fn spawn(path: PathBuf, quality: u8) -> Self {
        let (tx, mut rx) = watch::channel(None::<Arc<RgbImage>>);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let Some(image) = rx.borrow_and_update().clone() else {
                    continue;
                };
                if let Err(e) = write_snapshot(path.clone(), image, quality).await {
                    tracing::warn!("Failed to write snapshot: {:#}", e);
                }
            }
            tracing::debug!("Snapshot writer for {:?} exiting", path);
        });
        Self { tx }
    }

    pub fn publish(&self, image: Arc<RgbImage>) {
        self.tx.send_replace(Some(image));
    }
}

fn write_snapshot_blocking(path: &Path, image: &RgbImage, quality: u8) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let jpeg = encode_jpeg(image, quality)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".beltwatch-")
        .suffix(".jpg")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;

    std::io::Write::write_all(&mut temp, &jpeg).context("Failed to write snapshot")?;
    temp.persist(path)
        .with_context(|| format!("Failed to move snapshot to {:?}", path))?;
    Ok(())
}
