use crate::capture::CaptureSource;
use crate::error::PipelineError;
use crate::frame::Frame;
use std::time::SystemTime;

/// Copies the source's current frame into a reusable raster buffer.
pub struct Sampler {
    source: Box<dyn CaptureSource>,
    frame: Frame,
    active: bool,
    sequence: u64,
}

impl Sampler {
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        Self {
            source,
            frame: Frame::new(),
            active: false,
            sequence: 0,
        }
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    pub async fn activate(&mut self) -> Result<(), PipelineError> {
        if self.active {
            return Ok(());
        }
        self.source.open().await?;
        self.active = true;
        Ok(())
    }

    pub fn deactivate(&mut self) {
        if self.active {
            self.source.close();
            self.active = false;
        }
    }

    /// Sample the source once.
    ///
    /// Returns `Ok(false)` without touching the buffer when the source is
    /// inactive or has no frame ready.
    pub async fn sample(&mut self) -> Result<bool, PipelineError> {
        if !self.active {
            return Ok(false);
        }
        if !self.source.grab(&mut self.frame).await? {
            return Ok(false);
        }

        self.sequence += 1;
        self.frame.sequence = self.sequence;
        self.frame.captured_at = Some(SystemTime::now());
        Ok(true)
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}
