use crate::error::PipelineError;
use crate::frame::Frame;
use async_trait::async_trait;

/// A live or file-backed video input.
///
/// Sources are owned by the stream controller: `open` is called on
/// start-capture, `grab` on every sampling tick, `close` on stop-capture.
#[async_trait]
pub trait CaptureSource: Send {
    /// Human readable description for logs
    fn describe(&self) -> String;

    /// Acquire the underlying device or stream.
    async fn open(&mut self) -> Result<(), PipelineError>;

    /// Draw the current frame into `frame`.
    ///
    /// Returns `Ok(false)` when the source has no frame ready yet (or has run
    /// out of frames); the buffer is left untouched in that case.
    async fn grab(&mut self, frame: &mut Frame) -> Result<bool, PipelineError>;

    /// Release the source. Must be safe to call when not open.
    fn close(&mut self);
}
