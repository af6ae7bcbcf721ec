use thiserror::Error;

/// Failures inside the capture → encode → analyze pipeline.
///
/// None of these stop the stream; the controller logs them, records them in
/// the status and carries on with the next tick.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture source unavailable: {0}")]
    Acquisition(String),

    #[error("frame encode failed: {0}")]
    Encode(String),

    #[error("detector unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("detector returned HTTP {status}: {body}")]
    Request { status: u16, body: String },

    #[error("invalid detector response: {0}")]
    InvalidResponse(String),
}

impl PipelineError {
    /// HTTP status for `Request` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            PipelineError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}
