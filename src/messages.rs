use crate::error::PipelineError;
use tokio::sync::oneshot;

/// Commands for the StreamController service
pub enum StreamCommand {
    Start(oneshot::Sender<Result<Transition, PipelineError>>),
    Stop(oneshot::Sender<Transition>),
}

/// Outcome of a start/stop command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Started,
    Stopped,
    /// The controller was already in the requested state
    Unchanged,
}
