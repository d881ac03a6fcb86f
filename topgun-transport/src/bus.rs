//! Bus collaborator: asynchronous interrupt reads
//!
//! A read request moves the session's transfer buffer into the bus. The bus
//! hands it back either in [`SubmitError`] when it refuses the request, or in
//! the [`Completion`] it sends once the read finishes. Every accepted request
//! produces exactly one completion.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::buffer::ReportBuffer;
use crate::registry::SessionId;
use crate::types::{Completion, InterruptEndpoint, TransferHandle};

/// Sending half of the completion channel, held by bus backends
pub type CompletionSender = mpsc::UnboundedSender<Completion>;

/// Receiving half of the completion channel, drained by the driver
pub type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

/// Create the channel completions are delivered on
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}

/// One read against the device's interrupt-IN endpoint
#[derive(Debug)]
pub struct ReadRequest {
    /// Echoed back in the completion for routing
    pub session: SessionId,
    pub endpoint: InterruptEndpoint,
    pub buffer: ReportBuffer,
}

/// Reasons a bus refuses a read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("no such device")]
    NoDevice,

    #[error("endpoint busy")]
    Busy,

    #[error("out of resources: {0}")]
    ResourceExhausted(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// A refused submission; returns the buffer to the caller
#[derive(Debug)]
pub struct SubmitError {
    pub buffer: ReportBuffer,
    pub error: BusError,
}

/// Host-side access to one attached device
pub trait Bus: Send + Sync {
    /// Queue a read. Returns immediately; the result arrives as a completion.
    fn submit_read(&self, request: ReadRequest) -> Result<TransferHandle, SubmitError>;

    /// Ask the bus to cancel an outstanding read.
    ///
    /// The read still completes, normally with `TransferStatus::Cancelled`.
    fn cancel(&self, handle: TransferHandle);
}
