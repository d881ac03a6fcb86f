//! Input sink collaborator: where decoded frames go

use thiserror::Error;

use crate::report::{Capabilities, EventSet};
use crate::types::DeviceIdentity;

/// Errors from input sink operations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to register input device: {0}")]
    Register(#[source] std::io::Error),
    #[error("Failed to emit event: {0}")]
    Emit(#[source] std::io::Error),
}

/// Creates one sink per attached device
pub trait InputBackend: Send + Sync {
    /// Register a device with the consumer side
    fn register_device(
        &self,
        identity: &DeviceIdentity,
        capabilities: &Capabilities,
    ) -> Result<Box<dyn InputSink>, SinkError>;
}

/// A registered input device
pub trait InputSink: Send {
    /// Publish one complete frame (all buttons and axes, then a sync marker)
    fn emit(&mut self, events: &EventSet) -> Result<(), SinkError>;

    /// Remove the device from the consumer side
    fn unregister(self: Box<Self>) {}
}
