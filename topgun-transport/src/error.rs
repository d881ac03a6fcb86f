//! Driver error types

use thiserror::Error;

use crate::sink::SinkError;

/// Errors that can occur while binding or driving a device
#[derive(Error, Debug)]
pub enum DriverError {
    /// Endpoint layout does not match the device protocol; the device is not bound
    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    /// Read submission failed (device removed, resources exhausted)
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Operation is not valid in the current transfer cycle state
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// No session is registered under this id
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Input sink rejected registration or an event frame
    #[error("Input sink error: {0}")]
    Sink(#[from] SinkError),

    // HID-specific errors
    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),
}

impl From<hidapi::HidError> for DriverError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            DriverError::HidPermissionDenied(msg)
        } else {
            DriverError::HidError(msg)
        }
    }
}
