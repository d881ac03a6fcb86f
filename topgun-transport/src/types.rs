//! Common types for the transfer layer

use serde::{Deserialize, Serialize};

use crate::buffer::ReportBuffer;
use crate::error::DriverError;
use crate::registry::SessionId;

/// Endpoint address bit marking device-to-host direction
pub const ENDPOINT_DIR_IN: u8 = 0x80;
/// Mask for the transfer type in `bmAttributes`
pub const ENDPOINT_XFER_MASK: u8 = 0x03;
/// Interrupt transfer type
pub const ENDPOINT_XFER_INT: u8 = 0x03;

/// Device identification read from the device descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Manufacturer string if the device provides one
    pub manufacturer: Option<String>,
    /// Product string if the device provides one
    pub product: Option<String>,
    /// Bus path of the device (e.g. `usb-0000:00:14.0-2` or a hidraw path)
    pub bus_path: String,
}

/// Raw endpoint descriptor fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// `bEndpointAddress`, direction in bit 7
    pub address: u8,
    /// `bmAttributes`, transfer type in bits 0..1
    pub attributes: u8,
    /// `wMaxPacketSize`
    pub max_packet_size: u16,
    /// `bInterval` polling interval
    pub interval: u8,
}

impl EndpointDescriptor {
    /// Check if this endpoint transfers device-to-host
    pub fn is_input(&self) -> bool {
        self.address & ENDPOINT_DIR_IN != 0
    }

    /// Check if this is an interrupt endpoint
    pub fn is_interrupt(&self) -> bool {
        self.attributes & ENDPOINT_XFER_MASK == ENDPOINT_XFER_INT
    }
}

/// Active alternate setting of the bound interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub endpoints: Vec<EndpointDescriptor>,
}

impl InterfaceDescriptor {
    /// Interface as exposed through hidraw: only its interrupt-IN pipe is visible
    pub fn hid_interrupt_in(max_packet_size: u16) -> Self {
        Self {
            endpoints: vec![EndpointDescriptor {
                address: ENDPOINT_DIR_IN | 0x01,
                attributes: ENDPOINT_XFER_INT,
                max_packet_size,
                interval: 10,
            }],
        }
    }
}

/// The single interrupt-IN endpoint a session reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEndpoint {
    pub address: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl InterruptEndpoint {
    /// Validate the interface shape: exactly one endpoint, interrupt, device-to-host
    pub fn from_interface(interface: &InterfaceDescriptor) -> Result<Self, DriverError> {
        let [endpoint] = interface.endpoints.as_slice() else {
            return Err(DriverError::UnsupportedDevice(format!(
                "expected 1 endpoint, found {}",
                interface.endpoints.len()
            )));
        };

        if !endpoint.is_input() {
            return Err(DriverError::UnsupportedDevice(format!(
                "endpoint 0x{:02X} is not an input endpoint",
                endpoint.address
            )));
        }
        if !endpoint.is_interrupt() {
            return Err(DriverError::UnsupportedDevice(format!(
                "endpoint 0x{:02X} is not an interrupt endpoint (attributes 0x{:02X})",
                endpoint.address, endpoint.attributes
            )));
        }

        Ok(Self {
            address: endpoint.address,
            max_packet_size: endpoint.max_packet_size,
            interval: endpoint.interval,
        })
    }
}

/// Identity strings fixed at attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Human-readable device name
    pub name: String,
    /// Physical path label (`<bus path>/input0`)
    pub phys: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Opaque handle of one submitted read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHandle(pub u64);

/// Outcome of one read as reported by the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Report received
    Success { actual_len: usize },
    /// Retryable bus fault (stall, CRC, babble, ...)
    TransientError(String),
    /// The read was cancelled on request
    Cancelled,
    /// The device was removed or the bus shut down underneath the read
    DeviceGone,
}

/// Completion message for one read; hands the transfer buffer back
#[derive(Debug)]
pub struct Completion {
    pub session: SessionId,
    pub handle: TransferHandle,
    pub status: TransferStatus,
    pub buffer: ReportBuffer,
}

/// Per-session settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Log every report (hex dump and decoded frame)
    #[serde(default)]
    pub debug: bool,
    /// Stop after this many consecutive transient faults (unbounded if unset)
    #[serde(default)]
    pub transient_retry_limit: Option<u32>,
}
