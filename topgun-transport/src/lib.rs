//! Transfer layer for the EMS LCD TopGun USB light gun
//!
//! This crate turns the device's interrupt-IN reports into input frames:
//!
//! - Report decoding (active-low buttons, gun position, digital pad)
//! - The transfer cycle that keeps one read in flight while the device is open
//! - Device sessions with reference-counted opens and safe detach
//! - A hidapi bus backend and device discovery

pub mod buffer;
pub mod bus;
pub mod device_registry;
pub mod error;
pub mod names;
pub mod registry;
pub mod report;
pub mod sink;
pub mod transfer;
pub mod types;

mod discovery;
mod driver;
mod hid_bus;
mod session;

pub use buffer::ReportBuffer;
pub use bus::{
    completion_channel, Bus, BusError, CompletionReceiver, CompletionSender, ReadRequest,
    SubmitError,
};
pub use device_registry::{
    is_topgun, DRIVER_DESC, DRIVER_NAME, DRIVER_VERSION, PRODUCT_ID, VENDOR_ID,
};
pub use discovery::{DiscoveredDevice, HidDiscovery};
pub use driver::Driver;
pub use error::DriverError;
pub use hid_bus::{classify_read_error, HidBus, ReportReader, DEFAULT_READ_TIMEOUT_MS};
pub use names::{fallback_name, phys_path, DescriptorNameResolver, NameResolver};
pub use registry::{SessionId, SessionRegistry};
pub use report::{
    decode, Axis, AxisRange, Button, Capabilities, EventSet, CAPABILITIES, REPORT_LEN,
    REPORT_MIN_LEN,
};
pub use session::DeviceSession;
pub use sink::{InputBackend, InputSink, SinkError};
pub use transfer::{CompletionOutcome, CycleState, TransferCycle};
pub use types::{
    Completion, DeviceDescriptor, DeviceIdentity, EndpointDescriptor, InterfaceDescriptor,
    InterruptEndpoint, SessionConfig, TransferHandle, TransferStatus,
};
