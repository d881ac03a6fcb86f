//! Device discovery over hidapi

use std::ffi::CString;

use hidapi::{DeviceInfo, HidApi};
use tracing::{debug, info};

use crate::bus::CompletionSender;
use crate::device_registry;
use crate::error::DriverError;
use crate::hid_bus::{HidBus, DEFAULT_READ_TIMEOUT_MS};
use crate::report::REPORT_LEN;
use crate::types::{DeviceDescriptor, InterfaceDescriptor};

/// A matching HID interface
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub descriptor: DeviceDescriptor,
    /// hidraw node to open
    pub path: CString,
}

/// Finds and opens TopGun devices
pub struct HidDiscovery {
    /// Known VID/PID pairs to look for
    known_devices: Vec<(u16, u16)>,
    read_timeout_ms: i32,
}

impl Default for HidDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl HidDiscovery {
    pub fn new() -> Self {
        Self {
            known_devices: device_registry::DEVICE_IDS.to_vec(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }

    /// Set the read timeout used by opened buses
    pub fn with_read_timeout(mut self, ms: i32) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    fn is_known_device(&self, vid: u16, pid: u16) -> bool {
        self.known_devices.contains(&(vid, pid))
    }

    fn descriptor(info: &DeviceInfo) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            manufacturer: info.manufacturer_string().map(str::to_string),
            product: info.product_string().map(str::to_string),
            bus_path: info.path().to_string_lossy().to_string(),
        }
    }

    /// List matching devices currently present
    pub fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, DriverError> {
        let api = HidApi::new()?;
        let mut devices: Vec<DiscoveredDevice> = Vec::new();

        for info in api.device_list() {
            if !self.is_known_device(info.vendor_id(), info.product_id()) {
                continue;
            }
            if devices.iter().any(|d| d.path.as_c_str() == info.path()) {
                continue;
            }

            let descriptor = Self::descriptor(info);
            debug!(
                "Found device: VID={:04X} PID={:04X} interface={} path={}",
                descriptor.vendor_id,
                descriptor.product_id,
                info.interface_number(),
                descriptor.bus_path
            );

            devices.push(DiscoveredDevice {
                descriptor,
                path: info.path().to_owned(),
            });
        }

        info!("Found {} devices", devices.len());
        Ok(devices)
    }

    /// Open a device as a bus delivering completions on `completions`
    pub fn open_device(
        &self,
        device: &DiscoveredDevice,
        completions: CompletionSender,
    ) -> Result<(HidBus, InterfaceDescriptor), DriverError> {
        let api = HidApi::new()?;
        let handle = api.open_path(&device.path)?;

        info!(
            "Opened {:04X}:{:04X} at {}",
            device.descriptor.vendor_id, device.descriptor.product_id, device.descriptor.bus_path
        );

        let bus = HidBus::new(
            handle,
            device.descriptor.bus_path.clone(),
            completions,
            self.read_timeout_ms,
        );
        Ok((bus, InterfaceDescriptor::hid_interrupt_in(REPORT_LEN as u16)))
    }
}
