//! Display name and physical path construction

use crate::types::{DeviceDescriptor, DeviceIdentity};

/// Best-effort source of a human-readable device name
pub trait NameResolver: Send + Sync {
    fn resolve_display_name(&self, device: &DeviceDescriptor) -> Option<String>;
}

/// Builds the name from the manufacturer and product strings
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorNameResolver;

impl NameResolver for DescriptorNameResolver {
    fn resolve_display_name(&self, device: &DeviceDescriptor) -> Option<String> {
        let parts: Vec<&str> = [device.manufacturer.as_deref(), device.product.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Name used when the device provides no strings
pub fn fallback_name(vendor_id: u16, product_id: u16) -> String {
    format!("EMS LCD TopGun {vendor_id:04x}:{product_id:04x}")
}

/// Physical path label for the input device
pub fn phys_path(bus_path: &str) -> String {
    format!("{bus_path}/input0")
}

impl DeviceIdentity {
    /// Resolve the identity of a device at attach time
    pub fn resolve(device: &DeviceDescriptor, resolver: &dyn NameResolver) -> Self {
        let name = resolver
            .resolve_display_name(device)
            .unwrap_or_else(|| fallback_name(device.vendor_id, device.product_id));

        Self {
            name,
            phys: phys_path(&device.bus_path),
            vendor_id: device.vendor_id,
            product_id: device.product_id,
        }
    }
}
