//! Device match table
//!
//! The driver binds by exact vendor/product equality; there is no
//! wildcarding or class matching.

/// EMS vendor ID
pub const VENDOR_ID: u16 = 0x0B9A;

/// LCD TopGun product ID
pub const PRODUCT_ID: u16 = 0x016A;

/// Supported (vendor, product) pairs
pub const DEVICE_IDS: &[(u16, u16)] = &[(VENDOR_ID, PRODUCT_ID)];

/// Driver name
pub const DRIVER_NAME: &str = "lcdtopgun";

/// Driver description
pub const DRIVER_DESC: &str = "USB EMS LCD TopGun driver";

/// Driver version
pub const DRIVER_VERSION: &str = "v0.2";

/// Check if a vendor/product pair is handled by this driver
#[inline]
pub fn is_topgun(vid: u16, pid: u16) -> bool {
    DEVICE_IDS.contains(&(vid, pid))
}
