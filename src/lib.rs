//! EMS LCD TopGun light gun driver
//!
//! Library side of the `topgun_driver` binary: configuration and the
//! monitor sink.

pub mod config;
pub mod monitor;

pub use config::DriverConfig;
pub use monitor::MonitorBackend;
