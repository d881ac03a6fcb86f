//! Monitor sink: prints decoded frames instead of creating input devices

use std::fmt::Write as _;

use crossterm::style::Stylize;
use topgun_transport::{Capabilities, DeviceIdentity, EventSet, InputBackend, InputSink, SinkError};

/// Backend whose devices print every frame to stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorBackend {
    /// Only print frames that differ from the previous one
    pub changes_only: bool,
}

impl InputBackend for MonitorBackend {
    fn register_device(
        &self,
        identity: &DeviceIdentity,
        _capabilities: &Capabilities,
    ) -> Result<Box<dyn InputSink>, SinkError> {
        eprintln!(
            "{} {}  {} ({:04x}:{:04x})",
            "+++".green(),
            "DEV".green().bold(),
            identity.name,
            identity.vendor_id,
            identity.product_id
        );
        Ok(Box::new(MonitorSink {
            label: identity.phys.clone(),
            changes_only: self.changes_only,
            last: None,
        }))
    }
}

struct MonitorSink {
    label: String,
    changes_only: bool,
    last: Option<EventSet>,
}

impl InputSink for MonitorSink {
    fn emit(&mut self, events: &EventSet) -> Result<(), SinkError> {
        if self.changes_only && self.last.as_ref() == Some(events) {
            return Ok(());
        }
        self.last = Some(*events);
        eprintln!("{} {}  {}", "<<<".yellow(), "EVT".yellow().bold(), format_frame(events));
        Ok(())
    }

    fn unregister(self: Box<Self>) {
        eprintln!("{} {}  {}", "---".red(), "DEV".red().bold(), self.label);
    }
}

/// One-line rendering of a frame: held buttons, stick and pad
pub fn format_frame(events: &EventSet) -> String {
    let mut out = String::new();
    for (button, held) in events.buttons() {
        if held {
            let _ = write!(out, "{} ", button.display_name());
        }
    }
    if out.is_empty() {
        out.push_str("- ");
    }
    let _ = write!(
        out,
        "x={} y={} pad=({:+},{:+})",
        events.stick_x, events.stick_y, events.pad_x, events.pad_y
    );
    out
}
