//! Virtual light gun device using evdev/uinput
//!
//! Registers one uinput device per attached gun, advertising its buttons and
//! axis ranges, and writes every decoded report as one synchronized frame.

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, InputEvent, InputId, Key,
    UinputAbsSetup,
};
use topgun_transport::{
    Axis, Button, Capabilities, DeviceIdentity, EventSet, InputBackend, InputSink, SinkError,
};
use tracing::{debug, info};

/// Device version reported in the input id
const INPUT_VERSION: u16 = 0x0100;

/// Creates uinput devices for attached guns
#[derive(Debug, Clone, Copy, Default)]
pub struct UinputBackend;

impl UinputBackend {
    pub fn new() -> Self {
        Self
    }
}

impl InputBackend for UinputBackend {
    fn register_device(
        &self,
        identity: &DeviceIdentity,
        capabilities: &Capabilities,
    ) -> Result<Box<dyn InputSink>, SinkError> {
        Ok(Box::new(UinputSink::new(identity, capabilities)?))
    }
}

/// One registered virtual light gun
pub struct UinputSink {
    device: VirtualDevice,
    name: String,
}

impl UinputSink {
    pub fn new(identity: &DeviceIdentity, capabilities: &Capabilities) -> Result<Self, SinkError> {
        let mut keys = AttributeSet::<Key>::new();
        for &button in capabilities.buttons {
            keys.insert(button_key(button));
        }

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(SinkError::Register)?
            .name(&identity.name)
            .input_id(InputId::new(
                BusType::BUS_USB,
                identity.vendor_id,
                identity.product_id,
                INPUT_VERSION,
            ))
            .with_keys(&keys)
            .map_err(SinkError::Register)?;

        for range in capabilities.axes {
            let setup = UinputAbsSetup::new(
                axis_code(range.axis),
                AbsInfo::new(0, range.min, range.max, 0, 0, 0),
            );
            builder = builder
                .with_absolute_axis(&setup)
                .map_err(SinkError::Register)?;
        }

        let mut device = builder.build().map_err(SinkError::Register)?;

        if let Some(node) = device
            .enumerate_dev_nodes_blocking()
            .ok()
            .and_then(|mut nodes| nodes.next())
            .and_then(Result::ok)
        {
            info!("Registered {} as {}", identity.name, node.display());
        } else {
            info!("Registered {}", identity.name);
        }

        Ok(Self {
            device,
            name: identity.name.clone(),
        })
    }
}

impl InputSink for UinputSink {
    fn emit(&mut self, events: &EventSet) -> Result<(), SinkError> {
        // VirtualDevice::emit terminates the batch with SYN_REPORT
        self.device
            .emit(&frame_events(events))
            .map_err(SinkError::Emit)
    }

    fn unregister(self: Box<Self>) {
        debug!("Removing virtual device {}", self.name);
    }
}

/// Key and axis events of one frame, in capability order
pub fn frame_events(events: &EventSet) -> Vec<InputEvent> {
    let keys = events.buttons().map(|(button, held)| {
        InputEvent::new(EventType::KEY, button_key(button).code(), held as i32)
    });
    let axes = events
        .axes()
        .map(|(axis, value)| InputEvent::new(EventType::ABSOLUTE, axis_code(axis).0, value));
    keys.chain(axes).collect()
}

fn button_key(button: Button) -> Key {
    match button {
        Button::Trigger => Key::BTN_TRIGGER,
        Button::A => Key::BTN_SOUTH,
        Button::B => Key::BTN_EAST,
        Button::C => Key::BTN_C,
        Button::Start => Key::BTN_START,
        Button::Select => Key::BTN_SELECT,
    }
}

fn axis_code(axis: Axis) -> AbsoluteAxisType {
    match axis {
        Axis::StickX => AbsoluteAxisType::ABS_X,
        Axis::StickY => AbsoluteAxisType::ABS_Y,
        Axis::PadX => AbsoluteAxisType::ABS_HAT0X,
        Axis::PadY => AbsoluteAxisType::ABS_HAT0Y,
    }
}
