//! Report decoding for the TopGun interrupt endpoint
//!
//! The device sends an 8-byte status report on every poll. Only the first
//! five bytes carry data; all button and direction bits are active-low
//! (a cleared bit means the control is held).
//!
//! | Byte | Bits                                                        |
//! |------|-------------------------------------------------------------|
//! | 0    | 0x02 C, 0x04 A, 0x08 B, 0x10 pad X-, 0x20 pad Y+, 0x40 pad X+, 0x80 pad Y- |
//! | 1    | 0x20 trigger, 0x40 select, 0x80 start                       |
//! | 2    | stick X low byte                                            |
//! | 3    | stick X high byte                                           |
//! | 4    | stick Y                                                     |

/// Size of one report as sent by the device
pub const REPORT_LEN: usize = 8;

/// Bytes of a report that carry data
pub const REPORT_MIN_LEN: usize = 5;

/// Bit masks of the active-low controls
pub mod bits {
    // byte 0
    pub const BTN_C: u8 = 0x02;
    pub const BTN_A: u8 = 0x04;
    pub const BTN_B: u8 = 0x08;
    pub const PAD_LEFT: u8 = 0x10;
    pub const PAD_DOWN: u8 = 0x20;
    pub const PAD_RIGHT: u8 = 0x40;
    pub const PAD_UP: u8 = 0x80;

    // byte 1
    pub const TRIGGER: u8 = 0x20;
    pub const SELECT: u8 = 0x40;
    pub const START: u8 = 0x80;
}

/// Buttons reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Trigger,
    A,
    B,
    C,
    Start,
    Select,
}

impl Button {
    pub const ALL: [Button; 6] = [
        Button::Trigger,
        Button::A,
        Button::B,
        Button::C,
        Button::Start,
        Button::Select,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Button::Trigger => "trigger",
            Button::A => "A",
            Button::B => "B",
            Button::C => "C",
            Button::Start => "start",
            Button::Select => "select",
        }
    }
}

/// Absolute axes reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Gun X position
    StickX,
    /// Gun Y position
    StickY,
    /// Digital pad, horizontal
    PadX,
    /// Digital pad, vertical
    PadY,
}

impl Axis {
    pub const ALL: [Axis; 4] = [Axis::StickX, Axis::StickY, Axis::PadX, Axis::PadY];
}

/// Declared value range of an axis (advertised, not enforced)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub axis: Axis,
    pub min: i32,
    pub max: i32,
}

/// What a device registers with the input sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub buttons: &'static [Button],
    pub axes: &'static [AxisRange],
}

/// Capability set of the TopGun
pub const CAPABILITIES: Capabilities = Capabilities {
    buttons: &Button::ALL,
    axes: &[
        AxisRange {
            axis: Axis::StickX,
            min: 160,
            max: 672,
        },
        AxisRange {
            axis: Axis::StickY,
            min: 32,
            max: 224,
        },
        AxisRange {
            axis: Axis::PadX,
            min: -1,
            max: 1,
        },
        AxisRange {
            axis: Axis::PadY,
            min: -1,
            max: 1,
        },
    ],
};

/// Decoded state of one report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventSet {
    pub trigger: bool,
    pub a: bool,
    pub b: bool,
    pub c: bool,
    pub start: bool,
    pub select: bool,
    /// Gun X, 16-bit little-endian from bytes 2..3
    pub stick_x: i32,
    /// Gun Y, raw byte 4
    pub stick_y: i32,
    /// -1 left, +1 right
    pub pad_x: i32,
    /// -1 up, +1 down
    pub pad_y: i32,
}

impl EventSet {
    pub fn button(&self, button: Button) -> bool {
        match button {
            Button::Trigger => self.trigger,
            Button::A => self.a,
            Button::B => self.b,
            Button::C => self.c,
            Button::Start => self.start,
            Button::Select => self.select,
        }
    }

    pub fn axis(&self, axis: Axis) -> i32 {
        match axis {
            Axis::StickX => self.stick_x,
            Axis::StickY => self.stick_y,
            Axis::PadX => self.pad_x,
            Axis::PadY => self.pad_y,
        }
    }

    /// All buttons with their state, in capability order
    pub fn buttons(&self) -> impl Iterator<Item = (Button, bool)> + '_ {
        Button::ALL.iter().map(move |&b| (b, self.button(b)))
    }

    /// All axes with their value, in capability order
    pub fn axes(&self) -> impl Iterator<Item = (Axis, i32)> + '_ {
        Axis::ALL.iter().map(move |&a| (a, self.axis(a)))
    }
}

/// Held iff the bit is clear
#[inline]
fn active_low(byte: u8, mask: u8) -> bool {
    byte & mask == 0
}

/// Sum of the two opposite directions of one pad axis
#[inline]
fn pad_axis(byte: u8, negative: u8, positive: u8) -> i32 {
    let mut value = 0;
    if active_low(byte, negative) {
        value -= 1;
    }
    if active_low(byte, positive) {
        value += 1;
    }
    value
}

/// Decode a raw report. Every field is recomputed from this report alone.
pub fn decode(raw: &[u8; REPORT_LEN]) -> EventSet {
    let b0 = raw[0];
    let b1 = raw[1];

    EventSet {
        trigger: active_low(b1, bits::TRIGGER),
        a: active_low(b0, bits::BTN_A),
        b: active_low(b0, bits::BTN_B),
        c: active_low(b0, bits::BTN_C),
        start: active_low(b1, bits::START),
        select: active_low(b1, bits::SELECT),
        stick_x: u16::from_le_bytes([raw[2], raw[3]]) as i32,
        stick_y: raw[4] as i32,
        pad_x: pad_axis(b0, bits::PAD_LEFT, bits::PAD_RIGHT),
        pad_y: pad_axis(b0, bits::PAD_UP, bits::PAD_DOWN),
    }
}
