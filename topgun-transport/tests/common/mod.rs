//! Test doubles: a scripted bus and a recording input backend.

#![allow(dead_code)]

use std::sync::{mpsc, Arc};

use parking_lot::Mutex;
use topgun_transport::{
    Bus, BusError, Capabilities, Completion, DeviceDescriptor, DeviceIdentity, EventSet,
    InputBackend, InputSink, ReadRequest, SinkError, SubmitError, TransferHandle, TransferStatus,
    PRODUCT_ID, VENDOR_ID,
};

/// Reference report: trigger, A and start held, stick at (564, 128)
pub const REPORT: [u8; 8] = [0xFB, 0x5F, 0x34, 0x02, 0x80, 0x00, 0x00, 0x00];

/// Nothing held
pub const IDLE_REPORT: [u8; 8] = [0xFF, 0xFF, 0xA0, 0x00, 0x20, 0x00, 0x00, 0x00];

#[derive(Default)]
struct MockBusState {
    outstanding: Vec<(TransferHandle, ReadRequest)>,
    submitted: u32,
    cancelled: Vec<TransferHandle>,
    next_handle: u64,
    refuse: Option<BusError>,
}

/// Bus that holds submitted reads until the test completes them
#[derive(Default)]
pub struct MockBus {
    state: Mutex<MockBusState>,
}

impl MockBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reads currently held by the bus
    pub fn outstanding(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    pub fn submitted(&self) -> u32 {
        self.state.lock().submitted
    }

    pub fn cancelled(&self) -> Vec<TransferHandle> {
        self.state.lock().cancelled.clone()
    }

    /// Refuse every submission until cleared
    pub fn refuse(&self, error: Option<BusError>) {
        self.state.lock().refuse = error;
    }

    /// Finish the oldest outstanding read, writing `bytes` into its buffer
    pub fn complete(&self, status: TransferStatus, bytes: &[u8]) -> Completion {
        let (handle, mut request) = {
            let mut state = self.state.lock();
            assert!(!state.outstanding.is_empty(), "no read outstanding");
            state.outstanding.remove(0)
        };
        request.buffer.write_report(bytes);
        Completion {
            session: request.session,
            handle,
            status,
            buffer: request.buffer,
        }
    }

    pub fn complete_report(&self, bytes: &[u8]) -> Completion {
        self.complete(
            TransferStatus::Success {
                actual_len: bytes.len(),
            },
            bytes,
        )
    }

    /// Finish the oldest read as cancelled
    pub fn complete_cancelled(&self) -> Completion {
        self.complete(TransferStatus::Cancelled, &[])
    }
}

impl Bus for MockBus {
    fn submit_read(&self, request: ReadRequest) -> Result<TransferHandle, SubmitError> {
        let mut state = self.state.lock();
        if let Some(error) = state.refuse.clone() {
            return Err(SubmitError {
                buffer: request.buffer,
                error,
            });
        }
        state.next_handle += 1;
        state.submitted += 1;
        let handle = TransferHandle(state.next_handle);
        state.outstanding.push((handle, request));
        Ok(handle)
    }

    fn cancel(&self, handle: TransferHandle) {
        self.state.lock().cancelled.push(handle);
    }
}

/// What happened to the input devices of a backend
#[derive(Debug, Default)]
pub struct SinkLog {
    pub registered: Vec<DeviceIdentity>,
    pub frames: Vec<EventSet>,
    pub unregistered: Vec<String>,
}

/// Holds one `register_device` call until released
pub struct RegisterGate {
    /// Signalled once the held call has started
    pub entered: mpsc::Receiver<()>,
    pub release: mpsc::Sender<()>,
}

/// Backend recording every registration, frame and unregistration
#[derive(Default)]
pub struct RecordingBackend {
    log: Arc<Mutex<SinkLog>>,
    fail_register: Mutex<bool>,
    hold_register: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_register(&self) {
        *self.fail_register.lock() = true;
    }

    /// Block the next registration until the gate is released
    pub fn hold_next_register(&self) -> RegisterGate {
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel();
        *self.hold_register.lock() = Some((entered_tx, release_rx));
        RegisterGate { entered, release }
    }

    pub fn frames(&self) -> Vec<EventSet> {
        self.log.lock().frames.clone()
    }

    pub fn registered(&self) -> usize {
        self.log.lock().registered.len()
    }

    pub fn registered_identity(&self, index: usize) -> DeviceIdentity {
        self.log.lock().registered[index].clone()
    }

    pub fn unregistered(&self) -> Vec<String> {
        self.log.lock().unregistered.clone()
    }
}

impl InputBackend for RecordingBackend {
    fn register_device(
        &self,
        identity: &DeviceIdentity,
        _capabilities: &Capabilities,
    ) -> Result<Box<dyn InputSink>, SinkError> {
        let held = self.hold_register.lock().take();
        if let Some((entered, release)) = held {
            let _ = entered.send(());
            let _ = release.recv();
        }
        if std::mem::take(&mut *self.fail_register.lock()) {
            return Err(SinkError::Register(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "uinput not writable",
            )));
        }
        self.log.lock().registered.push(identity.clone());
        Ok(Box::new(RecordingSink {
            phys: identity.phys.clone(),
            log: self.log.clone(),
        }))
    }
}

struct RecordingSink {
    phys: String,
    log: Arc<Mutex<SinkLog>>,
}

impl InputSink for RecordingSink {
    fn emit(&mut self, events: &EventSet) -> Result<(), SinkError> {
        self.log.lock().frames.push(*events);
        Ok(())
    }

    fn unregister(self: Box<Self>) {
        self.log.lock().unregistered.push(self.phys.clone());
    }
}

pub fn topgun_descriptor() -> DeviceDescriptor {
    DeviceDescriptor {
        vendor_id: VENDOR_ID,
        product_id: PRODUCT_ID,
        manufacturer: Some("EMS".to_string()),
        product: Some("LCD TopGun".to_string()),
        bus_path: "usb-0000:00:14.0-2".to_string(),
    }
}
