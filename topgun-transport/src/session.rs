//! Device session: one attached light gun
//!
//! Binds the bus, the transfer cycle and the registered input device of one
//! physical device, and reference-counts consumer opens.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::buffer::ReportBuffer;
use crate::bus::Bus;
use crate::error::DriverError;
use crate::names::NameResolver;
use crate::registry::SessionId;
use crate::report::CAPABILITIES;
use crate::sink::{InputBackend, InputSink};
use crate::transfer::{CompletionOutcome, CycleState, TransferCycle};
use crate::types::{
    Completion, DeviceDescriptor, DeviceIdentity, InterfaceDescriptor, InterruptEndpoint,
    SessionConfig,
};

struct SessionInner {
    open_count: u32,
    cycle: TransferCycle,
    sink: Option<Box<dyn InputSink>>,
    detached: bool,
    fault: Option<String>,
}

/// State of one attached device
pub struct DeviceSession {
    id: SessionId,
    identity: DeviceIdentity,
    endpoint: InterruptEndpoint,
    bus: Arc<dyn Bus>,
    inner: Mutex<SessionInner>,
    state_tx: watch::Sender<CycleState>,
}

impl DeviceSession {
    /// Validate the interface and register the input device.
    ///
    /// Nothing stays registered if any step fails.
    pub fn attach(
        id: SessionId,
        bus: Arc<dyn Bus>,
        device: &DeviceDescriptor,
        interface: &InterfaceDescriptor,
        resolver: &dyn NameResolver,
        backend: &dyn InputBackend,
        config: &SessionConfig,
    ) -> Result<Self, DriverError> {
        let endpoint = InterruptEndpoint::from_interface(interface)?;
        let identity = DeviceIdentity::resolve(device, resolver);
        let buffer = ReportBuffer::new(endpoint.max_packet_size as usize);

        let sink = backend.register_device(&identity, &CAPABILITIES)?;

        info!(
            "Attached {} at {} (endpoint 0x{:02X}, {} byte reads)",
            identity.name,
            identity.phys,
            endpoint.address,
            buffer.transfer_len()
        );

        let cycle = TransferCycle::new(id, endpoint, buffer, config);
        let (state_tx, _) = watch::channel(cycle.state());

        Ok(Self {
            id,
            identity,
            endpoint,
            bus,
            inner: Mutex::new(SessionInner {
                open_count: 0,
                cycle,
                sink: Some(sink),
                detached: false,
                fault: None,
            }),
            state_tx,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn endpoint(&self) -> InterruptEndpoint {
        self.endpoint
    }

    pub fn state(&self) -> CycleState {
        self.inner.lock().cycle.state()
    }

    pub fn open_count(&self) -> u32 {
        self.inner.lock().open_count
    }

    /// Last resubmission failure seen on the completion path
    pub fn fault(&self) -> Option<String> {
        self.inner.lock().fault.clone()
    }

    pub fn is_detached(&self) -> bool {
        self.inner.lock().detached
    }

    /// Watch the transfer cycle state
    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state_tx.subscribe()
    }

    /// A consumer opened the input device. The first open arms the read cycle.
    pub fn open(&self) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        if inner.detached {
            return Err(DriverError::DeviceUnavailable(format!(
                "{} is detached",
                self.identity.phys
            )));
        }

        inner.open_count += 1;
        if inner.open_count == 1 {
            inner.fault = None;
            if let Err(e) = inner.cycle.start(self.bus.as_ref()) {
                inner.open_count -= 1;
                self.publish(&inner);
                warn!("Failed to start reads on {}: {}", self.identity.phys, e);
                return Err(e);
            }
            debug!("Session {} opened, reads armed", self.id);
        }

        self.publish(&inner);
        Ok(())
    }

    /// A consumer closed the input device. The last close cancels the read.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.open_count == 0 {
            warn!("Close on {} without matching open, ignoring", self.identity.phys);
            return;
        }

        inner.open_count -= 1;
        if inner.open_count == 0 {
            inner.cycle.cancel(self.bus.as_ref());
            debug!("Session {} closed, cancelling reads", self.id);
        }
        self.publish(&inner);
    }

    /// Tear the session down once no read can touch it anymore.
    ///
    /// Cancels any outstanding read, waits for its terminal completion to be
    /// handled, then unregisters the input device and drops the buffer.
    pub async fn detach(&self) {
        let mut state_rx = {
            let mut inner = self.inner.lock();
            if !inner.detached {
                inner.detached = true;
                inner.open_count = 0;
                inner.cycle.cancel(self.bus.as_ref());
                self.publish(&inner);
            }
            self.state_tx.subscribe()
        };

        // The sender lives in self, so this only returns once quiescent
        let _ = state_rx.wait_for(|state| state.is_quiescent()).await;

        let mut inner = self.inner.lock();
        if let Some(sink) = inner.sink.take() {
            sink.unregister();
            info!("Detached {} at {}", self.identity.name, self.identity.phys);
        }
        inner.cycle.release_buffer();
    }

    /// Route one completion through the transfer cycle
    pub fn handle_completion(&self, completion: Completion) -> CompletionOutcome {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let outcome =
            inner
                .cycle
                .on_completion(completion, self.bus.as_ref(), inner.sink.as_deref_mut());

        if let CompletionOutcome::Failed(e) = &outcome {
            error!("{} stopped reading: {}", self.identity.phys, e);
            inner.fault = Some(e.to_string());
        }

        self.publish(inner);
        outcome
    }

    fn publish(&self, inner: &SessionInner) {
        self.state_tx.send_replace(inner.cycle.state());
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
