//! Driver: the set of attached sessions and completion routing

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::bus::{Bus, CompletionReceiver};
use crate::device_registry;
use crate::error::DriverError;
use crate::names::NameResolver;
use crate::registry::{SessionId, SessionRegistry};
use crate::session::DeviceSession;
use crate::sink::InputBackend;
use crate::transfer::CompletionOutcome;
use crate::types::{Completion, DeviceDescriptor, InterfaceDescriptor, SessionConfig};

/// Owns every attached session
pub struct Driver {
    sessions: RwLock<SessionRegistry<Arc<DeviceSession>>>,
    backend: Arc<dyn InputBackend>,
    resolver: Arc<dyn NameResolver>,
    config: SessionConfig,
}

impl Driver {
    pub fn new(
        backend: Arc<dyn InputBackend>,
        resolver: Arc<dyn NameResolver>,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(SessionRegistry::new()),
            backend,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Bind a newly present device
    pub fn attach(
        &self,
        bus: Arc<dyn Bus>,
        device: &DeviceDescriptor,
        interface: &InterfaceDescriptor,
    ) -> Result<SessionId, DriverError> {
        if !device_registry::is_topgun(device.vendor_id, device.product_id) {
            return Err(DriverError::UnsupportedDevice(format!(
                "{:04x}:{:04x} is not handled by {}",
                device.vendor_id,
                device.product_id,
                device_registry::DRIVER_NAME
            )));
        }

        // Registration can block on the input subsystem; build outside the lock
        let id = self.sessions.write().reserve();
        let built = DeviceSession::attach(
            id,
            bus,
            device,
            interface,
            self.resolver.as_ref(),
            self.backend.as_ref(),
            &self.config,
        );

        let mut sessions = self.sessions.write();
        match built {
            Ok(session) => {
                sessions.fill(id, Arc::new(session));
                debug!("Registered session {}", id);
                Ok(id)
            }
            Err(e) => {
                sessions.release(id);
                Err(e)
            }
        }
    }

    pub fn open(&self, id: SessionId) -> Result<(), DriverError> {
        self.session(id)?.open()
    }

    pub fn close(&self, id: SessionId) -> Result<(), DriverError> {
        self.session(id)?.close();
        Ok(())
    }

    /// Unbind a device: waits for its read to finish, then forgets the session
    pub async fn detach(&self, id: SessionId) -> Result<(), DriverError> {
        let session = self.session(id)?;
        session.detach().await;
        self.sessions.write().remove(id);
        debug!("Removed session {}", id);
        Ok(())
    }

    /// Detach every session, carrying on past failures. Returns how many were detached.
    pub async fn shutdown(&self) -> usize {
        let mut detached = 0;
        for (id, _) in self.sessions() {
            match self.detach(id).await {
                Ok(()) => detached += 1,
                Err(e) => warn!("Failed to detach session {}: {}", id, e),
            }
        }
        info!("Detached {} session(s)", detached);
        detached
    }

    /// Route one completion to its session
    pub fn dispatch(&self, completion: Completion) -> Result<CompletionOutcome, DriverError> {
        let session = self.session(completion.session)?;
        match session.handle_completion(completion) {
            CompletionOutcome::Failed(e) => Err(e),
            outcome => Ok(outcome),
        }
    }

    /// Dispatch completions until every bus has dropped its sender
    pub async fn run(&self, mut completions: CompletionReceiver) {
        while let Some(completion) = completions.recv().await {
            match self.dispatch(completion) {
                Ok(_) => {}
                Err(DriverError::UnknownSession(id)) => {
                    debug!("Dropping completion for unknown session {}", id);
                }
                Err(e) => warn!("Completion handling failed: {}", e),
            }
        }
        info!("Completion channel closed, dispatcher exiting");
    }

    pub fn session(&self, id: SessionId) -> Result<Arc<DeviceSession>, DriverError> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DriverError::UnknownSession(id.to_string()))
    }

    /// Snapshot of all attached sessions
    pub fn sessions(&self) -> Vec<(SessionId, Arc<DeviceSession>)> {
        self.sessions
            .read()
            .iter()
            .map(|(id, s)| (id, Arc::clone(s)))
            .collect()
    }
}
