//! Transfer cycle controller
//!
//! Keeps exactly one interrupt read in flight per session while the device is
//! open, and turns each completion into a resubmission or a clean stop.
//!
//! ```text
//!            start()                 cancel()
//!   Idle ─────────────► Armed ─────────────────► Cancelling
//!    ▲                  │  ▲ │                        │
//!    │   Success /      │  └─┘ re-issue             │ terminal completion
//!    │   TransientError │                           ▼
//!    │                  └── Cancelled / DeviceGone ─► Stopped ──► start()
//! ```
//!
//! The buffer is owned by the cycle while quiescent (`Idle`/`Stopped`) and by
//! the bus while a read is outstanding.

use tracing::{debug, info, warn};

use crate::buffer::ReportBuffer;
use crate::bus::{Bus, ReadRequest, SubmitError};
use crate::error::DriverError;
use crate::registry::SessionId;
use crate::report::{self, EventSet, REPORT_MIN_LEN};
use crate::sink::InputSink;
use crate::types::{Completion, InterruptEndpoint, SessionConfig, TransferHandle, TransferStatus};

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Attached, no read submitted yet
    Idle,
    /// One read outstanding
    Armed,
    /// Cancellation requested, waiting for the terminal completion
    Cancelling,
    /// No read outstanding; cancelled, device gone, or resubmission failed
    Stopped,
}

impl CycleState {
    /// No read references the buffer
    pub fn is_quiescent(self) -> bool {
        matches!(self, CycleState::Idle | CycleState::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::Armed => "armed",
            CycleState::Cancelling => "cancelling",
            CycleState::Stopped => "stopped",
        }
    }
}

/// What handling one completion did
#[derive(Debug)]
pub enum CompletionOutcome {
    /// Report decoded and emitted; read re-issued
    Delivered(EventSet),
    /// Fault or short report skipped; read re-issued
    Retried,
    /// Cancellation finished while a restart was pending; read re-issued
    Restarted,
    /// Terminal completion; no read outstanding
    Stopped,
    /// Re-issue failed or retry limit hit; cycle stopped
    Failed(DriverError),
    /// Nothing was outstanding for this completion
    Ignored,
}

/// Per-session read cycle
pub struct TransferCycle {
    session: SessionId,
    endpoint: InterruptEndpoint,
    state: CycleState,
    /// Present iff quiescent
    buffer: Option<ReportBuffer>,
    in_flight: Option<TransferHandle>,
    /// `start()` arrived while cancelling
    restart_pending: bool,
    consecutive_faults: u32,
    retry_limit: Option<u32>,
    debug: bool,
}

impl TransferCycle {
    pub fn new(
        session: SessionId,
        endpoint: InterruptEndpoint,
        buffer: ReportBuffer,
        config: &SessionConfig,
    ) -> Self {
        Self {
            session,
            endpoint,
            state: CycleState::Idle,
            buffer: Some(buffer),
            in_flight: None,
            restart_pending: false,
            consecutive_faults: 0,
            retry_limit: config.transient_retry_limit,
            debug: config.debug,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Handle of the outstanding read, if any
    pub fn in_flight(&self) -> Option<TransferHandle> {
        self.in_flight
    }

    /// Whether the session currently owns the buffer
    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Arm the first read.
    ///
    /// Accepted while quiescent. While a cancellation is still in flight the
    /// restart is deferred to the terminal completion.
    pub fn start(&mut self, bus: &dyn Bus) -> Result<(), DriverError> {
        match self.state {
            CycleState::Idle | CycleState::Stopped => {
                self.consecutive_faults = 0;
                self.submit(bus)
            }
            CycleState::Cancelling => {
                debug!("Session {} restart deferred until cancel completes", self.session);
                self.restart_pending = true;
                Ok(())
            }
            CycleState::Armed => Err(DriverError::InvalidState {
                operation: "start",
                state: self.state.as_str(),
            }),
        }
    }

    /// Request cancellation of the outstanding read. No-op unless armed.
    pub fn cancel(&mut self, bus: &dyn Bus) {
        self.restart_pending = false;
        if self.state != CycleState::Armed {
            return;
        }
        if let Some(handle) = self.in_flight {
            debug!("Session {} cancelling transfer {:?}", self.session, handle);
            bus.cancel(handle);
        }
        self.state = CycleState::Cancelling;
    }

    /// Classify one completion and re-arm or stop.
    pub fn on_completion(
        &mut self,
        completion: Completion,
        bus: &dyn Bus,
        sink: Option<&mut (dyn InputSink + '_)>,
    ) -> CompletionOutcome {
        let Completion {
            handle,
            status,
            buffer,
            ..
        } = completion;

        if self.in_flight != Some(handle) {
            warn!(
                "Session {} got completion for {:?} while {} (outstanding {:?})",
                self.session,
                handle,
                self.state.as_str(),
                self.in_flight
            );
            if self.buffer.is_none() && self.in_flight.is_none() {
                self.buffer = Some(buffer);
            }
            return CompletionOutcome::Ignored;
        }

        self.in_flight = None;
        self.buffer = Some(buffer);

        if self.state == CycleState::Cancelling {
            if self.restart_pending {
                self.restart_pending = false;
                self.consecutive_faults = 0;
                return match self.submit(bus) {
                    Ok(()) => CompletionOutcome::Restarted,
                    Err(e) => CompletionOutcome::Failed(e),
                };
            }
            debug!("Session {} stopped after cancel ({:?})", self.session, status);
            self.state = CycleState::Stopped;
            return CompletionOutcome::Stopped;
        }

        match status {
            TransferStatus::Success { actual_len } if actual_len >= REPORT_MIN_LEN => {
                self.consecutive_faults = 0;
                let events = self.decode_current();
                if let Some(sink) = sink {
                    if let Err(e) = sink.emit(&events) {
                        warn!("Session {} failed to emit events: {}", self.session, e);
                    }
                }
                match self.submit(bus) {
                    Ok(()) => CompletionOutcome::Delivered(events),
                    Err(e) => CompletionOutcome::Failed(e),
                }
            }
            TransferStatus::Success { actual_len } => {
                debug!(
                    "Session {} short report ({} bytes), skipping",
                    self.session, actual_len
                );
                self.retry(bus)
            }
            TransferStatus::TransientError(reason) => {
                debug!("Session {} transfer fault: {}", self.session, reason);
                self.retry(bus)
            }
            TransferStatus::Cancelled | TransferStatus::DeviceGone => {
                debug!("Session {} transfer ended: {:?}", self.session, status);
                self.state = CycleState::Stopped;
                CompletionOutcome::Stopped
            }
        }
    }

    /// Give the buffer up for good (detach). Only possible while quiescent.
    pub fn release_buffer(&mut self) -> Option<ReportBuffer> {
        if self.state.is_quiescent() {
            self.buffer.take()
        } else {
            None
        }
    }

    fn decode_current(&self) -> EventSet {
        let Some(buffer) = self.buffer.as_ref() else {
            return EventSet::default();
        };
        let events = report::decode(buffer.report());
        if self.debug {
            info!(
                "topgun {} data: {:02X?} -> {:?}",
                self.session,
                buffer.received(),
                events
            );
        }
        events
    }

    fn retry(&mut self, bus: &dyn Bus) -> CompletionOutcome {
        self.consecutive_faults += 1;
        if let Some(limit) = self.retry_limit {
            if self.consecutive_faults > limit {
                self.state = CycleState::Stopped;
                return CompletionOutcome::Failed(DriverError::DeviceUnavailable(format!(
                    "{} consecutive transfer faults",
                    self.consecutive_faults
                )));
            }
        }
        match self.submit(bus) {
            Ok(()) => CompletionOutcome::Retried,
            Err(e) => CompletionOutcome::Failed(e),
        }
    }

    fn submit(&mut self, bus: &dyn Bus) -> Result<(), DriverError> {
        let buffer = self.buffer.take().ok_or(DriverError::InvalidState {
            operation: "submit",
            state: "buffer in flight",
        })?;

        let request = ReadRequest {
            session: self.session,
            endpoint: self.endpoint,
            buffer,
        };

        match bus.submit_read(request) {
            Ok(handle) => {
                self.in_flight = Some(handle);
                self.state = CycleState::Armed;
                Ok(())
            }
            Err(SubmitError { buffer, error }) => {
                self.buffer = Some(buffer);
                self.state = CycleState::Stopped;
                Err(DriverError::DeviceUnavailable(error.to_string()))
            }
        }
    }
}
