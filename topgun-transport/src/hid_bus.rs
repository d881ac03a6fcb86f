//! hidapi bus backend
//!
//! A hidraw node gives access to the interrupt-IN pipe through blocking
//! reads. Each opened device gets a reader thread that serves queued read
//! requests one at a time and sends one completion per request.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use hidapi::{HidDevice, HidError};
use tracing::{debug, warn};

use crate::bus::{Bus, BusError, CompletionSender, ReadRequest, SubmitError};
use crate::types::{Completion, TransferHandle, TransferStatus};

/// Default read timeout (ms); bounds how long a cancel or shutdown waits
pub const DEFAULT_READ_TIMEOUT_MS: i32 = 10;

/// Pause after a failed read before completing it
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// No read is being cancelled
const NO_CANCEL: u64 = 0;

type QueuedRead = (TransferHandle, ReadRequest);

/// Blocking interrupt-IN reads against an opened device
pub trait ReportReader: Send {
    /// Read one report, waiting at most `timeout_ms`. `Ok(0)` means nothing arrived.
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, HidError>;
}

impl ReportReader for HidDevice {
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, HidError> {
        HidDevice::read_timeout(self, buf, timeout_ms)
    }
}

/// Bus backed by one opened hidraw device
pub struct HidBus {
    requests: Option<mpsc::Sender<QueuedRead>>,
    cancel_target: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    next_handle: AtomicU64,
    worker: Option<JoinHandle<()>>,
    path: String,
}

impl HidBus {
    /// Start the reader thread for an opened device
    pub fn new<R: ReportReader + 'static>(
        device: R,
        path: String,
        completions: CompletionSender,
        read_timeout_ms: i32,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let cancel_target = Arc::new(AtomicU64::new(NO_CANCEL));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let cancel_target = cancel_target.clone();
            let shutdown = shutdown.clone();
            let name = path.clone();
            std::thread::Builder::new()
                .name("topgun-reader".into())
                .spawn(move || {
                    run_read_worker(
                        device,
                        rx,
                        completions,
                        cancel_target,
                        shutdown,
                        read_timeout_ms.max(1),
                        name,
                    );
                })
                .expect("Failed to spawn HID reader thread")
        };

        Self {
            requests: Some(tx),
            cancel_target,
            shutdown,
            next_handle: AtomicU64::new(1),
            worker: Some(worker),
            path,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Bus for HidBus {
    fn submit_read(&self, request: ReadRequest) -> Result<TransferHandle, SubmitError> {
        let Some(requests) = self.requests.as_ref() else {
            return Err(SubmitError {
                buffer: request.buffer,
                error: BusError::NoDevice,
            });
        };
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(SubmitError {
                buffer: request.buffer,
                error: BusError::NoDevice,
            });
        }

        let handle = TransferHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        match requests.send((handle, request)) {
            Ok(()) => Ok(handle),
            Err(mpsc::SendError((_, request))) => Err(SubmitError {
                buffer: request.buffer,
                error: BusError::NoDevice,
            }),
        }
    }

    fn cancel(&self, handle: TransferHandle) {
        self.cancel_target.store(handle.0, Ordering::SeqCst);
    }
}

impl Drop for HidBus {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.requests.take();
        debug!("HidBus {} dropped, stopping reader thread", self.path);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("HID reader thread for {} panicked", self.path);
            }
        }
    }
}

/// Map a failed read to a completion status
pub fn classify_read_error(error: &HidError) -> TransferStatus {
    let msg = error.to_string();
    if is_device_gone(&msg) {
        TransferStatus::DeviceGone
    } else {
        TransferStatus::TransientError(msg)
    }
}

fn is_device_gone(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("disconnected") || msg.contains("no such device") || msg.contains("enodev")
}

fn run_read_worker<R: ReportReader>(
    device: R,
    requests: mpsc::Receiver<QueuedRead>,
    completions: CompletionSender,
    cancel_target: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    read_timeout_ms: i32,
    name: String,
) {
    debug!("HID reader for {} started", name);

    // Ends once the bus drops its sender; anything still queued drains as DeviceGone
    while let Ok((handle, mut request)) = requests.recv() {
        let status = loop {
            if shutdown.load(Ordering::Relaxed) {
                break TransferStatus::DeviceGone;
            }
            if cancel_target.load(Ordering::SeqCst) == handle.0 {
                break TransferStatus::Cancelled;
            }

            match device.read_timeout(request.buffer.as_mut_slice(), read_timeout_ms) {
                Ok(0) => {}
                Ok(len) => {
                    request.buffer.set_actual_len(len);
                    break TransferStatus::Success { actual_len: len };
                }
                Err(e) => {
                    let status = classify_read_error(&e);
                    if let TransferStatus::TransientError(_) = status {
                        warn!("HID read error on {}: {}", name, e);
                        std::thread::sleep(ERROR_BACKOFF);
                    }
                    break status;
                }
            }
        };

        if status == TransferStatus::DeviceGone {
            shutdown.store(true, Ordering::SeqCst);
        }
        let completion = Completion {
            session: request.session,
            handle,
            status,
            buffer: request.buffer,
        };
        if completions.send(completion).is_err() {
            debug!("Completion receiver for {} closed", name);
            break;
        }
    }

    debug!("HID reader for {} exiting", name);
}
