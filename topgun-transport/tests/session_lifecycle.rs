//! Integration tests for the session lifecycle.
//!
//! These drive a `Driver` against a scripted bus and a recording input
//! backend: attach validation, open/close reference counting, completion
//! handling and detach ordering.

mod common;

use std::sync::{mpsc, Arc};
use std::time::Duration;

use common::{topgun_descriptor, MockBus, RecordingBackend, IDLE_REPORT, REPORT};
use topgun_transport::{
    completion_channel, BusError, CompletionOutcome, CycleState, DescriptorNameResolver,
    DeviceDescriptor, Driver, DriverError, EndpointDescriptor, InterfaceDescriptor,
    SessionConfig, SessionId, TransferStatus,
};

fn driver_with(backend: &Arc<RecordingBackend>, config: SessionConfig) -> Driver {
    Driver::new(
        backend.clone(),
        Arc::new(DescriptorNameResolver),
        config,
    )
}

fn setup() -> (Driver, Arc<MockBus>, Arc<RecordingBackend>) {
    let backend = RecordingBackend::new();
    let driver = driver_with(&backend, SessionConfig::default());
    (driver, MockBus::new(), backend)
}

fn interrupt_in() -> InterfaceDescriptor {
    InterfaceDescriptor::hid_interrupt_in(8)
}

fn attach(driver: &Driver, bus: &Arc<MockBus>) -> SessionId {
    driver
        .attach(bus.clone(), &topgun_descriptor(), &interrupt_in())
        .expect("attach failed")
}

// ── Attach ──

#[test]
fn attach_creates_idle_session() {
    let (driver, bus, backend) = setup();
    let id = attach(&driver, &bus);

    let session = driver.session(id).unwrap();
    assert_eq!(session.state(), CycleState::Idle);
    assert_eq!(session.open_count(), 0);
    assert_eq!(session.identity().name, "EMS LCD TopGun");
    assert_eq!(session.identity().phys, "usb-0000:00:14.0-2/input0");
    assert_eq!(bus.submitted(), 0);
    assert_eq!(backend.registered(), 1);
}

#[test]
fn attach_without_strings_uses_generated_name() {
    let (driver, bus, backend) = setup();
    let device = DeviceDescriptor {
        manufacturer: None,
        product: None,
        ..topgun_descriptor()
    };
    driver.attach(bus, &device, &interrupt_in()).unwrap();

    assert_eq!(backend.registered_identity(0).name, "EMS LCD TopGun 0b9a:016a");
}

#[test]
fn attach_rejects_wrong_endpoint_shapes() {
    let (driver, bus, backend) = setup();
    let ep = |address, attributes| EndpointDescriptor {
        address,
        attributes,
        max_packet_size: 8,
        interval: 10,
    };

    let shapes = [
        InterfaceDescriptor::default(),
        InterfaceDescriptor {
            endpoints: vec![ep(0x81, 0x03), ep(0x82, 0x03)],
        },
        InterfaceDescriptor {
            endpoints: vec![ep(0x01, 0x03)],
        },
        InterfaceDescriptor {
            endpoints: vec![ep(0x81, 0x02)],
        },
    ];

    for iface in shapes {
        let result = driver.attach(bus.clone(), &topgun_descriptor(), &iface);
        assert!(
            matches!(result, Err(DriverError::UnsupportedDevice(_))),
            "{iface:?} accepted"
        );
    }
    assert!(driver.sessions().is_empty());
    assert_eq!(backend.registered(), 0);
}

#[test]
fn attach_rejects_other_devices() {
    let (driver, bus, _backend) = setup();
    let device = DeviceDescriptor {
        product_id: 0x016B,
        ..topgun_descriptor()
    };
    assert!(matches!(
        driver.attach(bus, &device, &interrupt_in()),
        Err(DriverError::UnsupportedDevice(_))
    ));
}

#[test]
fn attach_register_failure_binds_nothing() {
    let (driver, bus, backend) = setup();
    backend.fail_next_register();

    assert!(matches!(
        driver.attach(bus.clone(), &topgun_descriptor(), &interrupt_in()),
        Err(DriverError::Sink(_))
    ));
    assert!(driver.sessions().is_empty());

    // The slot is reusable afterwards
    attach(&driver, &bus);
    assert_eq!(driver.sessions().len(), 1);
}

#[test]
fn slow_registration_does_not_block_dispatch() {
    let (driver, bus, backend) = setup();
    let driver = Arc::new(driver);
    let first = attach(&driver, &bus);
    driver.open(first).unwrap();

    let gate = backend.hold_next_register();
    let attaching = {
        let driver = Arc::clone(&driver);
        let bus = MockBus::new();
        std::thread::spawn(move || attach(&driver, &bus))
    };
    gate.entered.recv().unwrap();

    // The second attach is parked inside register_device
    let (done_tx, done_rx) = mpsc::channel();
    {
        let driver = Arc::clone(&driver);
        let completion = bus.complete_report(&REPORT);
        std::thread::spawn(move || {
            let _ = done_tx.send(driver.dispatch(completion).is_ok());
        });
    }
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    assert_eq!(driver.sessions().len(), 1);
    assert_eq!(backend.frames().len(), 1);

    gate.release.send(()).unwrap();
    let second = attaching.join().unwrap();
    assert_ne!(second, first);
    assert_eq!(driver.sessions().len(), 2);
}

// ── Open / close ──

#[test]
fn open_arms_one_read() {
    let (driver, bus, _backend) = setup();
    let id = attach(&driver, &bus);

    driver.open(id).unwrap();
    assert_eq!(driver.session(id).unwrap().state(), CycleState::Armed);
    assert_eq!(bus.submitted(), 1);
    assert_eq!(bus.outstanding(), 1);
}

#[test]
fn open_close_reference_counting() {
    let (driver, bus, _backend) = setup();
    let id = attach(&driver, &bus);
    let session = driver.session(id).unwrap();

    const N: u32 = 4;
    for _ in 0..N {
        driver.open(id).unwrap();
    }
    assert_eq!(bus.submitted(), 1);
    assert_eq!(session.open_count(), N);

    for _ in 0..N - 1 {
        driver.close(id).unwrap();
    }
    assert_eq!(session.state(), CycleState::Armed);
    assert!(bus.cancelled().is_empty());

    driver.close(id).unwrap();
    assert_eq!(bus.cancelled().len(), 1);
    assert_eq!(session.state(), CycleState::Cancelling);

    // Extra close is ignored
    driver.close(id).unwrap();
    assert_eq!(bus.cancelled().len(), 1);
    assert_eq!(session.open_count(), 0);
}

#[test]
fn open_failure_rolls_back() {
    let (driver, bus, _backend) = setup();
    let id = attach(&driver, &bus);
    bus.refuse(Some(BusError::ResourceExhausted("no memory".into())));

    assert!(matches!(
        driver.open(id),
        Err(DriverError::DeviceUnavailable(_))
    ));
    let session = driver.session(id).unwrap();
    assert_eq!(session.open_count(), 0);
    assert_eq!(session.state(), CycleState::Stopped);

    bus.refuse(None);
    driver.open(id).unwrap();
    assert_eq!(session.state(), CycleState::Armed);
}

#[test]
fn reopen_after_cancel_completes() {
    let (driver, bus, _backend) = setup();
    let id = attach(&driver, &bus);

    driver.open(id).unwrap();
    driver.close(id).unwrap();
    driver.dispatch(bus.complete_cancelled()).unwrap();
    assert_eq!(driver.session(id).unwrap().state(), CycleState::Stopped);

    driver.open(id).unwrap();
    assert_eq!(driver.session(id).unwrap().state(), CycleState::Armed);
    assert_eq!(bus.outstanding(), 1);
}

#[test]
fn reopen_while_cancelling_restarts_after_cancel() {
    let (driver, bus, _backend) = setup();
    let id = attach(&driver, &bus);

    driver.open(id).unwrap();
    driver.close(id).unwrap();
    driver.open(id).unwrap();
    assert_eq!(bus.outstanding(), 1);

    let outcome = driver.dispatch(bus.complete_cancelled()).unwrap();
    assert!(matches!(outcome, CompletionOutcome::Restarted));
    assert_eq!(driver.session(id).unwrap().state(), CycleState::Armed);
    assert_eq!(bus.outstanding(), 1);
}

// ── Completions ──

#[test]
fn end_to_end_report_delivery() {
    let (driver, bus, backend) = setup();
    let id = attach(&driver, &bus);
    assert_eq!(driver.session(id).unwrap().state(), CycleState::Idle);

    driver.open(id).unwrap();
    assert_eq!(bus.outstanding(), 1);

    let outcome = driver.dispatch(bus.complete_report(&REPORT[..5])).unwrap();
    assert!(matches!(outcome, CompletionOutcome::Delivered(_)));

    let frames = backend.frames();
    assert_eq!(frames.len(), 1);
    let frame = frames[0];
    assert!(frame.trigger); // bit 0x20 of 0x5F is clear
    assert!(!frame.select);
    assert!(frame.start); // bit 0x80 of 0x5F is clear
    assert!(frame.a);
    assert!(!frame.b);
    assert!(!frame.c);
    assert_eq!(frame.stick_x, 564);
    assert_eq!(frame.stick_y, 128);
    assert_eq!((frame.pad_x, frame.pad_y), (0, 0));

    // Re-armed for the next report
    assert_eq!(bus.outstanding(), 1);

    driver.close(id).unwrap();
    assert_eq!(bus.cancelled().len(), 1);
    driver.dispatch(bus.complete_cancelled()).unwrap();
    assert_eq!(bus.outstanding(), 0);
}

#[test]
fn every_report_is_emitted_in_order() {
    let (driver, bus, backend) = setup();
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();

    driver.dispatch(bus.complete_report(&REPORT)).unwrap();
    driver.dispatch(bus.complete_report(&IDLE_REPORT)).unwrap();
    driver.dispatch(bus.complete_report(&REPORT)).unwrap();

    let frames = backend.frames();
    assert_eq!(frames.len(), 3);
    assert!(frames[0].a);
    assert!(!frames[1].a);
    assert_eq!(frames[1].stick_x, 0xA0);
    assert_eq!(frames[1].stick_y, 0x20);
    assert_eq!(frames[0], frames[2]);
}

#[test]
fn transient_errors_are_retried_silently() {
    let (driver, bus, backend) = setup();
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();

    for _ in 0..20 {
        let outcome = driver
            .dispatch(bus.complete(TransferStatus::TransientError("stall".into()), &[]))
            .unwrap();
        assert!(matches!(outcome, CompletionOutcome::Retried));
    }
    assert!(backend.frames().is_empty());
    assert_eq!(bus.submitted(), 21);
    assert_eq!(driver.session(id).unwrap().state(), CycleState::Armed);
}

#[test]
fn short_report_is_skipped() {
    let (driver, bus, backend) = setup();
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();

    let outcome = driver.dispatch(bus.complete_report(&REPORT[..4])).unwrap();
    assert!(matches!(outcome, CompletionOutcome::Retried));
    assert!(backend.frames().is_empty());
    assert_eq!(bus.outstanding(), 1);
}

#[test]
fn retry_limit_stops_the_cycle() {
    let backend = RecordingBackend::new();
    let driver = driver_with(
        &backend,
        SessionConfig {
            debug: false,
            transient_retry_limit: Some(3),
        },
    );
    let bus = MockBus::new();
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();

    for _ in 0..3 {
        driver
            .dispatch(bus.complete(TransferStatus::TransientError("crc".into()), &[]))
            .unwrap();
    }
    let result = driver.dispatch(bus.complete(TransferStatus::TransientError("crc".into()), &[]));
    assert!(matches!(result, Err(DriverError::DeviceUnavailable(_))));

    let session = driver.session(id).unwrap();
    assert_eq!(session.state(), CycleState::Stopped);
    assert!(session.fault().is_some());
    assert_eq!(bus.outstanding(), 0);
}

#[test]
fn device_gone_stops_without_resubmit() {
    let (driver, bus, _backend) = setup();
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();

    let outcome = driver
        .dispatch(bus.complete(TransferStatus::DeviceGone, &[]))
        .unwrap();
    assert!(matches!(outcome, CompletionOutcome::Stopped));
    assert_eq!(bus.outstanding(), 0);
    assert_eq!(bus.submitted(), 1);

    // Still attached until detach
    let session = driver.session(id).unwrap();
    assert_eq!(session.state(), CycleState::Stopped);
    assert!(session.fault().is_none());
}

#[test]
fn resubmit_failure_is_recorded() {
    let (driver, bus, backend) = setup();
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();

    let completion = bus.complete_report(&REPORT);
    bus.refuse(Some(BusError::NoDevice));
    let result = driver.dispatch(completion);

    assert!(matches!(result, Err(DriverError::DeviceUnavailable(_))));
    // The report itself was still delivered
    assert_eq!(backend.frames().len(), 1);

    let session = driver.session(id).unwrap();
    assert_eq!(session.state(), CycleState::Stopped);
    assert!(session.fault().unwrap().contains("no such device"));
}

#[test]
fn completion_for_unknown_session_is_rejected() {
    let (driver, bus, _backend) = setup();
    let other = driver_with(&RecordingBackend::new(), SessionConfig::default());
    let id = attach(&other, &bus);
    other.open(id).unwrap();

    // Valid id in `other`, never attached to `driver`
    let result = driver.dispatch(bus.complete_report(&REPORT));
    assert!(matches!(result, Err(DriverError::UnknownSession(_))));
}

// ── Detach ──

#[tokio::test]
async fn detach_waits_for_outstanding_read() {
    let (driver, bus, backend) = setup();
    let driver = Arc::new(driver);
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();

    let detaching = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.detach(id).await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(!detaching.is_finished());
    assert_eq!(bus.cancelled().len(), 1);
    assert!(backend.unregistered().is_empty());
    assert!(driver.session(id).is_ok());

    // A report racing the cancel is not emitted
    let outcome = driver.dispatch(bus.complete_report(&REPORT)).unwrap();
    assert!(matches!(outcome, CompletionOutcome::Stopped));

    detaching.await.unwrap().unwrap();
    assert!(backend.frames().is_empty());
    assert_eq!(backend.unregistered(), vec!["usb-0000:00:14.0-2/input0"]);
    assert_eq!(bus.outstanding(), 0);
    assert!(matches!(
        driver.session(id),
        Err(DriverError::UnknownSession(_))
    ));
}

#[tokio::test]
async fn detach_after_close_waits_for_cancel() {
    let (driver, bus, backend) = setup();
    let driver = Arc::new(driver);
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();
    driver.close(id).unwrap();

    let detaching = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.detach(id).await })
    };
    tokio::task::yield_now().await;
    assert!(!detaching.is_finished());

    driver.dispatch(bus.complete_cancelled()).unwrap();
    detaching.await.unwrap().unwrap();

    // close() already requested the cancel
    assert_eq!(bus.cancelled().len(), 1);
    assert_eq!(backend.unregistered().len(), 1);
}

#[tokio::test]
async fn detach_idle_session_returns_immediately() {
    let (driver, bus, backend) = setup();
    let id = attach(&driver, &bus);

    driver.detach(id).await.unwrap();
    assert!(bus.cancelled().is_empty());
    assert_eq!(backend.unregistered().len(), 1);
    assert!(driver.sessions().is_empty());
}

#[tokio::test]
async fn detach_while_open_ignores_open_count() {
    let (driver, bus, backend) = setup();
    let driver = Arc::new(driver);
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();
    driver.open(id).unwrap();
    let session = driver.session(id).unwrap();

    let detaching = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.detach(id).await })
    };
    tokio::task::yield_now().await;

    driver.dispatch(bus.complete_cancelled()).unwrap();
    detaching.await.unwrap().unwrap();

    assert!(session.is_detached());
    assert_eq!(session.open_count(), 0);
    assert!(matches!(
        session.open(),
        Err(DriverError::DeviceUnavailable(_))
    ));
    assert_eq!(backend.unregistered().len(), 1);
}

#[tokio::test]
async fn detach_after_device_gone() {
    let (driver, bus, backend) = setup();
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();
    driver
        .dispatch(bus.complete(TransferStatus::DeviceGone, &[]))
        .unwrap();

    driver.detach(id).await.unwrap();
    assert!(bus.cancelled().is_empty());
    assert_eq!(backend.unregistered().len(), 1);
}

#[tokio::test]
async fn shutdown_detaches_every_session() {
    let (driver, bus, backend) = setup();
    let driver = Arc::new(driver);
    let armed = attach(&driver, &bus);
    let idle_bus = MockBus::new();
    let idle = attach(&driver, &idle_bus);
    driver.open(armed).unwrap();

    let shutdown = {
        let driver = Arc::clone(&driver);
        tokio::spawn(async move { driver.shutdown().await })
    };
    while bus.cancelled().is_empty() {
        tokio::task::yield_now().await;
    }
    assert!(!shutdown.is_finished());
    driver.dispatch(bus.complete_cancelled()).unwrap();

    assert_eq!(shutdown.await.unwrap(), 2);
    assert!(driver.sessions().is_empty());
    assert_eq!(backend.unregistered().len(), 2);
    assert!(driver.session(armed).is_err());
    assert!(driver.session(idle).is_err());
    assert_eq!(idle_bus.submitted(), 0);
}

#[tokio::test]
async fn stale_id_does_not_reach_new_session() {
    let (driver, bus, _backend) = setup();
    let first = attach(&driver, &bus);
    driver.detach(first).await.unwrap();

    let second = attach(&driver, &bus);
    assert_eq!(first.index(), second.index());
    assert_ne!(first, second);

    assert!(matches!(
        driver.open(first),
        Err(DriverError::UnknownSession(_))
    ));
    assert!(matches!(
        driver.detach(first).await,
        Err(DriverError::UnknownSession(_))
    ));
    assert!(driver.session(second).is_ok());
}

#[tokio::test]
async fn run_dispatches_until_senders_drop() {
    let (driver, bus, backend) = setup();
    let driver = Arc::new(driver);
    let id = attach(&driver, &bus);
    driver.open(id).unwrap();

    let (tx, rx) = completion_channel();
    let dispatcher = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.run(rx).await })
    };

    for report in [REPORT, IDLE_REPORT] {
        let before = backend.frames().len();
        tx.send(bus.complete_report(&report)).unwrap();
        while backend.frames().len() == before {
            tokio::task::yield_now().await;
        }
    }
    drop(tx);

    dispatcher.await.unwrap();
    assert_eq!(backend.frames().len(), 2);
    assert_eq!(bus.outstanding(), 1);
}
