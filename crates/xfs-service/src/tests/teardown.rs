//! Shutdown, abandoned requests and worker failures.

use rstest::rstest;

use super::support::{DispatchEvent, Harness, WAIT};
use crate::error::{ServiceError, TransportOperation};
use crate::event::RawResult;
use crate::future::XfsFuture;
use crate::message::MessageKind;
use crate::queue::LoopError;
use crate::reporter::DropReason;
use crate::service::ServiceKind;
use crate::transport::OpenParams;

#[rstest]
fn stop_closes_services_and_releases_every_result() {
    let harness = Harness::auto_completing();
    let first = harness.open_service("CashDispenser1");
    let second = harness.open_service("CashDispenser2");

    harness.dispatcher.stop().expect("clean stop");

    assert!(harness.dispatcher.open_services().is_empty());
    for service in [&first, &second] {
        harness
            .transport
            .wait_for_request(TransportOperation::Close, service.id(), WAIT);
    }
    let issued = harness.transport.issued();
    assert!(harness.transport.wait_for_freed(&issued, WAIT));
    assert!(harness.transport.double_frees().is_empty());
    let events = harness.reporter.events();
    assert!(events.contains(&DispatchEvent::ServiceClosed(first.id())));
    assert!(events.contains(&DispatchEvent::ServiceClosed(second.id())));
    assert!(events.contains(&DispatchEvent::WorkerStopped("xfs-dispatch".to_owned())));
}

#[rstest]
fn stop_continues_past_close_failures() {
    let harness = Harness::auto_completing();
    let service = harness.open_service("CashDispenser");
    harness.transport.fail_next(TransportOperation::Deregister, -15);

    harness.dispatcher.stop().expect("clean stop");

    assert!(harness.dispatcher.open_services().is_empty());
    assert!(service.dispatcher().is_stopped());
    assert!(
        harness
            .reporter
            .events()
            .contains(&DispatchEvent::ServiceClosed(service.id()))
    );
}

#[rstest]
fn results_delivered_after_stop_are_released() {
    let harness = Harness::auto_completing();
    let service = harness.open_service("CashDispenser");
    harness.dispatcher.stop().expect("clean stop");

    let handle = harness.deliver(MessageKind::ServiceEvent, RawResult::event(service.id(), 304));

    assert!(harness.transport.wait_for_freed(&[handle], WAIT));
    assert_eq!(
        harness.reporter.drops(DropReason::DispatcherStopped),
        vec![(MessageKind::ServiceEvent, service.id())]
    );
}

#[rstest]
fn submissions_after_stop_are_refused() {
    let harness = Harness::auto_completing();
    harness.dispatcher.stop().expect("clean stop");

    let error = harness
        .dispatcher
        .open(&OpenParams::new("CashDispenser"), ServiceKind::Cdm)
        .expect_err("dispatcher stopped");

    assert!(matches!(error, ServiceError::Stopped { .. }));
    assert!(
        !harness
            .transport
            .operations()
            .contains(&TransportOperation::Open)
    );
}

#[rstest]
fn stopping_a_service_fails_its_pending_requests() {
    let harness = Harness::manual();
    let service = harness.open_service("CashDispenser");
    let lock = service.lock(None).expect("lock submitted");

    service.dispatcher().stop().expect("clean stop");

    assert_eq!(
        lock.get_timeout(WAIT),
        Err(ServiceError::Stopped {
            service_id: service.id()
        })
    );
    assert!(matches!(
        service.unlock(),
        Err(ServiceError::Stopped { .. })
    ));
}

#[rstest]
fn unknown_system_events_end_the_service_worker() {
    let harness = Harness::manual();
    let service = harness.open_service("CashDispenser");
    let lock = service.lock(None).expect("lock submitted");

    let handle = harness.deliver(MessageKind::SystemEvent, RawResult::event(service.id(), 99));

    assert!(harness.transport.wait_for_freed(&[handle], WAIT));
    assert!(matches!(
        lock.get_timeout(WAIT),
        Err(ServiceError::Stopped { .. })
    ));
    let worker = format!("xfs-service-{}", service.id());
    assert_eq!(
        service.dispatcher().stop(),
        Err(LoopError::WorkerPanicked { worker })
    );
}
