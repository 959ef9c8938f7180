//! Chained open and close sequences.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::support::{DispatchEvent, Harness, WAIT};
use crate::error::{ServiceError, TransportOperation, XfsErrorCode};
use crate::event::RawResult;
use crate::future::XfsFuture;
use crate::message::MessageKind;
use crate::reporter::DropReason;
use crate::service::ServiceKind;
use crate::transport::OpenParams;

#[fixture]
fn harness() -> Harness {
    Harness::manual()
}

#[rstest]
fn open_resolves_only_after_registration(harness: Harness) {
    let open = harness.begin_open("CashDispenser");
    let service_id = open.service_id();
    assert!(!open.is_done());
    assert_eq!(harness.dispatcher.open_services(), vec![service_id]);
    assert_eq!(harness.dispatcher.pending_opens(), 1);

    let open_handle = harness.complete(MessageKind::OpenComplete, service_id, open.request_id());
    let register =
        harness
            .transport
            .wait_for_request(TransportOperation::Register, service_id, WAIT);
    assert!(
        open.get_timeout(Duration::from_millis(50)).is_err(),
        "open must wait for the registration"
    );

    let register_handle = harness.complete(MessageKind::RegisterComplete, service_id, register);
    let service = open.get_timeout(WAIT).expect("open resolves");

    assert_eq!(service.id(), service_id);
    assert_eq!(service.kind(), ServiceKind::Cdm);
    assert_eq!(open.request_id(), register);
    assert!(open.is_done());
    assert!(
        harness
            .transport
            .wait_for_freed(&[open_handle, register_handle], WAIT)
    );
    assert_eq!(harness.dispatcher.pending_opens(), 0);
}

#[rstest]
fn failed_opens_skip_registration_and_leave_the_routing_table(harness: Harness) {
    let open = harness.begin_open("Missing");
    let service_id = open.service_id();
    let handle = harness.deliver(
        MessageKind::OpenComplete,
        RawResult::completion(service_id, open.request_id()).with_error_code(-43),
    );

    let error = open.get_timeout(WAIT).expect_err("open fails");
    assert!(
        matches!(
            &error,
            ServiceError::Completion(failure) if failure.code() == XfsErrorCode::ServiceNotFound
        ),
        "unexpected error {error:?}"
    );
    assert!(harness.transport.wait_for_freed(&[handle], WAIT));
    assert!(harness.dispatcher.open_services().is_empty());
    assert!(
        !harness
            .transport
            .operations()
            .contains(&TransportOperation::Register)
    );
    assert!(
        harness
            .reporter
            .events()
            .contains(&DispatchEvent::ServiceClosed(service_id))
    );
}

#[rstest]
fn refused_open_submissions_leave_nothing_behind(harness: Harness) {
    harness.transport.fail_next(TransportOperation::Open, -43);

    let error = harness
        .dispatcher
        .open(&OpenParams::new("CashDispenser"), ServiceKind::Cdm)
        .expect_err("submission refused");

    assert!(matches!(error, ServiceError::Transport(_)));
    assert_eq!(harness.dispatcher.pending_opens(), 0);
    assert!(harness.dispatcher.open_services().is_empty());
}

#[rstest]
fn unsupported_classes_are_refused_before_the_transport(harness: Harness) {
    let error = harness
        .dispatcher
        .open(&OpenParams::new("Printer"), ServiceKind::Ptr)
        .expect_err("printers are unsupported");

    assert_eq!(
        error,
        ServiceError::UnsupportedKind {
            kind: ServiceKind::Ptr
        }
    );
    assert!(
        !harness
            .transport
            .operations()
            .contains(&TransportOperation::Open)
    );
}

#[rstest]
fn failed_registrations_fail_the_open(harness: Harness) {
    let open = harness.begin_open("CashDispenser");
    let service_id = open.service_id();
    harness.complete(MessageKind::OpenComplete, service_id, open.request_id());
    let register =
        harness
            .transport
            .wait_for_request(TransportOperation::Register, service_id, WAIT);
    harness.deliver(
        MessageKind::RegisterComplete,
        RawResult::completion(service_id, register).with_error_code(-15),
    );

    let error = open.get_timeout(WAIT).expect_err("registration fails");
    assert!(matches!(
        &error,
        ServiceError::Completion(failure) if failure.code() == XfsErrorCode::InternalError
    ));
}

#[rstest]
fn close_deregisters_before_closing(harness: Harness) {
    let service = harness.open_service("CashDispenser");
    let service_id = service.id();

    let close = service.close().expect("close submitted");
    let deregister =
        harness
            .transport
            .wait_for_request(TransportOperation::Deregister, service_id, WAIT);
    assert_eq!(close.request_id(), deregister);
    assert!(
        !harness
            .transport
            .operations()
            .contains(&TransportOperation::Close),
        "close must wait for the deregistration"
    );

    harness.complete(MessageKind::DeregisterComplete, service_id, deregister);
    let close_request =
        harness
            .transport
            .wait_for_request(TransportOperation::Close, service_id, WAIT);
    assert!(
        close.get_timeout(Duration::from_millis(50)).is_err(),
        "close resolved on the deregistration alone"
    );
    harness.complete(MessageKind::CloseComplete, service_id, close_request);

    close.get_timeout(WAIT).expect("close resolves");
    assert_eq!(close.request_id(), close_request);
    assert!(harness.dispatcher.open_services().is_empty());
    assert!(
        harness
            .reporter
            .events()
            .contains(&DispatchEvent::ServiceClosed(service_id))
    );
}

#[rstest]
fn failed_deregistrations_never_close(harness: Harness) {
    let service = harness.open_service("CashDispenser");
    let service_id = service.id();
    let close = service.close().expect("close submitted");
    let deregister =
        harness
            .transport
            .wait_for_request(TransportOperation::Deregister, service_id, WAIT);

    let handle = harness.deliver(
        MessageKind::DeregisterComplete,
        RawResult::completion(service_id, deregister).with_error_code(-14),
    );

    let error = close.get_timeout(WAIT).expect_err("deregistration fails");
    assert!(matches!(
        &error,
        ServiceError::Completion(failure) if failure.code() == XfsErrorCode::HardwareError
    ));
    assert!(harness.transport.wait_for_freed(&[handle], WAIT));
    assert!(
        !harness
            .transport
            .operations()
            .contains(&TransportOperation::Close)
    );
    assert_eq!(harness.dispatcher.open_services(), vec![service_id]);
}

#[rstest]
fn failed_closes_still_retire_the_service(harness: Harness) {
    let service = harness.open_service("CashDispenser");
    let service_id = service.id();
    let close = service.close().expect("close submitted");
    let deregister =
        harness
            .transport
            .wait_for_request(TransportOperation::Deregister, service_id, WAIT);
    harness.complete(MessageKind::DeregisterComplete, service_id, deregister);
    let close_request =
        harness
            .transport
            .wait_for_request(TransportOperation::Close, service_id, WAIT);

    harness.deliver(
        MessageKind::CloseComplete,
        RawResult::completion(service_id, close_request).with_error_code(-14),
    );

    let error = close.get_timeout(WAIT).expect_err("close fails");
    assert!(matches!(
        &error,
        ServiceError::Completion(failure) if failure.code() == XfsErrorCode::HardwareError
    ));
    assert!(harness.dispatcher.open_services().is_empty());
    let late = harness.deliver(MessageKind::ServiceEvent, RawResult::event(service_id, 0));
    assert!(harness.transport.wait_for_freed(&[late], WAIT));
    assert_eq!(
        harness.reporter.drops(DropReason::UnknownService),
        vec![(MessageKind::ServiceEvent, service_id)]
    );
}

#[rstest]
fn cancelling_an_open_targets_the_request_in_flight(harness: Harness) {
    let open = harness.begin_open("CashDispenser");
    let service_id = open.service_id();
    let open_request = open.request_id();

    open.cancel().expect("cancel accepted");
    assert_eq!(harness.transport.cancelled(), vec![open_request]);

    harness.deliver(
        MessageKind::OpenComplete,
        RawResult::completion(service_id, open_request).with_error_code(-4),
    );
    let error = open.get_timeout(WAIT).expect_err("open cancelled");
    assert!(error.is_canceled());
}
