//! Routing, ordering and release of delivered results.

use std::sync::Arc;

use rstest::{fixture, rstest};
use serde_json::json;

use super::support::{ChannelListener, DispatchEvent, Harness, WAIT};
use crate::cdm::{CdmMessage, CdmService, CdmServiceListener};
use crate::event::{Payload, RawResult};
use crate::future::XfsFuture;
use crate::ids::{RequestId, ServiceId};
use crate::message::{MessageKind, SystemEventKind};
use crate::reporter::DropReason;

#[fixture]
fn harness() -> Harness {
    Harness::manual()
}

fn service_event(service: ServiceId, message: CdmMessage) -> RawResult {
    RawResult::event(service, message.code())
}

#[rstest]
fn events_for_unknown_services_are_released(harness: Harness) {
    let stray = ServiceId::new(99);
    let handle = harness.deliver(
        MessageKind::ServiceEvent,
        service_event(stray, CdmMessage::SafeDoorOpen),
    );

    assert!(harness.transport.wait_for_freed(&[handle], WAIT));
    assert_eq!(
        harness.reporter.drops(DropReason::UnknownService),
        vec![(MessageKind::ServiceEvent, stray)]
    );
}

#[rstest]
#[case(0x0010)]
#[case(MessageKind::TimerEvent.code())]
fn foreign_messages_stay_with_the_caller(harness: Harness, #[case] code: u32) {
    let (handle, accepted) = harness
        .transport
        .deliver_code(code, RawResult::event(ServiceId::new(1), 0));

    assert!(!accepted);
    assert!(!harness.transport.freed().contains(&handle));
}

#[rstest]
fn completions_are_delivered_at_most_once(harness: Harness) {
    let service = harness.open_service("CashDispenser");
    let service_id = service.id();
    let lock = service.lock(None).expect("lock submitted");

    let first = harness.complete(MessageKind::LockComplete, service_id, lock.request_id());
    let second = harness.complete(MessageKind::LockComplete, service_id, lock.request_id());

    lock.get_timeout(WAIT).expect("lock completes");
    assert!(harness.transport.wait_for_freed(&[first, second], WAIT));
    assert_eq!(
        harness.reporter.drops(DropReason::NoPendingRequest),
        vec![(MessageKind::LockComplete, service_id)]
    );
    assert!(harness.transport.double_frees().is_empty());
}

#[rstest]
fn cancellation_does_not_override_a_successful_completion(harness: Harness) {
    let service = harness.open_service("CashDispenser");
    let lock = service.lock(None).expect("lock submitted");

    lock.cancel().expect("cancel accepted");
    harness.complete(MessageKind::LockComplete, service.id(), lock.request_id());

    assert_eq!(harness.transport.cancelled(), [lock.request_id()]);
    lock.get_timeout(WAIT).expect("lock still completes");
}

#[rstest]
fn events_reach_listeners_in_delivery_order(harness: Harness) {
    let cdm = CdmService::new(harness.open_service("CashDispenser")).expect("cash dispenser");
    let (listener, labels) = ChannelListener::new();
    cdm.add_service_listener(listener);
    let service_id = cdm.id();

    harness.deliver(
        MessageKind::ServiceEvent,
        service_event(service_id, CdmMessage::SafeDoorOpen),
    );
    harness.deliver(
        MessageKind::ServiceEvent,
        service_event(service_id, CdmMessage::ItemsTaken)
            .with_payload(Payload::from_json(&json!("left")).expect("payload")),
    );
    harness.deliver(
        MessageKind::ServiceEvent,
        service_event(service_id, CdmMessage::CountsChanged).with_payload(
            Payload::from_json(&json!({ "cash_unit_numbers": [1, 3] })).expect("payload"),
        ),
    );
    harness.deliver(
        MessageKind::ServiceEvent,
        service_event(service_id, CdmMessage::SafeDoorClosed),
    );

    let received: Vec<String> = (0..4)
        .map(|_| labels.recv_timeout(WAIT).expect("listener notified"))
        .collect();
    assert_eq!(
        received,
        [
            "safe_door_open",
            "items_taken:Left",
            "counts_changed:[1, 3]",
            "safe_door_closed"
        ]
    );
}

#[rstest]
fn a_blocked_listener_only_delays_its_own_service(harness: Harness) {
    let slow = CdmService::new(harness.open_service("Slow")).expect("cash dispenser");
    let fast = CdmService::new(harness.open_service("Fast")).expect("cash dispenser");
    let (slow_listener, slow_labels, release) = ChannelListener::gated();
    let (fast_listener, fast_labels) = ChannelListener::new();
    slow.add_service_listener(slow_listener);
    fast.add_service_listener(fast_listener);

    harness.deliver(
        MessageKind::ServiceEvent,
        service_event(slow.id(), CdmMessage::SafeDoorOpen),
    );
    harness.deliver(
        MessageKind::ServiceEvent,
        service_event(fast.id(), CdmMessage::ItemsPresented),
    );

    assert_eq!(
        fast_labels.recv_timeout(WAIT).expect("fast listener notified"),
        "items_presented"
    );
    assert!(slow_labels.try_recv().is_err(), "slow listener is still held");

    release.send(()).expect("release slow listener");
    assert_eq!(
        slow_labels.recv_timeout(WAIT).expect("slow listener notified"),
        "safe_door_open"
    );
}

struct DoorAlarm;

impl CdmServiceListener for DoorAlarm {
    fn on_safe_door_open(&self) {
        panic!("alarm wiring fault");
    }
}

#[rstest]
fn a_panicking_listener_leaves_the_service_usable(harness: Harness) {
    let cdm = CdmService::new(harness.open_service("CashDispenser")).expect("cash dispenser");
    let (witness, labels) = ChannelListener::new();
    cdm.add_service_listener(witness);
    cdm.add_service_listener(Arc::new(DoorAlarm));
    let service_id = cdm.id();

    let opened = harness.deliver(
        MessageKind::ServiceEvent,
        service_event(service_id, CdmMessage::SafeDoorOpen),
    );
    assert!(harness.transport.wait_for_freed(&[opened], WAIT));

    let lock = cdm.service().lock(None).expect("lock submitted");
    harness.complete(MessageKind::LockComplete, service_id, lock.request_id());
    lock.get_timeout(WAIT).expect("lock completes");
    assert!(!cdm.service().dispatcher().is_stopped());

    harness.deliver(
        MessageKind::ServiceEvent,
        service_event(service_id, CdmMessage::SafeDoorClosed),
    );
    let received: Vec<String> = (0..2)
        .map(|_| labels.recv_timeout(WAIT).expect("listener notified"))
        .collect();
    assert_eq!(received, ["safe_door_open", "safe_door_closed"]);
    assert!(
        harness
            .reporter
            .events()
            .contains(&DispatchEvent::ListenerPanicked {
                message: MessageKind::ServiceEvent,
                service: service_id,
                detail: "alarm wiring fault".to_owned(),
            })
    );
}

#[rstest]
fn removed_listeners_stop_receiving_events(harness: Harness) {
    let cdm = CdmService::new(harness.open_service("CashDispenser")).expect("cash dispenser");
    let (kept, kept_labels) = ChannelListener::new();
    let (removed, removed_labels) = ChannelListener::new();
    cdm.add_service_listener(kept);
    let removed_handle: Arc<dyn CdmServiceListener> = removed;
    cdm.add_service_listener(Arc::clone(&removed_handle));
    cdm.remove_service_listener(&removed_handle);

    harness.deliver(
        MessageKind::ServiceEvent,
        service_event(cdm.id(), CdmMessage::SafeDoorOpen),
    );

    assert_eq!(
        kept_labels.recv_timeout(WAIT).expect("kept listener notified"),
        "safe_door_open"
    );
    assert!(removed_labels.try_recv().is_err());
}

#[rstest]
fn version_errors_are_consumed_by_the_top_level(harness: Harness) {
    let service = harness.open_service("CashDispenser");
    let payload = json!({
        "logical_name": "CashDispenser",
        "workstation_name": "ATM01",
        "app_id": "xfs-service",
        "version": { "version": "3.30", "low_version": "3.00", "high_version": "3.30" }
    });
    let handle = harness.deliver(
        MessageKind::SystemEvent,
        RawResult::event(service.id(), SystemEventKind::VersionError.code())
            .with_payload(Payload::from_json(&payload).expect("payload")),
    );

    assert!(harness.transport.wait_for_freed(&[handle], WAIT));
    assert!(
        !harness
            .reporter
            .events()
            .iter()
            .any(|event| matches!(event, DispatchEvent::Dropped { .. }))
    );
    assert!(harness.transport.double_frees().is_empty());
}

#[rstest]
fn execute_events_without_a_pending_request_are_dropped(harness: Harness) {
    let service = harness.open_service("CashDispenser");
    let handle = harness.deliver(
        MessageKind::ExecuteEvent,
        service_event(service.id(), CdmMessage::InputP6)
            .for_request(RequestId::new(4_242)),
    );

    assert!(harness.transport.wait_for_freed(&[handle], WAIT));
    assert_eq!(
        harness.reporter.drops(DropReason::NoPendingRequest),
        vec![(MessageKind::ExecuteEvent, service.id())]
    );
}
