//! Coordinators sharing one in-process common context.

use crate::integration::test_utils::{Answer, EventLog, Patient, PatientBinding, Recorder};
use context_mediator::config::ContextSettings;
use context_mediator::context::{ContextItemSet, ContextSubscriber, ManagedContext, ManagedSlot};
use context_mediator::coordinator::ContextCoordinator;
use context_mediator::events::{EventBus, REMOTE_STATUS_EVENT};
use context_mediator::remote::{LocalBridge, RemoteContextBridge, RemoteStatus};
use std::sync::Arc;

fn remote_settings() -> ContextSettings {
    ContextSettings {
        remote_enabled: true,
        ..Default::default()
    }
}

struct Application {
    coordinator: ContextCoordinator,
    patient: Arc<ManagedContext<Patient>>,
}

impl Application {
    fn new() -> Self {
        let coordinator = ContextCoordinator::new(remote_settings());
        let patient = ManagedContext::<Patient>::with_binding("Patient", None, PatientBinding, &coordinator);
        Self { coordinator, patient }
    }

    fn join(&self, bridge: &Arc<LocalBridge>) {
        let mut ticket = self.coordinator.remote_join(bridge.clone()).unwrap();
        assert!(ticket.try_verdict().unwrap().is_accepted());
    }
}

#[test]
fn test_published_change_reaches_every_application() {
    let log = EventLog::default();
    let bridge = Arc::new(LocalBridge::new());
    let first = Application::new();
    let second = Application::new();
    first.join(&bridge);
    second.join(&bridge);
    first.patient.add_subscriber(Recorder::new("first", Answer::Accept, &log));
    second.patient.add_subscriber(Recorder::new("second", Answer::Accept, &log));

    let outcome = bridge.publish(&ContextItemSet::parse("Patient.Id=77"));
    assert!(outcome.is_accepted());

    assert_eq!(first.patient.get_context_object(false), Some(Patient::new("77")));
    assert_eq!(second.patient.get_context_object(false), Some(Patient::new("77")));
    assert!(log.contains("first:committed"));
    assert!(log.contains("second:committed"));
    assert_eq!(first.coordinator.remote_status(), RemoteStatus::Joined);
}

#[test]
fn test_one_application_veto_cancels_everywhere() {
    let log = EventLog::default();
    let bridge = Arc::new(LocalBridge::new());
    let first = Application::new();
    let second = Application::new();
    first.join(&bridge);
    second.join(&bridge);
    first.patient.add_subscriber(Recorder::new("first", Answer::Accept, &log));
    second.patient.add_subscriber(Recorder::new("second", Answer::Reject("unsaved notes"), &log));

    let outcome = bridge.publish(&ContextItemSet::parse("Patient.Id=77"));
    assert_eq!(outcome.reason(), "unsaved notes");

    assert_eq!(first.patient.get_context_object(false), None);
    assert_eq!(second.patient.get_context_object(false), None);
    assert!(!first.patient.is_pending());
    assert!(!second.patient.is_pending());
    assert!(log.contains("first:canceled"));
    assert!(bridge.context().is_empty());
}

#[test]
fn test_join_seeds_slots_from_common_context() {
    let bridge = Arc::new(LocalBridge::with_context(ContextItemSet::parse(
        "Patient.Id=5\nPatient.Name=Jones",
    )));
    let app = Application::new();
    app.join(&bridge);

    let seeded = app.patient.get_context_object(false).unwrap();
    assert_eq!(seeded.id, "5");
    assert_eq!(seeded.name.as_deref(), Some("Jones"));
}

#[test]
fn test_rejected_join_suspends_participation() {
    let log = EventLog::default();
    let bridge = Arc::new(LocalBridge::with_context(ContextItemSet::parse("Patient.Id=5")));
    let app = Application::new();
    let busy: Arc<dyn ContextSubscriber> = Recorder::new("app", Answer::Reject("in the middle of an order"), &log);
    app.patient.add_subscriber(Arc::clone(&busy));

    let mut ticket = app.coordinator.remote_join(bridge.clone()).unwrap();
    assert!(ticket.try_verdict().unwrap().is_rejected());
    assert_eq!(app.coordinator.remote_status(), RemoteStatus::Broken);
    assert!(!bridge.is_active());
    assert_eq!(app.patient.get_context_object(false), None);

    // Once the objection is gone a later join resumes the same bridge.
    app.coordinator.unregister_subscriber(&busy);
    app.join(&bridge);
    assert!(bridge.is_active());
    assert_eq!(app.coordinator.remote_status(), RemoteStatus::Joined);
    assert_eq!(app.patient.get_context_object(false), Some(Patient::new("5")));
}

#[test]
fn test_status_changes_are_published() {
    let (events, receiver) = EventBus::new_pair();
    let coordinator = ContextCoordinator::with_events(remote_settings(), events);
    let patient = ManagedContext::<Patient>::with_binding("Patient", None, PatientBinding, &coordinator);
    let bridge = Arc::new(LocalBridge::new());

    let mut ticket = coordinator.remote_join(bridge.clone()).unwrap();
    assert!(ticket.try_verdict().unwrap().is_accepted());
    bridge.publish(&ContextItemSet::parse("Patient.Id=3"));
    assert_eq!(patient.get_context_object(false), Some(Patient::new("3")));

    let received: Vec<_> = receiver.try_iter().collect();
    let statuses: Vec<String> = received
        .iter()
        .filter(|e| e.event_type == REMOTE_STATUS_EVENT)
        .map(|e| e.data["status"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(statuses.first().map(String::as_str), Some("joined"));
    assert!(statuses.contains(&"changing".to_string()));
    assert_eq!(statuses.last().map(String::as_str), Some("joined"));

    let changed = received
        .iter()
        .rev()
        .find(|e| e.event_type == patient.event_name())
        .unwrap();
    assert_eq!(changed.context(), Some("Patient"));
    assert_eq!(changed.items().unwrap().get_item("patient.id"), Some("3"));
}

#[test]
fn test_disabled_coordinator_cannot_join() {
    let coordinator = ContextCoordinator::default();
    let bridge: Arc<dyn RemoteContextBridge> = Arc::new(LocalBridge::new());
    assert!(coordinator.remote_join(bridge).is_err());
    assert_eq!(coordinator.remote_status(), RemoteStatus::Disabled);
}
