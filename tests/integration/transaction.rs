//! Transaction behavior through the public slot API: deferral, error policy, reset and init.

use crate::integration::test_utils::{Answer, EventLog, Patient, PatientBinding, Recorder, UserBinding};
use context_mediator::context::{ContextItemSet, ManagedContext, ManagedSlot};
use context_mediator::coordinator::{ContextCoordinator, SUPERSEDED_REASON};
use context_mediator::error::ContextError;
use std::sync::Arc;
use std::time::Duration;

fn patient_slot(coordinator: &ContextCoordinator, id: Option<&str>) -> Arc<ManagedContext<Patient>> {
    ManagedContext::with_binding("Patient", id.map(Patient::new), PatientBinding, coordinator)
}

#[test]
fn test_accepted_change_commits_and_notifies() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    patient.add_subscriber(Recorder::new("a", Answer::Accept, &log));
    patient.add_subscriber(Recorder::new("b", Answer::Accept, &log));

    let seen = EventLog::default();
    let listener_log = seen.clone();
    patient.add_listener(move |value| {
        listener_log.push(value.map(|p| p.id.clone()).unwrap_or_default());
    });

    let mut ticket = patient.request_context_change(Patient::new("2")).unwrap();
    assert!(ticket.try_verdict().unwrap().is_accepted());
    assert_eq!(patient.get_context_object(false), Some(Patient::new("2")));
    assert_eq!(
        log.entries(),
        vec!["a:pending", "b:pending", "a:committed", "b:committed"]
    );
    assert_eq!(seen.entries(), vec!["2"]);
}

#[test]
fn test_first_rejection_stops_the_survey() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, None);
    patient.add_subscriber(Recorder::new("a", Answer::Reject("no"), &log));
    patient.add_subscriber(Recorder::new("b", Answer::Accept, &log));

    let mut ticket = patient.request_context_change(Patient::new("2")).unwrap();
    assert_eq!(ticket.try_verdict().unwrap().reason(), "no");
    assert!(!log.contains("b:pending"));
    // Only subscribers that were asked hear about the cancel.
    assert!(log.contains("a:canceled"));
    assert!(!log.contains("b:canceled"));
}

#[test]
fn test_failing_subscriber_counts_as_accept() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, None);
    patient.add_subscriber(Recorder::new("broken", Answer::Fail, &log));
    patient.add_subscriber(Recorder::new("ok", Answer::Accept, &log));

    let mut ticket = patient.request_context_change(Patient::new("7")).unwrap();
    assert!(ticket.try_verdict().unwrap().is_accepted());
    assert_eq!(patient.get_context_object(false), Some(Patient::new("7")));
    assert!(log.contains("ok:pending"));
}

#[test]
fn test_equal_request_is_a_no_op() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    patient.add_subscriber(Recorder::new("a", Answer::Reject("never"), &log));

    let mut ticket = patient.request_context_change(Patient::new("1")).unwrap();
    assert!(ticket.try_verdict().unwrap().is_accepted());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_deferred_answer_settles_ticket_later() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    let deferring = Recorder::new("slow", Answer::Defer, &log);
    patient.add_subscriber(deferring.clone());
    patient.add_subscriber(Recorder::new("after", Answer::Accept, &log));

    let mut ticket = patient.request_context_change(Patient::new("2")).unwrap();
    assert!(ticket.try_verdict().is_none());
    assert!(patient.is_pending());
    assert!(!log.contains("after:pending"));
    assert!(matches!(
        patient.request_context_change(Patient::new("3")),
        Err(ContextError::AlreadyPending { .. })
    ));

    let response = deferring.take_deferred().unwrap();
    let answer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        response.accept().unwrap();
    });

    let outcome = ticket.verdict().await.unwrap();
    answer.join().unwrap();

    assert!(outcome.is_accepted());
    assert_eq!(patient.get_context_object(false), Some(Patient::new("2")));
    assert!(log.contains("after:pending"));
    assert!(log.contains("after:committed"));
}

#[test]
fn test_deferred_rejection_cancels() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    let deferring = Recorder::new("slow", Answer::Defer, &log);
    patient.add_subscriber(deferring.clone());

    let mut ticket = patient.request_context_change(Patient::new("2")).unwrap();
    deferring.take_deferred().unwrap().reject("chart open").unwrap();

    assert_eq!(ticket.try_verdict().unwrap().reason(), "chart open");
    assert_eq!(patient.get_context_object(false), Some(Patient::new("1")));
    assert!(log.contains("slow:canceled"));
}

#[test]
fn test_reset_supersedes_outstanding_deferral() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    let deferring = Recorder::new("slow", Answer::Defer, &log);
    patient.add_subscriber(deferring.clone());
    patient.add_subscriber(Recorder::new("after", Answer::Accept, &log));

    let mut ticket = patient.request_context_change(Patient::new("2")).unwrap();
    let stale = deferring.take_deferred().unwrap();
    assert!(!log.contains("after:pending"));

    let mut reset = coordinator.reset(true);
    assert!(reset.try_verdict().unwrap().is_accepted());
    assert_eq!(patient.get_context_object(false), None);
    let asked_by_reset = log.count("after:pending");
    let notified_by_reset = log.count("after:committed");

    // The late answer no longer commits anything, nor does it resume the old round.
    stale.accept().unwrap();
    let outcome = ticket.try_verdict().unwrap();
    assert_eq!(outcome.reason(), SUPERSEDED_REASON);
    assert_eq!(patient.get_context_object(false), None);
    assert_eq!(log.count("after:pending"), asked_by_reset);
    assert_eq!(log.count("after:committed"), notified_by_reset);
    assert!(!patient.is_pending());
}

#[test]
fn test_notify_failure_does_not_stop_delivery() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    patient.add_subscriber(Recorder::new("broken", Answer::FailNotify, &log));
    patient.add_subscriber(Recorder::new("ok", Answer::Accept, &log));

    let seen = EventLog::default();
    let listener_log = seen.clone();
    patient.add_listener(move |value| {
        listener_log.push(value.map(|p| p.id.clone()).unwrap_or_default());
    });

    let mut ticket = patient.request_context_change(Patient::new("2")).unwrap();
    assert!(ticket.try_verdict().unwrap().is_accepted());
    assert_eq!(patient.get_context_object(false), Some(Patient::new("2")));
    assert_eq!(
        log.entries(),
        vec!["broken:pending", "ok:pending", "broken:committed", "ok:committed"]
    );
    assert_eq!(seen.entries(), vec!["2"]);
}

#[test]
fn test_cancel_failure_does_not_stop_delivery() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    patient.add_subscriber(Recorder::new("broken", Answer::FailNotify, &log));
    patient.add_subscriber(Recorder::new("ok", Answer::Accept, &log));
    patient.add_subscriber(Recorder::new("veto", Answer::Reject("busy"), &log));

    let mut ticket = patient.request_context_change(Patient::new("2")).unwrap();
    assert_eq!(ticket.try_verdict().unwrap().reason(), "busy");
    assert_eq!(patient.get_context_object(false), Some(Patient::new("1")));
    assert!(log.contains("broken:canceled"));
    assert!(log.contains("ok:canceled"));
    assert!(log.contains("veto:canceled"));
    assert!(!log.contains("ok:committed"));
}

#[test]
fn test_init_stages_defaults_for_every_slot() {
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    let user = ManagedContext::with_binding("User", Some("doc".to_string()), UserBinding, &coordinator);

    let mut ticket = coordinator.init(None);
    assert!(ticket.try_verdict().unwrap().is_accepted());
    assert_eq!(patient.get_context_object(false), None);
    assert_eq!(user.get_context_object(false), None);
}

#[test]
fn test_init_from_saved_items() {
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, None);
    let user = ManagedContext::with_binding("User", Some("doc".to_string()), UserBinding, &coordinator);

    let saved = ContextItemSet::parse("Patient.Id=42\nPatient.Name=Smith");
    let mut ticket = coordinator.init_from(None, &saved);
    assert!(ticket.try_verdict().unwrap().is_accepted());

    let restored = patient.get_context_object(false).unwrap();
    assert_eq!(restored.id, "42");
    assert_eq!(restored.name.as_deref(), Some("Smith"));
    assert_eq!(user.get_context_object(false), None);
}

#[test]
fn test_init_single_slot_respects_veto() {
    let log = EventLog::default();
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    patient.add_subscriber(Recorder::new("a", Answer::Reject("keep"), &log));

    let handle: Arc<dyn ManagedSlot> = patient.clone();
    let mut ticket = coordinator.init(Some(&handle));
    assert_eq!(ticket.try_verdict().unwrap().reason(), "keep");
    assert_eq!(patient.get_context_object(false), Some(Patient::new("1")));
}

#[test]
fn test_dropped_slot_leaves_registry() {
    let coordinator = ContextCoordinator::default();
    let patient = patient_slot(&coordinator, Some("1"));
    assert!(coordinator.shared_context("PATIENT").is_some());

    drop(patient);
    assert!(coordinator.shared_context("patient").is_none());
    assert!(coordinator.marshaled_context().is_empty());
}
