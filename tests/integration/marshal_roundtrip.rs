//! Signed export from one coordinator and verified import into another.

use crate::integration::test_utils::{Answer, EventLog, Patient, PatientBinding, Recorder, UserBinding};
use context_mediator::context::{ManagedContext, ManagedSlot};
use context_mediator::coordinator::ContextCoordinator;
use context_mediator::error::ContextError;
use context_mediator::marshal::{Blake3Signature, DigitalSignature, SIGNATURE_KEY_ITEM};
use std::sync::Arc;

fn signer() -> Arc<dyn DigitalSignature> {
    Arc::new(Blake3Signature::from_secret("desktop", &"5a".repeat(32)).unwrap())
}

type Workstation = (
    ContextCoordinator,
    Arc<ManagedContext<Patient>>,
    Arc<ManagedContext<String>>,
);

fn workstation(patient: Option<&str>, user: Option<&str>) -> Workstation {
    let coordinator = ContextCoordinator::default();
    let patient = ManagedContext::with_binding("Patient", patient.map(Patient::new), PatientBinding, &coordinator);
    let user = ManagedContext::with_binding("User", user.map(str::to_string), UserBinding, &coordinator);
    (coordinator, patient, user)
}

#[test]
fn test_signed_context_moves_between_coordinators() {
    let (source, _source_patient, _source_user) = workstation(Some("31"), Some("doc"));
    let (target, patient, user) = workstation(None, None);

    let signed = source.context_marshaller(signer()).marshal_context().unwrap();
    assert!(signed.body.contains(SIGNATURE_KEY_ITEM));
    assert!(signed.body.contains("Patient.Id=31"));
    assert!(signed.body.contains("User.Name=doc"));

    let mut ticket = target
        .context_marshaller(signer())
        .unmarshal_context(&signed.body, &signed.signature)
        .unwrap();
    assert!(ticket.try_verdict().unwrap().is_accepted());

    assert_eq!(patient.get_context_object(false), Some(Patient::new("31")));
    assert_eq!(user.get_context_object(false), Some("doc".to_string()));
    assert!(!target.marshaled_context().contains_subject("Signature"));
}

#[test]
fn test_tampered_export_applies_nothing() {
    let log = EventLog::default();
    let (source, _source_patient, _source_user) = workstation(Some("31"), None);
    let (target, patient, _user) = workstation(Some("1"), None);
    patient.add_subscriber(Recorder::new("target", Answer::Accept, &log));

    let signed = source.context_marshaller(signer()).marshal_context().unwrap();
    assert!(signed.body.contains("Patient.Id=31"));
    let tampered = signed.body.replace("Patient.Id=31", "Patient.Id=99");
    assert_ne!(tampered, signed.body);

    let result = target
        .context_marshaller(signer())
        .unmarshal_context(&tampered, &signed.signature);
    assert!(matches!(result, Err(ContextError::InvalidSignature(_))));
    assert_eq!(patient.get_context_object(false), Some(Patient::new("1")));
    assert!(!patient.is_pending());
    assert!(log.entries().is_empty());
}

#[test]
fn test_import_vetoed_by_subscriber() {
    let log = EventLog::default();
    let (source, _source_patient, _source_user) = workstation(Some("31"), Some("nurse"));
    let (target, patient, user) = workstation(Some("1"), Some("doc"));
    user.add_subscriber(Recorder::new("user", Answer::Reject("signed in elsewhere"), &log));

    let signed = source.context_marshaller(signer()).marshal_context().unwrap();
    let mut ticket = target
        .context_marshaller(signer())
        .unmarshal_context(&signed.body, &signed.signature)
        .unwrap();

    assert_eq!(ticket.try_verdict().unwrap().reason(), "signed in elsewhere");
    assert_eq!(patient.get_context_object(false), Some(Patient::new("1")));
    assert_eq!(user.get_context_object(false), Some("doc".to_string()));
}
