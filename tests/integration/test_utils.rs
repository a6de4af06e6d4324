//! Shared fixtures for integration tests: domain bindings and recording subscribers.

use context_mediator::context::{ContextBinding, ContextItemSet, ContextSubscriber, SurveyResponse};
use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered record of callbacks across every subscriber in a test.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub id: String,
    pub name: Option<String>,
}

impl Patient {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
        }
    }
}

pub struct PatientBinding;

impl ContextBinding<Patient> for PatientBinding {
    fn to_context_items(&self, value: &Patient, items: &mut ContextItemSet) {
        items.set_item("Patient.Id", Some(value.id.as_str()));
        if let Some(name) = &value.name {
            items.set_item("Patient.Name", Some(name.as_str()));
        }
    }

    fn from_context_items(&self, items: &ContextItemSet) -> Option<Patient> {
        let id = items.get_item("Patient.Id")?;
        Some(Patient {
            id: id.to_string(),
            name: items.get_item("Patient.Name").map(str::to_string),
        })
    }
}

/// Logout-style slot that sorts last in the registry.
pub struct UserBinding;

impl ContextBinding<String> for UserBinding {
    fn priority(&self) -> i32 {
        1000
    }

    fn to_context_items(&self, value: &String, items: &mut ContextItemSet) {
        items.set_item("User.Name", Some(value.as_str()));
    }

    fn from_context_items(&self, items: &ContextItemSet) -> Option<String> {
        items.get_item("User.Name").map(str::to_string)
    }
}

pub enum Answer {
    Accept,
    Reject(&'static str),
    Defer,
    Fail,
    /// Accepts the survey, then errors out of `committed` and `canceled`.
    FailNotify,
}

/// Subscriber that answers a fixed way and logs `label:callback` entries.
pub struct Recorder {
    label: &'static str,
    answer: Answer,
    log: EventLog,
    held: Mutex<Option<SurveyResponse>>,
}

impl Recorder {
    pub fn new(label: &'static str, answer: Answer, log: &EventLog) -> Arc<Self> {
        Arc::new(Self {
            label,
            answer,
            log: log.clone(),
            held: Mutex::new(None),
        })
    }

    /// The response held by a deferring recorder.
    pub fn take_deferred(&self) -> Option<SurveyResponse> {
        self.held.lock().take()
    }
}

impl ContextSubscriber for Recorder {
    fn pending(&self, response: &SurveyResponse) -> anyhow::Result<()> {
        self.log.push(format!("{}:pending", self.label));
        match self.answer {
            Answer::Accept | Answer::FailNotify => response.accept()?,
            Answer::Reject(reason) => response.reject(reason)?,
            Answer::Defer => {
                response.defer()?;
                *self.held.lock() = Some(response.clone());
            }
            Answer::Fail => anyhow::bail!("{} crashed while surveyed", self.label),
        }
        Ok(())
    }

    fn committed(&self) -> anyhow::Result<()> {
        self.log.push(format!("{}:committed", self.label));
        if matches!(self.answer, Answer::FailNotify) {
            anyhow::bail!("{} crashed on commit", self.label);
        }
        Ok(())
    }

    fn canceled(&self) -> anyhow::Result<()> {
        self.log.push(format!("{}:canceled", self.label));
        if matches!(self.answer, Answer::FailNotify) {
            anyhow::bail!("{} crashed on cancel", self.label);
        }
        Ok(())
    }
}
