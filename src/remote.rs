//! Remote (common) context participation.
//!
//! A [`RemoteContextBridge`] connects the coordinator to a shared context that spans
//! applications, in the manner of a CCOW context manager. The coordinator only needs
//! the narrow contract below; [`LocalBridge`] implements it in-process.

use crate::context::items::ContextItemSet;
use crate::context::survey::SurveyOutcome;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Participation state reported by a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemoteState {
    Unknown,
    Participating,
    Suspended,
}

/// Coordinator-side view of remote participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    /// No bridge has been joined.
    None,
    /// Remote participation is switched off in configuration.
    Disabled,
    /// A join or remote transaction is in progress.
    Changing,
    Joined,
    /// The bridge is attached but not participating.
    Broken,
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteStatus::None => "none",
            RemoteStatus::Disabled => "disabled",
            RemoteStatus::Changing => "changing",
            RemoteStatus::Joined => "joined",
            RemoteStatus::Broken => "broken",
        };
        f.write_str(name)
    }
}

/// Receives transaction callbacks from a bridge.
pub trait RemoteContextListener: Send + Sync {
    /// A remote change is being surveyed. Veto through `sender.set_survey_response`.
    fn pending(&self, sender: &dyn RemoteContextBridge, items: &ContextItemSet);

    fn committed(&self, sender: &dyn RemoteContextBridge);

    fn canceled(&self, sender: &dyn RemoteContextBridge);
}

/// Contract the coordinator consumes from a common context backend.
pub trait RemoteContextBridge: Send + Sync {
    /// Join the common context. Returns false if the backend refused.
    fn join(&self, application_id: &str, credentials: &str, survey: bool, filter: &str) -> bool;

    fn suspend(&self);

    fn resume(&self);

    fn state(&self) -> RemoteState;

    fn is_active(&self) -> bool {
        self.state() == RemoteState::Participating
    }

    fn subscribe(&self, listener: Arc<dyn RemoteContextListener>) -> bool;

    fn unsubscribe(&self, listener: &Arc<dyn RemoteContextListener>);

    /// The committed common context.
    fn context(&self) -> ContextItemSet;

    /// Report a veto for the transaction currently being surveyed.
    fn set_survey_response(&self, reason: &str);
}

fn same_listener(a: &Arc<dyn RemoteContextListener>, b: &Arc<dyn RemoteContextListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

struct LocalBridgeState {
    state: RemoteState,
    application_id: Option<String>,
    filter: String,
    context: ContextItemSet,
    survey_reasons: Vec<String>,
}

/// In-process common context shared by every subscribed listener.
pub struct LocalBridge {
    state: Mutex<LocalBridgeState>,
    listeners: Mutex<Vec<Arc<dyn RemoteContextListener>>>,
}

impl Default for LocalBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBridge {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LocalBridgeState {
                state: RemoteState::Unknown,
                application_id: None,
                filter: "*".to_string(),
                context: ContextItemSet::new(),
                survey_reasons: Vec::new(),
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Seed the committed common context without a transaction.
    pub fn with_context(items: ContextItemSet) -> Self {
        let bridge = Self::new();
        bridge.state.lock().context = items;
        bridge
    }

    pub fn application_id(&self) -> Option<String> {
        self.state.lock().application_id.clone()
    }

    /// Propose `items` as the new common context.
    ///
    /// Every listener is surveyed; any veto cancels the change for all of them.
    /// Items outside the join filter's subjects are dropped first.
    pub fn publish(&self, items: &ContextItemSet) -> SurveyOutcome {
        let items = {
            let mut state = self.state.lock();
            if state.state != RemoteState::Participating {
                return SurveyOutcome::rejected_with("Not participating in the common context");
            }
            state.survey_reasons.clear();
            filter_items(items, &state.filter)
        };

        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            listener.pending(self, &items);
        }

        let reasons = std::mem::take(&mut self.state.lock().survey_reasons);
        let outcome = reasons
            .iter()
            .fold(SurveyOutcome::accepted(), |mut outcome, reason| {
                outcome.merge(&SurveyOutcome::rejected_with(reason.clone()));
                outcome
            });

        if outcome.is_accepted() {
            self.state.lock().context.add_items(&items);
            for listener in &listeners {
                listener.committed(self);
            }
        } else {
            debug!(reason = %outcome, "Common context change vetoed");
            for listener in &listeners {
                listener.canceled(self);
            }
        }

        outcome
    }
}

fn filter_items(items: &ContextItemSet, filter: &str) -> ContextItemSet {
    let subjects: Vec<&str> = filter
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if subjects.is_empty() || subjects.contains(&"*") {
        return items.clone();
    }

    let mut filtered = ContextItemSet::new();
    for subject in subjects {
        for (suffix, value) in items.get_suffixes(subject) {
            filtered.set_item(&format!("{}.{}", subject, suffix), Some(value));
        }
    }
    filtered
}

impl RemoteContextBridge for LocalBridge {
    fn join(&self, application_id: &str, _credentials: &str, _survey: bool, filter: &str) -> bool {
        let mut state = self.state.lock();
        state.application_id = Some(application_id.to_string());
        state.filter = filter.to_string();
        state.state = RemoteState::Participating;
        info!(application_id, filter, "Joined common context");
        true
    }

    fn suspend(&self) {
        self.state.lock().state = RemoteState::Suspended;
    }

    fn resume(&self) {
        let mut state = self.state.lock();
        if state.application_id.is_some() {
            state.state = RemoteState::Participating;
        }
    }

    fn state(&self) -> RemoteState {
        self.state.lock().state
    }

    fn subscribe(&self, listener: Arc<dyn RemoteContextListener>) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    fn unsubscribe(&self, listener: &Arc<dyn RemoteContextListener>) {
        self.listeners.lock().retain(|l| !same_listener(l, listener));
    }

    fn context(&self) -> ContextItemSet {
        self.state.lock().context.clone()
    }

    fn set_survey_response(&self, reason: &str) {
        self.state.lock().survey_reasons.push(reason.to_string());
    }
}
