//! Survey responses
//!
//! A [`SurveyResponse`] is handed to each subscriber while a context change is being
//! negotiated. The subscriber answers exactly once per round: accept, reject with a
//! reason, or defer and answer later from outside the original call stack.

use crate::error::ContextError;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Reason recorded when a subscriber rejects without saying why.
pub const UNSPECIFIED_REASON: &str = "Unspecified reason";

/// State of the current poll round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseState {
    Null,
    Accepted,
    Rejected,
    Deferred,
}

impl fmt::Display for ResponseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseState::Null => "null",
            ResponseState::Accepted => "accepted",
            ResponseState::Rejected => "rejected",
            ResponseState::Deferred => "deferred",
        };
        f.write_str(name)
    }
}

/// Resumes a suspended survey walk once a deferred answer arrives.
pub(crate) type Continuation = Box<dyn FnOnce() + Send>;

struct ResponseInner {
    state: ResponseState,
    reasons: Vec<String>,
    /// The walk has returned and is waiting for the deferred answer.
    parked: bool,
    continuation: Option<Continuation>,
    violation: Option<ContextError>,
}

/// Shared handle to one survey. Cloning yields another handle to the same survey,
/// which is how a deferring subscriber keeps it for a later answer.
#[derive(Clone)]
pub struct SurveyResponse {
    inner: Arc<Mutex<ResponseInner>>,
    silent: bool,
}

impl SurveyResponse {
    pub fn new(silent: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResponseInner {
                state: ResponseState::Null,
                reasons: Vec::new(),
                parked: false,
                continuation: None,
                violation: None,
            })),
            silent,
        }
    }

    /// No user interaction is permitted while answering a silent survey.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn state(&self) -> ResponseState {
        self.inner.lock().state
    }

    /// True once any subscriber has rejected.
    pub fn rejected(&self) -> bool {
        !self.inner.lock().reasons.is_empty()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.inner.lock().reasons.clone()
    }

    pub fn outcome(&self) -> SurveyOutcome {
        SurveyOutcome {
            reasons: self.reasons(),
            silent: self.silent,
        }
    }

    /// Accept the pending change.
    pub fn accept(&self) -> Result<(), ContextError> {
        self.answer(ResponseState::Accepted, None)
    }

    /// Reject the pending change. An empty reason is recorded as [`UNSPECIFIED_REASON`].
    pub fn reject(&self, reason: impl Into<String>) -> Result<(), ContextError> {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            UNSPECIFIED_REASON.to_string()
        } else {
            reason
        };
        self.answer(ResponseState::Rejected, Some(reason))
    }

    /// Postpone the answer. The subscriber must later call [`accept`](Self::accept)
    /// or [`reject`](Self::reject) on a clone of this response.
    pub fn defer(&self) -> Result<(), ContextError> {
        if self.silent {
            return Err(ContextError::IllegalDeferral);
        }

        let mut inner = self.inner.lock();
        match inner.state {
            ResponseState::Null | ResponseState::Deferred => {
                inner.state = ResponseState::Deferred;
                Ok(())
            }
            answered => Err(duplicate(&mut inner, answered)),
        }
    }

    /// Append `other`'s reasons to this response.
    pub fn merge(&self, other: &SurveyOutcome) {
        self.inner
            .lock()
            .reasons
            .extend(other.reasons.iter().cloned());
    }

    /// Re-arm for the next subscriber of a walk.
    pub(crate) fn reset(&self, continuation: Continuation) {
        let mut inner = self.inner.lock();
        inner.state = ResponseState::Null;
        inner.parked = false;
        inner.violation = None;
        inner.continuation = Some(continuation);
    }

    /// Called by the walk after the subscriber returned. Returns true if the walk must
    /// suspend because the answer was deferred; the continuation then fires on resolution.
    pub(crate) fn park(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == ResponseState::Deferred {
            inner.parked = true;
            true
        } else {
            inner.continuation = None;
            false
        }
    }

    /// Protocol violation committed by the subscriber during this round, if any.
    pub(crate) fn take_violation(&self) -> Option<ContextError> {
        self.inner.lock().violation.take()
    }

    /// Record a reason without touching the round's state machine.
    pub(crate) fn record_rejection(&self, reason: impl Into<String>) {
        self.inner.lock().reasons.push(reason.into());
    }

    fn answer(&self, state: ResponseState, reason: Option<String>) -> Result<(), ContextError> {
        let continuation = {
            let mut inner = self.inner.lock();
            let has_reason = reason.is_some();

            if let Some(reason) = reason {
                inner.reasons.push(reason);
            }

            match inner.state {
                ResponseState::Null | ResponseState::Deferred => {}
                answered => {
                    if has_reason {
                        inner.reasons.pop();
                    }
                    return Err(duplicate(&mut inner, answered));
                }
            }

            inner.state = state;

            if inner.parked {
                inner.parked = false;
                inner.continuation.take()
            } else {
                None
            }
        };

        if let Some(resume) = continuation {
            resume();
        }

        Ok(())
    }
}

fn duplicate(inner: &mut ResponseInner, answered: ResponseState) -> ContextError {
    let err = ContextError::DuplicateResponse {
        previous: answered.to_string(),
    };
    inner.violation = Some(err.clone());
    err
}

impl fmt::Debug for SurveyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SurveyResponse")
            .field("state", &inner.state)
            .field("reasons", &inner.reasons)
            .field("silent", &self.silent)
            .finish()
    }
}

impl fmt::Display for SurveyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.outcome())
    }
}

/// Settled result of a survey or of a whole transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SurveyOutcome {
    reasons: Vec<String>,
    silent: bool,
}

impl SurveyOutcome {
    /// Outcome with no objections.
    pub fn accepted() -> Self {
        Self::default()
    }

    /// Outcome carrying a single rejection reason.
    pub fn rejected_with(reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![reason.into()],
            silent: false,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn is_rejected(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// All rejection reasons, one per line.
    pub fn reason(&self) -> String {
        self.reasons.join("\n")
    }

    pub fn merge(&mut self, other: &SurveyOutcome) {
        self.reasons.extend(other.reasons.iter().cloned());
    }
}

impl fmt::Display for SurveyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}
