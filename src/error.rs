//! Error types for shared context negotiation.

use thiserror::Error;

/// Errors raised while negotiating or exchanging shared context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("A context change is already pending for {context}.")]
    AlreadyPending { context: String },

    #[error("Circular context change detected for {context}.")]
    CircularChange { context: String },

    #[error("Illegal context change nesting for {context}.")]
    IllegalNesting { context: String },

    #[error("Subscriber already responded to this survey ({previous}).")]
    DuplicateResponse { previous: String },

    #[error("Context slot {context} is no longer available.")]
    SlotUnavailable { context: String },

    #[error("A silent survey may not be deferred.")]
    IllegalDeferral,

    #[error("No serializer found for type {type_name}")]
    NoSerializer { type_name: String },

    #[error("Invalid signature on marshaled context: {0}")]
    InvalidSignature(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Change ticket abandoned before a verdict was produced")]
    TicketAbandoned,

    #[error("Remote context error: {0}")]
    Remote(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ContextError {
    /// True for errors that indicate a defect in calling code rather than a business outcome.
    pub fn is_usage_defect(&self) -> bool {
        matches!(
            self,
            ContextError::CircularChange { .. }
                | ContextError::IllegalNesting { .. }
                | ContextError::DuplicateResponse { .. }
                | ContextError::IllegalDeferral
        )
    }
}

impl From<std::io::Error> for ContextError {
    fn from(err: std::io::Error) -> Self {
        ContextError::Io(err.to_string())
    }
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        ContextError::Config(err.to_string())
    }
}
