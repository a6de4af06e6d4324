//! Context Mediator: coordinated changes to shared context state
//!
//! Independently registered subscribers are surveyed before any shared context slot
//! ("current patient", "current user") changes; a single veto cancels the whole
//! transaction, and every participant observes the same committed outcome.

pub mod cli;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod logging;
pub mod marshal;
pub mod remote;

pub use context::{ContextItemSet, ContextSubscriber, ManagedContext, SurveyOutcome, SurveyResponse};
pub use coordinator::{ChangeTicket, ContextCoordinator};
pub use error::ContextError;
