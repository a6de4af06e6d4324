//! In-process event bus for context notifications.
//!
//! Committed changes are published as `CONTEXT.CHANGED.<name>` events carrying the
//! slot's exported items; remote participation changes as `REMOTE.STATUS`.

use std::sync::mpsc::{channel, Receiver, SendError, Sender};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::items::ContextItemSet;
use crate::remote::RemoteStatus;

/// Event type for remote participation changes.
pub const REMOTE_STATUS_EVENT: &str = "REMOTE.STATUS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEvent {
    pub ts: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl ContextEvent {
    pub fn with_now(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event_type: event_type.into(),
            data,
        }
    }

    /// Context name carried by a change event.
    pub fn context(&self) -> Option<&str> {
        self.data.get("context").and_then(Value::as_str)
    }

    /// Items carried by a change event, parsed back into a set.
    pub fn items(&self) -> Option<ContextItemSet> {
        self.data
            .get("items")
            .and_then(Value::as_str)
            .map(ContextItemSet::parse)
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: Sender<ContextEvent>,
}

impl EventBus {
    pub fn new_pair() -> (Self, Receiver<ContextEvent>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }

    pub fn emit(
        &self,
        event_type: impl Into<String>,
        data: Value,
    ) -> Result<(), SendError<ContextEvent>> {
        self.sender.send(ContextEvent::with_now(event_type, data))
    }

    pub fn emit_context_changed(
        &self,
        event_name: &str,
        context: &str,
        items: &ContextItemSet,
    ) -> Result<(), SendError<ContextEvent>> {
        self.emit(
            event_name,
            json!({
                "context": context,
                "items": items.to_string(),
            }),
        )
    }

    pub fn emit_remote_status(&self, status: RemoteStatus) -> Result<(), SendError<ContextEvent>> {
        self.emit(REMOTE_STATUS_EVENT, json!({ "status": status }))
    }
}
