//! CLI output: presentation of item sets and error mapping.

use clap::ValueEnum;
use serde_json::{Map, Value};

use crate::context::items::ContextItemSet;
use crate::error::ContextError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Render items as `name=value` lines or as a JSON object, sorted by name.
pub fn format_items(items: &ContextItemSet, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => items.to_string().trim_end().to_string(),
        OutputFormat::Json => {
            let object: Map<String, Value> = items
                .iter()
                .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                .collect();
            serde_json::to_string_pretty(&Value::Object(object)).unwrap_or_default()
        }
    }
}

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &ContextError) -> String {
    match e {
        ContextError::InvalidSignature(_) => format!("verification failed: {}", e),
        _ => e.to_string(),
    }
}
