//! Configuration System
//!
//! Layered configuration for the mediator: merge-policy defaults, then the global
//! file, then workspace files, then `CTXMED__*` environment variables. Tests included.

use crate::error::ContextError;
use crate::logging::LoggingConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge {
    pub mod merge_policy;
}

mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediatorConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Shared context behavior
    #[serde(default)]
    pub context: ContextSettings,

    /// Signing of marshaled context
    #[serde(default)]
    pub signature: SignatureSettings,
}

/// Coordinator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Allow joining a remote common context
    #[serde(default)]
    pub remote_enabled: bool,

    /// Application identity presented when joining
    #[serde(default = "default_application_id")]
    pub application_id: String,

    /// Subjects shared with the common context, comma separated, `*` for all
    #[serde(default = "default_remote_filter")]
    pub remote_filter: String,

    /// Whether operator-initiated resets override subscriber vetoes
    #[serde(default = "default_true")]
    pub survey_silent_reset: bool,
}

fn default_application_id() -> String {
    "CareWebFramework#".to_string()
}

fn default_remote_filter() -> String {
    "*".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            remote_enabled: false,
            application_id: default_application_id(),
            remote_filter: default_remote_filter(),
            survey_silent_reset: true,
        }
    }
}

/// Signer identity and key material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSettings {
    /// Name stamped into `Signature.Key`
    #[serde(default = "default_key_name")]
    pub key_name: String,

    /// Hex-encoded secret; required for signing
    #[serde(default)]
    pub secret: Option<String>,
}

fn default_key_name() -> String {
    "default".to_string()
}

impl Default for SignatureSettings {
    fn default() -> Self {
        Self {
            key_name: default_key_name(),
            secret: None,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Context(String),
    Signature(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Context(msg) => write!(f, "Context: {}", msg),
            ValidationError::Signature(msg) => write!(f, "Signature: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ContextSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.application_id.trim().is_empty() {
            return Err("application_id cannot be empty".to_string());
        }
        if self.remote_filter.trim().is_empty() {
            return Err("remote_filter cannot be empty".to_string());
        }
        Ok(())
    }
}

impl SignatureSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.key_name.trim().is_empty() {
            return Err("key_name cannot be empty".to_string());
        }
        if let Some(secret) = &self.secret {
            let bytes = hex::decode(secret).map_err(|e| format!("secret is not valid hex: {}", e))?;
            if bytes.is_empty() {
                return Err("secret cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

impl MediatorConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.context.validate() {
            errors.push(ValidationError::Context(e));
        }

        if let Err(e) = self.signature.validate() {
            errors.push(ValidationError::Signature(e));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            errors.push(ValidationError::Logging(format!(
                "unknown format '{}'",
                self.logging.format
            )));
        }

        if !matches!(self.logging.output.as_str(), "stdout" | "stderr" | "file") {
            errors.push(ValidationError::Logging(format!(
                "unknown output '{}'",
                self.logging.output
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one error.
    pub fn validated(self) -> Result<Self, ContextError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ContextError::Config(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;
        Ok(self)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ContextError> {
        toml::to_string_pretty(self).map_err(|e| ContextError::Serialization(e.to_string()))
    }
}

/// Loads [`MediatorConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Built-in defaults only.
    pub fn default() -> MediatorConfig {
        MediatorConfig::default()
    }

    /// Path of the per-user config file, if a home directory is known.
    pub fn global_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }

    /// Defaults, global file, `config/config.toml`, `config/{CTXMED_ENV}.toml`,
    /// then `CTXMED__SECTION__KEY` environment variables.
    pub fn load(workspace_root: &Path) -> Result<MediatorConfig, ContextError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(
            Environment::with_prefix("CTXMED")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?.try_deserialize::<MediatorConfig>()?;
        Ok(config)
    }

    /// Load a single TOML file over the defaults.
    pub fn load_from_file(path: &Path) -> Result<MediatorConfig, ContextError> {
        let path_str = path.to_str().ok_or_else(|| {
            ContextError::Config(format!("non UTF-8 config path: {}", path.display()))
        })?;

        let config = merge::merge_policy::builder_with_defaults()?
            .add_source(File::with_name(path_str))
            .build()?
            .try_deserialize::<MediatorConfig>()?;
        Ok(config)
    }

    /// Parse TOML text over the defaults.
    pub fn load_from_str(text: &str) -> Result<MediatorConfig, ContextError> {
        let config = Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<MediatorConfig>()?;
        Ok(config)
    }
}
