//! CLI route: load configuration once, then dispatch each command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::output::{format_items, OutputFormat};
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, MediatorConfig};
use crate::context::items::ContextItemSet;
use crate::error::ContextError;
use crate::marshal::{Blake3Signature, ContextMarshaller};

/// Validated configuration plus the command handlers.
pub struct RunContext {
    config: MediatorConfig,
}

impl RunContext {
    pub fn new(workspace: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ContextError> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(&path)?,
            None => ConfigLoader::load(&workspace)?,
        };
        Ok(Self::with_config(config.validated()?))
    }

    pub fn with_config(config: MediatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ContextError> {
        match command {
            Commands::Sign { file, out, format } => self.sign(file, out.as_deref(), *format),
            Commands::Verify {
                file,
                signature,
                format,
            } => self.verify(file, signature, *format),
            Commands::Show { file, format } => {
                let items = ContextItemSet::parse(&read(file)?);
                Ok(format_items(&items, *format))
            }
            Commands::Config => self.config.to_toml(),
        }
    }

    fn marshaller(&self) -> Result<ContextMarshaller, ContextError> {
        let signer = Blake3Signature::from_settings(&self.config.signature)?;
        Ok(ContextMarshaller::detached(Arc::new(signer)))
    }

    fn sign(&self, file: &Path, out: Option<&Path>, format: OutputFormat) -> Result<String, ContextError> {
        let items = ContextItemSet::parse(&read(file)?);
        let signed = self.marshaller()?.marshal(&items)?;
        info!(file = %file.display(), items = items.len(), "Signed context");

        if let Some(out) = out {
            std::fs::write(out, &signed.body)?;
            debug!(out = %out.display(), "Wrote signed body");
        }

        match (format, out) {
            (OutputFormat::Json, _) => serde_json::to_string_pretty(&signed)
                .map_err(|e| ContextError::Serialization(e.to_string())),
            (OutputFormat::Text, Some(_)) => Ok(signed.signature),
            // Comment lines carry no '=' and are skipped when the body is parsed.
            (OutputFormat::Text, None) => Ok(format!("{}# signature: {}", signed.body, signed.signature)),
        }
    }

    fn verify(&self, file: &Path, signature: &str, format: OutputFormat) -> Result<String, ContextError> {
        let body = read(file)?;
        let items = self.marshaller()?.unmarshal(&body, signature)?;
        info!(file = %file.display(), "Signature verified");
        Ok(format_items(&items, format))
    }
}

fn read(path: &Path) -> Result<String, ContextError> {
    std::fs::read_to_string(path)
        .map_err(|e| ContextError::Io(format!("{}: {}", path.display(), e)))
}
