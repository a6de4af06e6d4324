//! Merge rules: defaults first, later sources override earlier ones key by key.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("context.remote_enabled", false)?
        .set_default("context.application_id", "CareWebFramework#")?
        .set_default("context.remote_filter", "*")?
        .set_default("context.survey_silent_reset", true)?
        .set_default("signature.key_name", "default")
}
