//! Integration tests for layered configuration loading

use context_mediator::cli::RunContext;
use context_mediator::config::ConfigLoader;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

// HOME and CTXMED_* are process-wide.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

struct EnvGuard(Vec<(&'static str, Option<String>)>);

impl EnvGuard {
    fn set(vars: &[(&'static str, &str)]) -> Self {
        let saved = vars
            .iter()
            .map(|(key, value)| {
                let original = std::env::var(key).ok();
                std::env::set_var(key, value);
                (*key, original)
            })
            .collect();
        EnvGuard(saved)
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in &self.0 {
            match original {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn write(path: &Path, text: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

#[test]
fn test_environment_file_overrides_base_workspace_file() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let home = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let _env = EnvGuard::set(&[
        ("HOME", home.path().to_str().unwrap()),
        ("CTXMED_ENV", "staging"),
    ]);

    write(
        &workspace.path().join("config/config.toml"),
        r#"
[context]
application_id = "Base#"
remote_filter = "Patient"
"#,
    );
    write(
        &workspace.path().join("config/staging.toml"),
        r#"
[context]
application_id = "Staging#"
"#,
    );

    let config = ConfigLoader::load(workspace.path()).unwrap();
    assert_eq!(config.context.application_id, "Staging#");
    assert_eq!(config.context.remote_filter, "Patient");
    assert!(config.context.survey_silent_reset);
}

#[test]
fn test_run_context_rejects_invalid_config() {
    let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let home = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    let _env = EnvGuard::set(&[("HOME", home.path().to_str().unwrap())]);

    let path = workspace.path().join("bad.toml");
    write(
        &path,
        r#"
[context]
application_id = ""
"#,
    );

    assert!(RunContext::new(workspace.path().to_path_buf(), Some(path)).is_err());
}
