//! Supervisor configuration
//!
//! Loaded from an optional YAML file. Every field has a default, so an
//! empty file (or no file at all) describes the stock `uv`-based worker:
//!
//! ```yaml
//! launcher:
//!   name: uv
//!   path: ${HOME}/.local/bin/uv      # optional, skips the search
//!   search_timeout_secs: 5
//! worker:
//!   script: ${DICTATION_HOME:-.}/record_transcribe.py
//!   packages: [sounddevice, numpy, faster-whisper]
//!   python: python
//!   model: small
//!   language: es
//!   cache_dir: ${HOME}/.cache/dictation   # optional
//! recovery_delay_ms: 3000
//! diagnostic_tail: 20
//! ```
//!
//! `${VAR}` and `${VAR:-default}` are expanded in the path fields.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use worker_process::{Command, ExecutableLocator};

use crate::error::Error;

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env reference pattern is valid"));

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Environment variable not found
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
}

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// How to find the launcher executable
    pub launcher: LauncherConfig,
    /// What the launcher runs
    pub worker: WorkerConfig,
    /// Delay before `ERROR` falls back to `READY`, in milliseconds
    pub recovery_delay_ms: u64,
    /// Number of trailing stderr lines kept for exit reports
    pub diagnostic_tail: usize,
}

/// Launcher lookup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// Executable name to search for
    pub name: String,
    /// Explicit path; used when it exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Bound on the PATH lookup
    pub search_timeout_secs: u64,
}

/// Worker launch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Worker script handed to the interpreter
    pub script: String,
    /// Packages the launcher provides to the interpreter
    pub packages: Vec<String>,
    /// Interpreter name passed to the launcher
    pub python: String,
    /// Transcription model size
    pub model: String,
    /// Language code
    pub language: String,
    /// Model cache directory; created if absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            launcher: LauncherConfig::default(),
            worker: WorkerConfig::default(),
            recovery_delay_ms: 3000,
            diagnostic_tail: 20,
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            name: "uv".to_string(),
            path: None,
            search_timeout_secs: 5,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            script: "record_transcribe.py".to_string(),
            packages: vec![
                "sounddevice".to_string(),
                "numpy".to_string(),
                "faster-whisper".to_string(),
            ],
            python: "python".to_string(),
            model: "small".to_string(),
            language: "es".to_string(),
            cache_dir: None,
        }
    }
}

/// Per-session runtime settings derived from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Delay before `ERROR` falls back to `READY`
    pub recovery_delay: Duration,
    /// Number of trailing stderr lines kept for exit reports
    pub diagnostic_tail: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SupervisorConfig::default().session_settings()
    }
}

/// Parse a YAML configuration file
pub fn parse_file(path: impl AsRef<Path>) -> Result<SupervisorConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse YAML configuration from a string
pub fn parse_str(content: &str) -> Result<SupervisorConfig, ConfigError> {
    let mut config: SupervisorConfig = if content.trim().is_empty() {
        SupervisorConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };
    config.expand_env()?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if given and present, defaults otherwise
pub fn load(path: Option<&Path>) -> Result<SupervisorConfig, ConfigError> {
    match path {
        Some(path) if path.exists() => parse_file(path),
        _ => Ok(SupervisorConfig::default()),
    }
}

/// Substitute environment variables in a string
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in ENV_REF.captures_iter(input) {
        let full_match = &cap[0];
        let var_expr = &cap[1];

        // ${VAR:-default}
        let (var_name, default_value) = match var_expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (var_expr, None),
        };

        match (std::env::var(var_name), default_value) {
            (Ok(value), _) => result = result.replace(full_match, &value),
            (Err(_), Some(default)) => result = result.replace(full_match, default),
            (Err(_), None) => missing.push(var_name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::EnvVarNotFound(missing.join(", ")));
    }
    Ok(result)
}

impl SupervisorConfig {
    fn expand_env(&mut self) -> Result<(), ConfigError> {
        if let Some(path) = &self.launcher.path {
            self.launcher.path = Some(substitute_env_vars(path)?);
        }
        self.worker.script = substitute_env_vars(&self.worker.script)?;
        if let Some(dir) = &self.worker.cache_dir {
            self.worker.cache_dir = Some(substitute_env_vars(dir)?);
        }
        Ok(())
    }

    /// Check the configuration for values the worker cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("launcher.name", &self.launcher.name),
            ("worker.script", &self.worker.script),
            ("worker.python", &self.worker.python),
            ("worker.model", &self.worker.model),
            ("worker.language", &self.worker.language),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{field} must not be empty")));
            }
        }
        if self.launcher.search_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "launcher.search_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.worker.packages.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "worker.packages must not contain empty names".to_string(),
            ));
        }
        Ok(())
    }

    /// Runtime settings for sessions built from this configuration
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            recovery_delay: Duration::from_millis(self.recovery_delay_ms),
            diagnostic_tail: self.diagnostic_tail,
        }
    }

    /// The model cache directory, configured or platform default
    pub fn cache_dir(&self) -> PathBuf {
        match &self.worker.cache_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("whisper-dictation")
                .join("models"),
        }
    }

    /// Locator for the configured launcher
    pub fn locator(&self) -> ExecutableLocator {
        let locator = if self.launcher.name == "uv" {
            ExecutableLocator::uv()
        } else {
            ExecutableLocator::new(&self.launcher.name)
        };
        locator.with_search_timeout(Duration::from_secs(self.launcher.search_timeout_secs))
    }

    /// Find the launcher: explicit path first, then the locator
    pub fn resolve_launcher(&self) -> Result<PathBuf, Error> {
        if let Some(path) = &self.launcher.path {
            let path = PathBuf::from(path);
            if path.is_file() {
                return Ok(path);
            }
            tracing::warn!(path = %path.display(), "configured launcher path does not exist, searching");
        }
        self.locator().locate().ok_or_else(|| Error::Locator {
            name: self.launcher.name.clone(),
        })
    }

    /// The fixed, ordered argument vector handed to the launcher
    pub fn worker_args(&self, cache_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["run".into()];
        for package in &self.worker.packages {
            args.push("--with".into());
            args.push(package.into());
        }
        args.push((&self.worker.python).into());
        args.push((&self.worker.script).into());
        args.push((&self.worker.model).into());
        args.push((&self.worker.language).into());
        args.push(cache_dir.as_os_str().to_owned());
        args
    }

    /// Complete launch description for `launcher`
    pub fn worker_command(&self, launcher: &Path, cache_dir: &Path) -> Command {
        Command::builder(launcher).args(self.worker_args(cache_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(parse_str("").unwrap(), SupervisorConfig::default());
        assert_eq!(parse_str("{}").unwrap(), SupervisorConfig::default());
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = parse_str(
            r#"
worker:
  model: medium
  language: en
recovery_delay_ms: 500
"#,
        )
        .unwrap();

        assert_eq!(config.worker.model, "medium");
        assert_eq!(config.worker.language, "en");
        assert_eq!(config.worker.python, "python");
        assert_eq!(config.launcher.name, "uv");
        assert_eq!(config.session_settings().recovery_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = parse_str("worker:\n  modle: small\n").unwrap_err();
        assert!(matches!(err, ConfigError::YamlError(_)));
    }

    #[test]
    fn test_validation() {
        let err = parse_str("worker:\n  model: \"\"\n").unwrap_err();
        assert!(err.to_string().contains("worker.model"));

        let err = parse_str("launcher:\n  search_timeout_secs: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_env_var_with_default() {
        let result =
            substitute_env_vars("${MISSING_DICTATION_VAR_UNLIKELY_TO_EXIST:-/opt/worker}/run.py")
                .unwrap();
        assert_eq!(result, "/opt/worker/run.py");

        let err = substitute_env_vars("${MISSING_DICTATION_VAR_UNLIKELY_TO_EXIST}").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound(_)));
    }

    #[test]
    fn test_env_vars_expanded_in_paths() {
        let config = parse_str(
            "worker:\n  cache_dir: \"${MISSING_DICTATION_VAR_UNLIKELY_TO_EXIST:-/tmp/models}\"\n",
        )
        .unwrap();
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/models"));
    }

    #[test]
    fn test_argument_vector_order() {
        let config = SupervisorConfig::default();
        let args: Vec<String> = config
            .worker_args(Path::new("/cache"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "run",
                "--with",
                "sounddevice",
                "--with",
                "numpy",
                "--with",
                "faster-whisper",
                "python",
                "record_transcribe.py",
                "small",
                "es",
                "/cache",
            ]
        );
    }

    #[test]
    fn test_explicit_launcher_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = dir.path().join("uv");
        std::fs::write(&launcher, b"").unwrap();

        let config = SupervisorConfig {
            launcher: LauncherConfig {
                path: Some(launcher.to_string_lossy().into_owned()),
                ..LauncherConfig::default()
            },
            ..SupervisorConfig::default()
        };
        assert_eq!(config.resolve_launcher().unwrap(), launcher);
    }

    #[test]
    fn test_missing_launcher_is_locator_error() {
        let config = SupervisorConfig {
            launcher: LauncherConfig {
                name: "definitely_not_installed_launcher_12345".to_string(),
                ..LauncherConfig::default()
            },
            ..SupervisorConfig::default()
        };
        assert!(matches!(config.resolve_launcher(), Err(Error::Locator { .. })));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config, SupervisorConfig::default());
    }
}
