//! Workspace configuration loaded from `gar.yaml`.
//!
//! A missing config file yields defaults; `${VAR}` references are expanded
//! from the environment before parsing.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::llm::{ModelPricing, RetryPolicy};

/// Default config file name, looked up relative to the project root.
pub const DEFAULT_CONFIG_FILE: &str = "gar.yaml";
/// Environment variable consulted for the Anthropic API key by default.
pub const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(String),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,
}

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Workspace root for tool path confinement. Defaults to the config
    /// file's directory.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    /// Sessions directory. Defaults to `.gar/sessions` under the workspace.
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-model pricing table (USD per 1M tokens per bucket).
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: None,
            version: None,
        }
    }
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.base_delay_ms.map(Duration::from_millis),
            max_delay: self.max_delay_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Conversation length that triggers auto-compaction (default 80).
    #[serde(default)]
    pub auto_compact_messages: Option<usize>,
    /// Messages preserved by compaction (default 24).
    #[serde(default)]
    pub compaction_keep: Option<usize>,
    /// Turn limit per run (default 50).
    #[serde(default)]
    pub max_turns: Option<usize>,
    /// Queue mode strings: "one-at-a-time" or "all".
    #[serde(default)]
    pub steering_mode: Option<String>,
    #[serde(default)]
    pub follow_up_mode: Option<String>,
}

impl Config {
    /// Load a config file, returning defaults when it does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        serde_saphyr::from_str(&expanded).map_err(|e| ConfigError::Yaml(e.to_string()))
    }

    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> String {
        std::env::var(&self.api.api_key_env).unwrap_or_default()
    }
}

/// Resolve a path relative to the config file's directory. Absolute paths
/// pass through unchanged.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

/// Expand `${VAR}` references from the environment.
fn expand_env_vars(contents: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(contents.len());
    let mut rest = contents;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ConfigError::UnclosedVarReference);
        };
        let name = &after[..end];
        let value = std::env::var(name)
            .map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let config = Config::load("/nonexistent/gar.yaml").await.unwrap();
        assert!(config.model.is_none());
        assert_eq!(config.api.api_key_env, DEFAULT_API_KEY_ENV);
    }

    #[tokio::test]
    async fn loads_yaml_fields() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gar.yaml");
        std::fs::write(
            &path,
            "model: claude-sonnet-4-20250514\nmax_tokens: 2048\nretry:\n  max_retries: 5\n",
        )
        .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.model.as_deref(), Some("claude-sonnet-4-20250514"));
        assert_eq!(config.max_tokens, Some(2048));
        assert_eq!(config.retry.to_policy().max_retries, Some(5));
    }

    #[test]
    fn expands_env_vars() {
        // Modifying the process environment is safe here: tests in this
        // module use unique variable names.
        unsafe { std::env::set_var("GAR_TEST_VALUE", "expanded") };
        let out = expand_env_vars("key: ${GAR_TEST_VALUE}").unwrap();
        assert_eq!(out, "key: expanded");
    }

    #[test]
    fn missing_env_var_errors() {
        let err = expand_env_vars("key: ${GAR_TEST_DEFINITELY_UNSET}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(name) if name == "GAR_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn unclosed_reference_errors() {
        let err = expand_env_vars("key: ${OOPS").unwrap_err();
        assert!(matches!(err, ConfigError::UnclosedVarReference));
    }

    #[test]
    fn resolve_path_joins_relative() {
        let resolved = resolve_path(Path::new("/proj/gar.yaml"), Path::new("sessions"));
        assert_eq!(resolved, PathBuf::from("/proj/sessions"));
        let resolved = resolve_path(Path::new("/proj/gar.yaml"), Path::new("/abs/dir"));
        assert_eq!(resolved, PathBuf::from("/abs/dir"));
    }
}
