use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};
use url::Url;

use crate::{
    api::ApiFailurePolicy,
    error::{FlowError, FlowErrorLocation, Result},
    storage::DEFAULT_KEY_PREFIX,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base for relative `api.url` values.
    pub api_base_url: Option<Url>,
    pub request_timeout_ms: u64,
    /// Upper bound on consecutive automatic nodes processed for a single event.
    pub max_auto_steps: usize,
    pub storage_key_prefix: String,
    pub storage_dir: Option<PathBuf>,
    pub api_failure_policy: ApiFailurePolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout_ms: 10_000,
            max_auto_steps: 32,
            storage_key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            storage_dir: None,
            api_failure_policy: ApiFailurePolicy::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| FlowError::Json {
            message: format!("runner config: {e}"),
            location: FlowErrorLocation::at_path("<config>"),
        })
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FlowError::Internal {
            message: format!("runner config (toml): {e}"),
            location: FlowErrorLocation::at_path("<config>"),
        })
    }

    #[cfg(feature = "toml")]
    fn from_toml_file(text: &str, _path: &Path) -> Result<Self> {
        Self::from_toml_str(text)
    }

    #[cfg(not(feature = "toml"))]
    fn from_toml_file(_text: &str, path: &Path) -> Result<Self> {
        Err(FlowError::Internal {
            message: format!(
                "{} is a TOML file but the `toml` feature is disabled",
                path.display()
            ),
            location: FlowErrorLocation::at_path(path.display().to_string())
                .with_source_path(Some(path)),
        })
    }

    /// Load from disk; `.toml` files need the `toml` feature, everything else is read as JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| FlowError::Internal {
            message: format!("failed to read {}: {e}", path.display()),
            location: FlowErrorLocation::at_path(path.display().to_string())
                .with_source_path(Some(path)),
        })?;
        let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
        if is_toml {
            return Self::from_toml_file(&text, path);
        }
        Self::from_json_str(&text).map_err(|err| match err {
            FlowError::Json { message, .. } => FlowError::Json {
                message,
                location: FlowErrorLocation::at_path(path.display().to_string())
                    .with_source_path(Some(path)),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = RunnerConfig::from_json_str(
            r#"{"api_base_url": "https://api.example.com/v1/", "max_auto_steps": 8}"#,
        )
        .unwrap();
        assert_eq!(config.max_auto_steps, 8);
        assert_eq!(config.request_timeout_ms, 10_000);
        assert_eq!(config.storage_key_prefix, "flow_context_");
        assert_eq!(config.api_failure_policy, ApiFailurePolicy::ContinueNavigation);
        assert_eq!(
            config.api_base_url.unwrap().as_str(),
            "https://api.example.com/v1/"
        );
    }

    #[test]
    fn policy_is_configurable() {
        let config = RunnerConfig::from_json_str(r#"{"api_failure_policy": "halt"}"#).unwrap();
        assert_eq!(config.api_failure_policy, ApiFailurePolicy::Halt);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn reads_toml() {
        let config = RunnerConfig::from_toml_str("request_timeout_ms = 250\n").unwrap();
        assert_eq!(config.request_timeout_ms, 250);
    }
}
