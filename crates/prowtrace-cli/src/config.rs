//! CLI configuration management.

use prowtrace_trace::{LogFormat, TracingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Object storage HTTP endpoint.
    pub storage_url: String,
    /// Exporter and resource settings.
    pub tracing: TracingConfig,
    /// Label holding the job's unique id.
    pub job_id_label: String,
    /// Job labels under this prefix become resource attributes.
    pub label_prefix: String,
    pub log_format: LogFormat,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            storage_url: "https://storage.googleapis.com".to_string(),
            tracing: TracingConfig::default(),
            job_id_label: "prow.k8s.io/id".to_string(),
            label_prefix: "prow.k8s.io/".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration from `path`, or from the user config directory.
    ///
    /// An explicit path must exist; the default location may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path()?;
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("{}: {e}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("io", "prowtrace", "prowtrace")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }
}
