use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LabelerError, Result};
use crate::learner::DEFAULT_PATTERN_THRESHOLD;

/// Application config loaded from `config.toml`
///
/// User-editable labeling settings (rules, spam lists, flags) live in
/// [`crate::settings::Settings`] and are persisted through storage instead.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Unread messages handled per cycle; the rest waits for the next one
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Co-occurrences of a (domain, label) pair before a suggestion is made
    #[serde(default = "default_pattern_threshold")]
    pub pattern_threshold: u64,
    /// Retries for transient failures when listing or creating labels
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            pattern_threshold: default_pattern_threshold(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Label applied to messages flagged as spam
    #[serde(default = "default_spam_label")]
    pub spam_label: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            spam_label: default_spam_label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding settings, counters and suggestions
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_pattern_threshold() -> u64 {
    DEFAULT_PATTERN_THRESHOLD
}

fn default_max_retries() -> u32 {
    3
}

fn default_spam_label() -> String {
    "Suspected Spam".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".gmail-labeler")
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LabelerError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| LabelerError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                LabelerError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| LabelerError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| LabelerError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Bounded batches keep each cycle under the Gmail per-user quota
        if self.processing.batch_size == 0 {
            return Err(LabelerError::ConfigError(
                "processing.batch_size must be at least 1".to_string(),
            ));
        }
        if self.processing.batch_size > 100 {
            return Err(LabelerError::ConfigError(
                "processing.batch_size cannot exceed 100".to_string(),
            ));
        }

        if self.processing.pattern_threshold == 0 {
            return Err(LabelerError::ConfigError(
                "processing.pattern_threshold must be at least 1".to_string(),
            ));
        }

        if self.labels.spam_label.trim().is_empty() {
            return Err(LabelerError::ConfigError(
                "labels.spam_label cannot be empty".to_string(),
            ));
        }

        if self.storage.state_dir.as_os_str().is_empty() {
            return Err(LabelerError::ConfigError(
                "storage.state_dir cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
