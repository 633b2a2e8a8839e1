//! User settings persisted under the `settings` storage key

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LabelerError, Result};
use crate::models::{ConditionType, Rule};
use crate::spam::SpamConfig;
use crate::storage::{load_as, save_as, Storage, SETTINGS_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Evaluated in order, first match wins
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub spam: SpamConfig,
    #[serde(default = "default_interval")]
    pub processing_interval_minutes: u64,
    #[serde(default)]
    pub auto_create_rules_from_suggestions: bool,
    #[serde(default = "default_true")]
    pub pattern_detection_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_timestamp: Option<DateTime<Utc>>,
}

/// One week
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

fn default_interval() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            spam: SpamConfig::default(),
            processing_interval_minutes: default_interval(),
            auto_create_rules_from_suggestions: false,
            pattern_detection_enabled: true,
            last_processed_timestamp: None,
        }
    }
}

impl Settings {
    /// Load from storage, falling back to defaults when nothing is stored
    pub async fn load(store: &dyn Storage) -> Result<Self> {
        Ok(load_as(store, SETTINGS_KEY).await?.unwrap_or_default())
    }

    pub async fn save(&self, store: &dyn Storage) -> Result<()> {
        save_as(store, SETTINGS_KEY, self).await
    }

    /// Load, edit, validate and save under the store's writer lock
    ///
    /// Nothing is written when `edit` or validation fails.
    pub async fn update<F>(store: &dyn Storage, edit: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings) -> Result<()> + Send,
    {
        let _lock = store.lock().await?;
        let mut settings = Self::load(store).await?;
        edit(&mut settings)?;
        settings.validate()?;
        settings.save(store).await?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            if rule.condition_value.trim().is_empty() {
                return Err(LabelerError::ConfigError(format!(
                    "rule {} has an empty condition value",
                    index + 1
                )));
            }
            if rule.target_label_name.trim().is_empty() {
                return Err(LabelerError::ConfigError(format!(
                    "rule {} has an empty target label name",
                    index + 1
                )));
            }
            if rule.condition_type == ConditionType::Unknown {
                tracing::warn!(
                    "Rule {} has an unrecognised condition type and will never match",
                    index + 1
                );
            }
        }

        if self.processing_interval_minutes == 0
            || self.processing_interval_minutes > MAX_INTERVAL_MINUTES
        {
            return Err(LabelerError::ConfigError(format!(
                "processing_interval_minutes must be between 1 and {}",
                MAX_INTERVAL_MINUTES
            )));
        }

        Ok(())
    }

    /// Fold the deltas of a finished cycle into the latest stored settings
    ///
    /// Only the completion timestamp and label ids resolved during the cycle
    /// are carried over; a re-resolved id replaces a stale stored one. Rules
    /// added or removed since the cycle started are kept as stored.
    pub fn merge_cycle_deltas(
        mut self,
        cycle_view: &Settings,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        if completed_at.is_some() {
            self.last_processed_timestamp = completed_at;
        }

        for rule in self.rules.iter_mut() {
            let resolved = cycle_view
                .rules
                .iter()
                .filter(|r| r.same_definition(rule))
                .find_map(|r| r.target_label_id.as_ref());
            if let Some(id) = resolved {
                rule.target_label_id = Some(id.clone());
            }
        }

        self
    }
}
