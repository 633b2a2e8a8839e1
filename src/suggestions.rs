//! Suggestion lifecycle: `pending -> approved | rejected | failed_creation`

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{LabelerError, Result};
use crate::models::{Suggestion, SuggestionStatus};

/// Ordered suggestion list persisted under the `suggestions` key
///
/// Suggestions are never removed; terminal ones stay as history and keep
/// their names reserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuggestionStore {
    items: Vec<Suggestion>,
}

impl SuggestionStore {
    pub fn new(items: Vec<Suggestion>) -> Self {
        Self { items }
    }

    pub fn all(&self) -> &[Suggestion] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Suggestion> {
        self.items.iter().find(|s| s.id == id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Suggestion> {
        self.items.iter().filter(|s| s.is_pending())
    }

    /// Whether any suggestion, in any status, carries `name` (case-insensitive)
    pub fn has_name(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.items
            .iter()
            .any(|s| s.suggested_name.to_lowercase() == name)
    }

    /// Add a suggestion unless one with the same name is already present
    pub fn insert(&mut self, suggestion: Suggestion) -> bool {
        if self.has_name(&suggestion.suggested_name) {
            return false;
        }
        self.items.push(suggestion);
        true
    }

    /// Look up a suggestion that may still be decided
    pub fn pending_by_id(&self, id: &str) -> Result<&Suggestion> {
        let suggestion = self
            .find(id)
            .ok_or_else(|| LabelerError::SuggestionNotFound(id.to_string()))?;
        if !suggestion.is_pending() {
            return Err(LabelerError::InvalidSuggestionState {
                id: id.to_string(),
                status: suggestion.status.to_string(),
            });
        }
        Ok(suggestion)
    }

    /// Move a pending suggestion to a terminal status
    ///
    /// Fails without mutating when the id is unknown or the suggestion was
    /// already decided.
    pub fn transition(
        &mut self,
        id: &str,
        status: SuggestionStatus,
        created_label_id: Option<String>,
    ) -> Result<&Suggestion> {
        if !status.is_terminal() {
            return Err(LabelerError::InvalidSuggestionState {
                id: id.to_string(),
                status: status.to_string(),
            });
        }
        self.pending_by_id(id)?;

        let suggestion = self
            .items
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| LabelerError::SuggestionNotFound(id.to_string()))?;
        suggestion.status = status;
        suggestion.created_label_id = created_label_id;
        suggestion.decided_at = Some(Utc::now());
        Ok(suggestion)
    }

    pub fn mark_approved(&mut self, id: &str, label_id: String) -> Result<&Suggestion> {
        self.transition(id, SuggestionStatus::Approved, Some(label_id))
    }

    pub fn mark_rejected(&mut self, id: &str) -> Result<&Suggestion> {
        self.transition(id, SuggestionStatus::Rejected, None)
    }

    pub fn mark_failed(&mut self, id: &str) -> Result<&Suggestion> {
        self.transition(id, SuggestionStatus::FailedCreation, None)
    }
}
