use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header projection of a fetched message; all matching runs against this
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub id: String,
    pub sender_header: String,
    pub subject_header: String,
    pub text_snippet: String,
}

impl NormalizedMessage {
    pub fn new(
        id: impl Into<String>,
        sender_header: impl Into<String>,
        subject_header: impl Into<String>,
        text_snippet: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_header: sender_header.into(),
            subject_header: subject_header.into(),
            text_snippet: text_snippet.into(),
        }
    }
}

/// Which part of a message a rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionType {
    Sender,
    Subject,
    Keyword,
    /// Anything not recognised when settings were loaded; never matches
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConditionType::Sender => "sender",
            ConditionType::Subject => "subject",
            ConditionType::Keyword => "keyword",
            ConditionType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ConditionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sender" => Ok(ConditionType::Sender),
            "subject" => Ok(ConditionType::Subject),
            "keyword" => Ok(ConditionType::Keyword),
            other => Err(format!(
                "unknown condition type '{}': expected sender, subject or keyword",
                other
            )),
        }
    }
}

/// User-defined condition -> label mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub condition_type: ConditionType,
    pub condition_value: String,
    pub target_label_name: String,
    /// Filled in lazily after the label is first resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_label_id: Option<String>,
}

impl Rule {
    pub fn new(
        condition_type: ConditionType,
        condition_value: impl Into<String>,
        target_label_name: impl Into<String>,
    ) -> Self {
        Self {
            condition_type,
            condition_value: condition_value.into(),
            target_label_name: target_label_name.into(),
            target_label_id: None,
        }
    }

    /// Same condition and target, ignoring the cached label id
    pub fn same_definition(&self, other: &Rule) -> bool {
        self.condition_type == other.condition_type
            && self.condition_value == other.condition_value
            && self.target_label_name == other.target_label_name
    }
}

/// Lifecycle state of a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
    FailedCreation,
}

impl SuggestionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SuggestionStatus::Pending)
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Approved => "approved",
            SuggestionStatus::Rejected => "rejected",
            SuggestionStatus::FailedCreation => "failed_creation",
        };
        f.write_str(name)
    }
}

/// A label proposed from repeated sender-domain/label co-occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub suggested_name: String,
    pub based_on_domain: String,
    pub based_on_label_id: String,
    pub based_on_label_name: String,
    pub status: SuggestionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_label_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl Suggestion {
    /// Build a fresh pending suggestion for a (domain, label) pair
    pub fn pending(domain: &str, label_id: &str, label_name: &str) -> Self {
        Self {
            id: format!("sugg-{}", uuid::Uuid::new_v4()),
            suggested_name: Self::candidate_name(label_name, domain),
            based_on_domain: domain.to_string(),
            based_on_label_id: label_id.to_string(),
            based_on_label_name: label_name.to_string(),
            status: SuggestionStatus::Pending,
            created_label_id: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    /// Name a suggestion for `label_name` and `domain` would carry
    pub fn candidate_name(label_name: &str, domain: &str) -> String {
        format!("{} - {}", label_name, domain)
    }

    pub fn is_pending(&self) -> bool {
        self.status == SuggestionStatus::Pending
    }
}

/// Human decision on a pending suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}
