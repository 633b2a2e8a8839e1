//! Sender-domain/label co-occurrence counting and suggestion emission

use crate::classifier::MatchedRule;
use crate::label_resolver::LabelCache;
use crate::models::{NormalizedMessage, Suggestion};
use crate::suggestions::SuggestionStore;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Default number of co-occurrences before a suggestion is proposed
pub const DEFAULT_PATTERN_THRESHOLD: u64 = 3;

static SENDER_DOMAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([A-Za-z0-9.-]+)").unwrap());

/// Lowercased domain of the first address in a sender header
pub fn extract_domain(sender_header: &str) -> Option<String> {
    SENDER_DOMAIN
        .captures(sender_header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
        .filter(|d| !d.is_empty())
}

/// Persisted `(domain, label id) -> count` map, keyed `"<domain>|<labelId>"`
///
/// Counts only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainLabelCounters {
    counts: BTreeMap<String, u64>,
}

impl DomainLabelCounters {
    fn key(domain: &str, label_id: &str) -> String {
        format!("{}|{}", domain, label_id)
    }

    pub fn get(&self, domain: &str, label_id: &str) -> u64 {
        self.counts
            .get(&Self::key(domain, label_id))
            .copied()
            .unwrap_or(0)
    }

    /// Increment and return the new count
    pub fn increment(&mut self, domain: &str, label_id: &str) -> u64 {
        let count = self.counts.entry(Self::key(domain, label_id)).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

pub struct PatternLearner {
    threshold: u64,
}

impl Default for PatternLearner {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_THRESHOLD)
    }
}

impl PatternLearner {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    /// Record that `message` received `matched` and propose a suggestion when
    /// the pair crosses the threshold
    ///
    /// A candidate is dropped if any suggestion already carries its name (any
    /// status, case-insensitive) or a label of that name already exists. The
    /// returned suggestion is not yet in `suggestions`; the caller inserts and
    /// persists it.
    pub fn observe(
        &self,
        message: &NormalizedMessage,
        matched: &MatchedRule,
        counters: &mut DomainLabelCounters,
        suggestions: &SuggestionStore,
        labels: &LabelCache,
    ) -> Option<Suggestion> {
        let domain = extract_domain(&message.sender_header)?;
        let count = counters.increment(&domain, &matched.label_id);

        if count < self.threshold {
            return None;
        }

        let candidate = Suggestion::candidate_name(&matched.label_name, &domain);
        if suggestions.has_name(&candidate) {
            debug!("Suggestion '{}' already exists", candidate);
            return None;
        }
        if labels.contains_name(&candidate) {
            debug!("Label '{}' already exists, not suggesting", candidate);
            return None;
        }

        Some(Suggestion::pending(
            &domain,
            &matched.label_id,
            &matched.label_name,
        ))
    }
}
