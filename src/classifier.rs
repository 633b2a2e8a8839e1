//! Per-message classification: spam check first, then first-match rule labeling

use crate::client::{MailClient, UNREAD_LABEL};
use crate::error::Result;
use crate::label_resolver::LabelResolver;
use crate::matcher;
use crate::models::NormalizedMessage;
use crate::settings::Settings;
use crate::spam::{self, SpamHeuristic};
use tracing::debug;

/// Rule that produced a resolved label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRule {
    pub rule_index: usize,
    pub label_id: String,
    pub label_name: String,
}

/// What should happen to one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationOutcome {
    pub label_ids_to_add: Vec<String>,
    pub matched_rule: Option<MatchedRule>,
    pub spam: Option<SpamHeuristic>,
}

impl ClassificationOutcome {
    pub fn is_spam(&self) -> bool {
        self.spam.is_some()
    }

    /// Nothing to apply; the message stays untouched
    pub fn is_empty(&self) -> bool {
        self.label_ids_to_add.is_empty()
    }
}

pub struct MessageClassifier {
    spam_label: String,
}

impl MessageClassifier {
    pub fn new(spam_label: impl Into<String>) -> Self {
        Self {
            spam_label: spam_label.into(),
        }
    }

    /// Decide the labels for `message`
    ///
    /// Spam short-circuits rule evaluation. Otherwise the first matching rule
    /// in stored order wins; its resolved label id is cached on the rule inside
    /// `settings` so the caller can persist it.
    pub async fn classify(
        &self,
        message: &NormalizedMessage,
        settings: &mut Settings,
        resolver: &mut LabelResolver,
    ) -> Result<ClassificationOutcome> {
        let mut outcome = ClassificationOutcome::default();

        if let Some(heuristic) = spam::detect(message, &settings.spam) {
            debug!("Message {} flagged as spam: {}", message.id, heuristic);
            if let Some(id) = resolver.resolve(&self.spam_label).await? {
                outcome.label_ids_to_add.push(id);
            }
            outcome.spam = Some(heuristic);
            return Ok(outcome);
        }

        let (index, cached_id, target_name) = match matcher::first_match(message, &settings.rules) {
            Some((index, rule)) => (
                index,
                rule.target_label_id.clone(),
                rule.target_label_name.clone(),
            ),
            None => {
                debug!("Message {} matched no rule", message.id);
                return Ok(outcome);
            }
        };

        // A cached id is only trusted while the label still exists
        let label_id = match cached_id.filter(|id| resolver.cache().contains_id(id)) {
            Some(id) => Some(id),
            None => {
                let resolved = resolver.resolve(&target_name).await?;
                if let Some(id) = &resolved {
                    settings.rules[index].target_label_id = Some(id.clone());
                }
                resolved
            }
        };

        match label_id {
            Some(label_id) => {
                let label_name = resolver
                    .cache()
                    .name_for(&label_id)
                    .unwrap_or(target_name.as_str())
                    .to_string();
                debug!(
                    "Message {} matched rule {} -> '{}'",
                    message.id,
                    index + 1,
                    label_name
                );
                outcome.label_ids_to_add.push(label_id.clone());
                outcome.matched_rule = Some(MatchedRule {
                    rule_index: index,
                    label_id,
                    label_name,
                });
            }
            None => debug!(
                "Message {} matched rule {} but label '{}' is unresolved",
                message.id,
                index + 1,
                target_name
            ),
        }

        Ok(outcome)
    }

    /// Add the outcome's labels and mark the message read
    ///
    /// Returns `false` without calling the client when there is nothing to add.
    pub async fn apply(
        &self,
        client: &dyn MailClient,
        message_id: &str,
        outcome: &ClassificationOutcome,
    ) -> Result<bool> {
        if outcome.is_empty() {
            return Ok(false);
        }
        client
            .modify_message_labels(
                message_id,
                &outcome.label_ids_to_add,
                &[UNREAD_LABEL.to_string()],
            )
            .await?;
        Ok(true)
    }
}
