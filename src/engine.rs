//! The labeling context: processing cycles and suggestion decisions
//!
//! [`Labeler`] owns the collaborators (mail client, storage, notifier) and
//! relies on two locks to keep state consistent:
//!
//! - the cycle guard admits one processing cycle at a time; a second caller
//!   gets [`LabelerError::CycleInProgress`] instead of waiting
//! - the store's writer lock ([`Storage::lock`]) covers every
//!   read-modify-write of the `settings` and `suggestions` keys, from inside a
//!   cycle and from decisions made while a cycle runs, including decisions
//!   made by another process sharing the same state directory

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::classifier::{ClassificationOutcome, MatchedRule, MessageClassifier};
use crate::client::MailClient;
use crate::config::Config;
use crate::error::{LabelerError, Result};
use crate::label_resolver::LabelResolver;
use crate::learner::{DomainLabelCounters, PatternLearner};
use crate::models::{ConditionType, Decision, NormalizedMessage, Rule, Suggestion, SuggestionStatus};
use crate::notifier::{LogNotifier, SuggestionNotifier};
use crate::settings::Settings;
use crate::storage::{load_as, save_as, Storage, COUNTERS_KEY, SUGGESTIONS_KEY};
use crate::suggestions::SuggestionStore;

/// Summary of one processing cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Unread message ids returned by the listing
    pub fetched: usize,
    /// Messages that had labels applied
    pub labeled: usize,
    pub spam: usize,
    pub rule_matched: usize,
    /// Messages left untouched because nothing applied
    pub skipped: usize,
    /// Messages whose fetch, classification or label application failed
    pub failed: usize,
    pub suggestions_created: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct Labeler {
    client: Arc<dyn MailClient>,
    store: Arc<dyn Storage>,
    notifier: Arc<dyn SuggestionNotifier>,
    classifier: MessageClassifier,
    learner: PatternLearner,
    batch_size: usize,
    cycle_guard: Mutex<()>,
}

impl Labeler {
    pub fn new(client: Arc<dyn MailClient>, store: Arc<dyn Storage>, config: &Config) -> Self {
        Self {
            client,
            store,
            notifier: Arc::new(LogNotifier),
            classifier: MessageClassifier::new(config.labels.spam_label.clone()),
            learner: PatternLearner::new(config.processing.pattern_threshold),
            batch_size: config.processing.batch_size,
            cycle_guard: Mutex::new(()),
        }
    }

    /// Replace the default logging notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn SuggestionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub async fn get_settings(&self) -> Result<Settings> {
        Settings::load(self.store.as_ref()).await
    }

    /// Validate and persist settings; takes effect at the next cycle
    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        Settings::update(self.store.as_ref(), |stored| {
            *stored = settings.clone();
            Ok(())
        })
        .await?;
        info!("Settings saved ({} rules)", settings.rules.len());
        Ok(())
    }

    /// Suggestions awaiting a decision, or every suggestion when `include_decided`
    pub async fn get_suggested_labels(&self, include_decided: bool) -> Result<Vec<Suggestion>> {
        let store = self.load_suggestions().await?;
        let suggestions = if include_decided {
            store.all().to_vec()
        } else {
            store.pending().cloned().collect()
        };
        Ok(suggestions)
    }

    pub async fn domain_label_counters(&self) -> Result<DomainLabelCounters> {
        Ok(load_as(self.store.as_ref(), COUNTERS_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Run one processing cycle now
    pub async fn process_now(&self) -> Result<CycleReport> {
        self.run_cycle().await
    }

    /// Classify, label and learn from a bounded batch of unread messages
    ///
    /// Fails without touching the completion timestamp when the unread listing
    /// fails or authentication is lost mid-cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _guard = self
            .cycle_guard
            .try_lock()
            .map_err(|_| LabelerError::CycleInProgress)?;

        info!("Starting processing cycle");

        let (mut settings, settings_loaded) = match Settings::load(self.store.as_ref()).await {
            Ok(settings) => (settings, true),
            Err(e) => {
                warn!("Failed to load settings, using defaults for this cycle: {}", e);
                (Settings::default(), false)
            }
        };

        let mut resolver = LabelResolver::new(Arc::clone(&self.client));
        if let Err(e) = resolver.refresh().await {
            if e.requires_reauth() {
                return Err(e);
            }
            warn!("Failed to refresh label cache: {}", e);
        }

        let mut counters = self.domain_label_counters().await?;

        let ids = match self.client.list_unread_message_ids(self.batch_size).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Failed to list unread messages: {}", e);
                return Err(e);
            }
        };

        let mut report = CycleReport {
            fetched: ids.len(),
            ..Default::default()
        };
        debug!("Processing {} unread messages", ids.len());

        let mut abort = None;
        for id in &ids {
            if let Err(e) = self
                .process_message(id, &mut settings, &mut resolver, &mut counters, &mut report)
                .await
            {
                // Only auth loss escapes process_message
                abort = Some(e);
                break;
            }
        }

        if let Err(e) = save_as(self.store.as_ref(), COUNTERS_KEY, &counters).await {
            warn!("Failed to persist domain/label counters: {}", e);
        }

        if let Some(e) = abort {
            error!("Processing cycle aborted: {}", e);
            self.write_back_settings(&settings, None, settings_loaded).await;
            return Err(e);
        }

        let completed_at = Utc::now();
        report.completed_at = Some(completed_at);
        self.write_back_settings(&settings, Some(completed_at), settings_loaded)
            .await;

        info!(
            "Cycle complete: {} fetched, {} labeled ({} spam, {} by rule), {} skipped, {} failed, {} new suggestions",
            report.fetched,
            report.labeled,
            report.spam,
            report.rule_matched,
            report.skipped,
            report.failed,
            report.suggestions_created
        );
        Ok(report)
    }

    /// Fetch, classify, apply and learn for one message
    ///
    /// Transport failures are counted and swallowed; only errors that need
    /// re-authentication are returned.
    async fn process_message(
        &self,
        id: &str,
        settings: &mut Settings,
        resolver: &mut LabelResolver,
        counters: &mut DomainLabelCounters,
        report: &mut CycleReport,
    ) -> Result<()> {
        let message = match self.client.get_message(id).await {
            Ok(message) => message,
            Err(e) => return Self::count_failure(report, id, "fetch", e),
        };

        let outcome = match self.classifier.classify(&message, settings, resolver).await {
            Ok(outcome) => outcome,
            Err(e) => return Self::count_failure(report, id, "classify", e),
        };

        if outcome.is_empty() {
            report.skipped += 1;
        } else {
            match self.classifier.apply(self.client.as_ref(), id, &outcome).await {
                Ok(_) => Self::count_applied(report, &outcome),
                Err(e) => Self::count_failure(report, id, "label", e)?,
            }
        }

        if settings.pattern_detection_enabled {
            if let Some(matched) = &outcome.matched_rule {
                if self.learn(&message, matched, counters, resolver).await {
                    report.suggestions_created += 1;
                }
            }
        }

        Ok(())
    }

    fn count_applied(report: &mut CycleReport, outcome: &ClassificationOutcome) {
        report.labeled += 1;
        if outcome.is_spam() {
            report.spam += 1;
        } else if outcome.matched_rule.is_some() {
            report.rule_matched += 1;
        }
    }

    fn count_failure(report: &mut CycleReport, id: &str, stage: &str, e: LabelerError) -> Result<()> {
        if e.requires_reauth() {
            return Err(e);
        }
        warn!("Failed to {} message {}: {}", stage, id, e);
        report.failed += 1;
        Ok(())
    }

    /// Feed the learner and persist any suggestion it emits
    async fn learn(
        &self,
        message: &NormalizedMessage,
        matched: &MatchedRule,
        counters: &mut DomainLabelCounters,
        resolver: &LabelResolver,
    ) -> bool {
        let _lock = match self.store.lock().await {
            Ok(lock) => lock,
            Err(e) => {
                warn!("Skipping pattern learning for {}: {}", message.id, e);
                return false;
            }
        };

        let mut suggestions = match self.load_suggestions().await {
            Ok(store) => store,
            Err(e) => {
                warn!("Skipping pattern learning for {}: {}", message.id, e);
                return false;
            }
        };

        let suggestion = match self
            .learner
            .observe(message, matched, counters, &suggestions, resolver.cache())
        {
            Some(suggestion) => suggestion,
            None => return false,
        };

        suggestions.insert(suggestion.clone());
        if let Err(e) = save_as(self.store.as_ref(), SUGGESTIONS_KEY, &suggestions).await {
            warn!("Failed to persist suggestion '{}': {}", suggestion.suggested_name, e);
            return false;
        }

        self.notifier.suggestion_created(&suggestion);
        true
    }

    /// Persist the cycle's deltas on top of the latest stored settings
    async fn write_back_settings(
        &self,
        cycle_view: &Settings,
        completed_at: Option<DateTime<Utc>>,
        settings_loaded: bool,
    ) {
        if !settings_loaded {
            warn!("Settings were unavailable at cycle start, not writing them back");
            return;
        }

        let _lock = match self.store.lock().await {
            Ok(lock) => lock,
            Err(e) => {
                warn!("Failed to lock settings for write-back: {}", e);
                return;
            }
        };
        let latest = match Settings::load(self.store.as_ref()).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!("Failed to reload settings for write-back: {}", e);
                return;
            }
        };

        let merged = latest.merge_cycle_deltas(cycle_view, completed_at);
        if let Err(e) = merged.save(self.store.as_ref()).await {
            warn!("Failed to persist settings after cycle: {}", e);
        }
    }

    async fn load_suggestions(&self) -> Result<SuggestionStore> {
        Ok(load_as(self.store.as_ref(), SUGGESTIONS_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Create the suggested label and, if enabled, a sender rule for it
    ///
    /// A label that cannot be created moves the suggestion to
    /// `failed_creation`; the returned suggestion carries the final status.
    pub async fn approve_suggestion(&self, id: &str) -> Result<Suggestion> {
        let _lock = self.store.lock().await?;

        let mut suggestions = self.load_suggestions().await?;
        let pending = suggestions.pending_by_id(id)?.clone();

        let mut resolver = LabelResolver::new(Arc::clone(&self.client));
        let updated = match resolver.resolve(&pending.suggested_name).await? {
            Some(label_id) => suggestions.mark_approved(id, label_id)?.clone(),
            None => {
                warn!(
                    "Could not create label '{}' for suggestion {}",
                    pending.suggested_name, id
                );
                suggestions.mark_failed(id)?.clone()
            }
        };
        save_as(self.store.as_ref(), SUGGESTIONS_KEY, &suggestions).await?;

        if updated.status == SuggestionStatus::Approved {
            info!("Approved suggestion '{}'", updated.suggested_name);
            self.add_rule_for(&updated).await?;
        }

        Ok(updated)
    }

    pub async fn reject_suggestion(&self, id: &str) -> Result<Suggestion> {
        let _lock = self.store.lock().await?;

        let mut suggestions = self.load_suggestions().await?;
        let updated = suggestions.mark_rejected(id)?.clone();
        save_as(self.store.as_ref(), SUGGESTIONS_KEY, &suggestions).await?;

        info!("Rejected suggestion '{}'", updated.suggested_name);
        Ok(updated)
    }

    /// Single entry point for interactive decisions
    pub async fn decide_suggestion(&self, id: &str, decision: Decision) -> Result<Suggestion> {
        match decision {
            Decision::Approve => self.approve_suggestion(id).await,
            Decision::Reject => self.reject_suggestion(id).await,
        }
    }

    /// Append `sender "@<domain>"` -> created label when auto rule creation is on
    ///
    /// Caller holds the store's writer lock.
    async fn add_rule_for(&self, suggestion: &Suggestion) -> Result<()> {
        let mut settings = Settings::load(self.store.as_ref()).await?;
        if !settings.auto_create_rules_from_suggestions {
            return Ok(());
        }

        let mut rule = Rule::new(
            ConditionType::Sender,
            format!("@{}", suggestion.based_on_domain),
            suggestion.suggested_name.clone(),
        );
        rule.target_label_id = suggestion.created_label_id.clone();

        if settings.rules.iter().any(|r| r.same_definition(&rule)) {
            debug!("Rule for '{}' already exists", suggestion.suggested_name);
            return Ok(());
        }

        settings.rules.push(rule);
        settings.save(self.store.as_ref()).await?;
        info!(
            "Added sender rule '@{}' -> '{}'",
            suggestion.based_on_domain, suggestion.suggested_name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LabelInfo;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    mockall::mock! {
        pub TestMailClient {}

        #[async_trait]
        impl MailClient for TestMailClient {
            async fn list_unread_message_ids(&self, limit: usize) -> Result<Vec<String>>;
            async fn get_message(&self, id: &str) -> Result<NormalizedMessage>;
            async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
            async fn create_label(&self, name: &str) -> Result<LabelInfo>;
            async fn modify_message_labels(&self, message_id: &str, add_label_ids: &[String], remove_label_ids: &[String]) -> Result<()>;
        }
    }

    #[tokio::test]
    async fn test_second_cycle_is_rejected_while_one_runs() {
        let mut mock = MockTestMailClient::new();
        mock.expect_list_labels().times(0);
        mock.expect_list_unread_message_ids().times(0);

        let labeler = Labeler::new(
            Arc::new(mock),
            Arc::new(MemoryStore::new()),
            &Config::default(),
        );

        let _running = labeler.cycle_guard.try_lock().unwrap();
        let result = labeler.run_cycle().await;
        assert!(matches!(result, Err(LabelerError::CycleInProgress)));
    }

    #[tokio::test]
    async fn test_empty_inbox_records_timestamp() {
        let mut mock = MockTestMailClient::new();
        mock.expect_list_labels().returning(|| Ok(vec![]));
        mock.expect_list_unread_message_ids()
            .times(1)
            .returning(|_| Ok(vec![]));

        let store = Arc::new(MemoryStore::new());
        Settings::default().save(store.as_ref()).await.unwrap();
        let labeler = Labeler::new(Arc::new(mock), store.clone(), &Config::default());

        let report = labeler.run_cycle().await.unwrap();
        assert_eq!(report.fetched, 0);

        let settings = Settings::load(store.as_ref()).await.unwrap();
        assert_eq!(settings.last_processed_timestamp, report.completed_at);
    }

    #[tokio::test]
    async fn test_batch_size_limits_listing() {
        let mut mock = MockTestMailClient::new();
        mock.expect_list_labels().returning(|| Ok(vec![]));
        mock.expect_list_unread_message_ids()
            .withf(|limit| *limit == 4)
            .times(1)
            .returning(|_| Ok(vec![]));

        let mut config = Config::default();
        config.processing.batch_size = 4;
        let labeler = Labeler::new(Arc::new(mock), Arc::new(MemoryStore::new()), &config);

        labeler.run_cycle().await.unwrap();
    }
}
