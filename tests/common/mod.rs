//! Common test utilities and fixtures

use async_trait::async_trait;
use gmail_labeler::client::{LabelInfo, MailClient, UNREAD_LABEL};
use gmail_labeler::config::Config;
use gmail_labeler::engine::Labeler;
use gmail_labeler::error::{LabelerError, Result};
use gmail_labeler::models::{NormalizedMessage, Suggestion};
use gmail_labeler::notifier::SuggestionNotifier;
use gmail_labeler::storage::{MemoryStore, Storage, StoreLock, SUGGESTIONS_KEY};
use mockall::mock;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Create a test message with an empty snippet
pub fn create_test_message(id: &str, sender: &str, subject: &str) -> NormalizedMessage {
    NormalizedMessage::new(id, sender, subject, "")
}

/// Message from the billing sender used across end-to-end tests
pub fn create_billing_message(id: &str) -> NormalizedMessage {
    create_test_message(id, "Billing <alerts@billing.example.com>", "Your monthly statement")
}

pub fn create_test_label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

/// One recorded `modify_message_labels` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub message_id: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    labels: Vec<LabelInfo>,
    messages: Vec<NormalizedMessage>,
    read: HashSet<String>,
    modifications: Vec<Modification>,
    created: Vec<String>,
    fail_listing: bool,
    fail_fetch: HashSet<String>,
    fail_create: bool,
    next_label: usize,
}

/// In-memory Gmail with labels, an unread queue and failure switches
#[derive(Debug, Default)]
pub struct FakeMailClient {
    state: Mutex<FakeState>,
    listing_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeMailClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_label(self, id: &str, name: &str) -> Self {
        self.state().labels.push(create_test_label_info(id, name));
        self
    }

    pub fn add_unread(&self, message: NormalizedMessage) {
        self.state().messages.push(message);
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    pub fn fail_fetch_of(&self, id: &str) {
        self.state().fail_fetch.insert(id.to_string());
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.state().fail_create = fail;
    }

    /// Make the next listings wait until `gate` is notified
    pub fn hold_listing(&self, gate: Arc<Notify>) {
        *self.listing_gate.lock().unwrap() = Some(gate);
    }

    pub fn modifications(&self) -> Vec<Modification> {
        self.state().modifications.clone()
    }

    /// Names passed to successful `create_label` calls, in order
    pub fn created_labels(&self) -> Vec<String> {
        self.state().created.clone()
    }

    pub fn label_id(&self, name: &str) -> Option<String> {
        self.state()
            .labels
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .map(|l| l.id.clone())
    }

    pub fn unread_count(&self) -> usize {
        let state = self.state();
        state
            .messages
            .iter()
            .filter(|m| !state.read.contains(&m.id))
            .count()
    }
}

#[async_trait]
impl MailClient for FakeMailClient {
    async fn list_unread_message_ids(&self, limit: usize) -> Result<Vec<String>> {
        let gate = self.listing_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let state = self.state();
        if state.fail_listing {
            return Err(LabelerError::NetworkError("connection refused".to_string()));
        }
        Ok(state
            .messages
            .iter()
            .filter(|m| !state.read.contains(&m.id))
            .take(limit)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn get_message(&self, id: &str) -> Result<NormalizedMessage> {
        let state = self.state();
        if state.fail_fetch.contains(id) {
            return Err(LabelerError::ServerError {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        state
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| LabelerError::NotFound(format!("message {}", id)))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.state().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        let mut state = self.state();
        if state.fail_create {
            return Err(LabelerError::Forbidden("label limit reached".to_string()));
        }
        if state.labels.iter().any(|l| l.name.eq_ignore_ascii_case(name)) {
            return Err(LabelerError::BadRequest("Label name exists or conflicts".to_string()));
        }
        state.next_label += 1;
        let label = create_test_label_info(&format!("Label_new_{}", state.next_label), name);
        state.labels.push(label.clone());
        state.created.push(name.to_string());
        Ok(label)
    }

    async fn modify_message_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        let mut state = self.state();
        if remove_label_ids.iter().any(|l| l == UNREAD_LABEL) {
            state.read.insert(message_id.to_string());
        }
        state.modifications.push(Modification {
            message_id: message_id.to_string(),
            added: add_label_ids.to_vec(),
            removed: remove_label_ids.to_vec(),
        });
        Ok(())
    }
}

/// Notifier that keeps every suggestion it is given
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Suggestion>>,
}

impl RecordingNotifier {
    pub fn seen(&self) -> Vec<Suggestion> {
        self.seen.lock().unwrap().clone()
    }
}

impl SuggestionNotifier for RecordingNotifier {
    fn suggestion_created(&self, suggestion: &Suggestion) {
        self.seen.lock().unwrap().push(suggestion.clone());
    }
}

/// Memory store that can park the next `suggestions` save until released
#[derive(Debug, Default)]
pub struct GatedStore {
    inner: MemoryStore,
    armed: AtomicBool,
    parked: AtomicBool,
    gate: Notify,
}

impl GatedStore {
    pub fn hold_next_suggestions_save(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Whether a save is currently waiting for [`GatedStore::release`]
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl Storage for GatedStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        self.inner.load(key).await
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        if key == SUGGESTIONS_KEY && self.armed.swap(false, Ordering::SeqCst) {
            self.parked.store(true, Ordering::SeqCst);
            self.gate.notified().await;
            self.parked.store(false, Ordering::SeqCst);
        }
        self.inner.save(key, value).await
    }

    async fn lock(&self) -> Result<StoreLock> {
        self.inner.lock().await
    }
}

/// Fake client, memory store and recording notifier wired into a labeler
pub struct Harness {
    pub client: Arc<FakeMailClient>,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub labeler: Labeler,
}

impl Harness {
    pub fn new(client: FakeMailClient) -> Self {
        Self::with_config(client, &Config::default())
    }

    pub fn with_config(client: FakeMailClient, config: &Config) -> Self {
        let client = Arc::new(client);
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let labeler = Labeler::new(client.clone(), store.clone(), config)
            .with_notifier(notifier.clone());
        Self {
            client,
            store,
            notifier,
            labeler,
        }
    }
}

// Mock implementation of MailClient for testing
mock! {
    pub MailClient {}

    #[async_trait]
    impl MailClient for MailClient {
        async fn list_unread_message_ids(&self, limit: usize) -> Result<Vec<String>>;
        async fn get_message(&self, id: &str) -> Result<NormalizedMessage>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<LabelInfo>;
        async fn modify_message_labels(
            &self,
            message_id: &str,
            add_label_ids: &[String],
            remove_label_ids: &[String],
        ) -> Result<()>;
    }
}
