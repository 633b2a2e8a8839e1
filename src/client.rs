//! Gmail API client with retry logic

use async_trait::async_trait;
use google_gmail1::{
    api::{Label, Message, MessagePart, ModifyMessageRequest},
    hyper_rustls, hyper_util, Gmail,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{LabelerError, Result};
use crate::models::NormalizedMessage;

/// Gmail's system label marking a message unread
pub const UNREAD_LABEL: &str = "UNREAD";

/// Longest text snippet kept from a message body
pub const MAX_SNIPPET_CHARS: usize = 1000;

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Mail and label store operations the engine depends on
#[async_trait]
pub trait MailClient: Send + Sync {
    /// List up to `limit` unread message IDs in the store's default order
    async fn list_unread_message_ids(&self, limit: usize) -> Result<Vec<String>>;

    /// Fetch a message and project it to headers plus a text snippet
    async fn get_message(&self, id: &str) -> Result<NormalizedMessage>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label
    async fn create_label(&self, name: &str) -> Result<LabelInfo>;

    /// Add and remove labels on one message
    async fn modify_message_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()>;
}

type GmailConnector = hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// Production Gmail client
///
/// Label listing and creation are retried with exponential backoff on
/// transient errors. Message calls are not retried; the next cycle picks up
/// anything left unread.
pub struct ProductionGmailClient {
    hub: Gmail<GmailConnector>,
    max_retries: u32,
}

impl ProductionGmailClient {
    /// Create a new production Gmail client
    pub fn new(hub: Gmail<GmailConnector>, max_retries: u32) -> Self {
        Self { hub, max_retries }
    }

    /// Check if an error is retryable
    fn should_retry(error: &LabelerError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Parse Gmail API Message into a NormalizedMessage
fn parse_message(msg: Message) -> Result<NormalizedMessage> {
    let id = msg
        .id
        .ok_or_else(|| LabelerError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let payload = msg
        .payload
        .ok_or_else(|| LabelerError::InvalidMessageFormat("Missing payload".to_string()))?;

    let mut sender_header = String::new();
    let mut subject_header = String::new();

    for header in payload.headers.iter().flatten() {
        if let (Some(name), Some(value)) = (&header.name, &header.value) {
            match name.to_lowercase().as_str() {
                "from" => sender_header = value.clone(),
                "subject" => subject_header = value.clone(),
                _ => {}
            }
        }
    }

    let text_snippet = find_plain_text(&payload)
        .or(msg.snippet)
        .map(|text| truncate_chars(&text, MAX_SNIPPET_CHARS))
        .unwrap_or_default();

    Ok(NormalizedMessage {
        id,
        sender_header,
        subject_header,
        text_snippet,
    })
}

/// Depth-first search for the first non-empty text/plain body part
fn find_plain_text(part: &MessagePart) -> Option<String> {
    let is_plain = part
        .mime_type
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("text/plain"));

    if is_plain {
        if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
            let text = String::from_utf8_lossy(data).trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    part.parts.iter().flatten().find_map(find_plain_text)
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[async_trait]
impl MailClient for ProductionGmailClient {
    async fn list_unread_message_ids(&self, limit: usize) -> Result<Vec<String>> {
        let (_, response) = self
            .hub
            .users()
            .messages_list("me")
            .q("is:unread")
            .max_results(limit as u32)
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        let ids: Vec<String> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .take(limit)
            .collect();

        debug!("Listed {} unread messages", ids.len());
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<NormalizedMessage> {
        let (_, msg) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        parse_message(msg)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", self.max_retries, || async {
            let (_, response) = self
                .hub
                .users()
                .labels_list("me")
                .add_scope("https://www.googleapis.com/auth/gmail.labels")
                .doit()
                .await?;

            let labels: Vec<LabelInfo> = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                    _ => None,
                })
                .collect();

            debug!("Successfully parsed {} labels", labels.len());
            Ok(labels)
        })
        .await
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        let name = name.to_string();
        Self::with_retry("create_label", self.max_retries, || async {
            let label = Label {
                name: Some(name.clone()),
                message_list_visibility: Some("show".to_string()),
                label_list_visibility: Some("labelShow".to_string()),
                ..Default::default()
            };

            let (_, created) = self
                .hub
                .users()
                .labels_create(label, "me")
                .add_scope("https://www.googleapis.com/auth/gmail.labels")
                .doit()
                .await?;

            let id = created.id.ok_or_else(|| LabelerError::LabelCreationFailed {
                name: name.clone(),
                reason: "Created label has no ID".to_string(),
            })?;

            Ok(LabelInfo {
                id,
                name: created.name.unwrap_or_else(|| name.clone()),
            })
        })
        .await
    }

    async fn modify_message_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        let modify_request = ModifyMessageRequest {
            add_label_ids: (!add_label_ids.is_empty()).then(|| add_label_ids.to_vec()),
            remove_label_ids: (!remove_label_ids.is_empty()).then(|| remove_label_ids.to_vec()),
        };

        self.hub
            .users()
            .messages_modify(modify_request, "me", message_id)
            .add_scope("https://www.googleapis.com/auth/gmail.modify")
            .doit()
            .await?;

        Ok(())
    }
}

// Shared ownership between the engine and the CLI
#[async_trait]
impl<C: MailClient + ?Sized> MailClient for Arc<C> {
    async fn list_unread_message_ids(&self, limit: usize) -> Result<Vec<String>> {
        self.as_ref().list_unread_message_ids(limit).await
    }

    async fn get_message(&self, id: &str) -> Result<NormalizedMessage> {
        self.as_ref().get_message(id).await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn create_label(&self, name: &str) -> Result<LabelInfo> {
        self.as_ref().create_label(name).await
    }

    async fn modify_message_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        self.as_ref()
            .modify_message_labels(message_id, add_label_ids, remove_label_ids)
            .await
    }
}
