//! Gmail Labeler
//!
//! Labels incoming Gmail messages from user-defined rules and spam heuristics,
//! and learns label suggestions from recurring sender-domain/label pairs.
//!
//! # Overview
//!
//! - **Matching**: case-insensitive sender, subject and keyword rules, first match wins
//! - **Spam detection**: keyword, domain and punctuation heuristics
//! - **Label resolution**: name to id lookup with on-demand label creation
//! - **Pattern learning**: per-(domain, label) counters that propose new labels
//! - **Suggestions**: a pending/approved/rejected/failed_creation lifecycle
//! - **Processing cycles**: bounded sweeps over unread mail, one at a time
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_labeler::{auth, client::ProductionGmailClient, config::Config, engine::Labeler};
//! use gmail_labeler::storage::JsonFileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-labeler/token.json".as_ref(),
//!     ).await?;
//!
//!     let client = Arc::new(ProductionGmailClient::new(hub, config.processing.max_retries));
//!     let store = Arc::new(JsonFileStore::new(&config.storage.state_dir));
//!     let labeler = Labeler::new(client, store, &config);
//!
//!     let report = labeler.run_cycle().await?;
//!     println!("Labeled {} of {} messages", report.labeled, report.fetched);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Mail client trait and the Gmail implementation
//! - [`matcher`] - Rule evaluation
//! - [`spam`] - Spam heuristics
//! - [`label_resolver`] - Label cache and name resolution
//! - [`classifier`] - Per-message classification and label application
//! - [`learner`] - Domain/label counters and suggestion emission
//! - [`suggestions`] - Suggestion state machine
//! - [`engine`] - The [`Labeler`] context and processing cycle
//! - [`scheduler`] - Periodic cycle trigger
//! - [`settings`] - Persisted user settings
//! - [`storage`] - Key-value persistence
//! - [`config`] - Application configuration
//! - [`cli`] - Command-line interface
//! - [`error`] - Error types and result aliases

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod label_resolver;
pub mod learner;
pub mod matcher;
pub mod models;
pub mod notifier;
pub mod scheduler;
pub mod settings;
pub mod spam;
pub mod storage;
pub mod suggestions;

// Re-export commonly used types for convenience
pub use error::{LabelerError, Result};

// Core data models
pub use models::{ConditionType, Decision, NormalizedMessage, Rule, Suggestion, SuggestionStatus};

// Engine
pub use classifier::{ClassificationOutcome, MatchedRule, MessageClassifier};
pub use engine::{CycleReport, Labeler};
pub use label_resolver::{LabelCache, LabelResolver};
pub use learner::{DomainLabelCounters, PatternLearner};
pub use suggestions::SuggestionStore;

// Config and settings
pub use config::Config;
pub use settings::Settings;
pub use spam::{SpamConfig, SpamHeuristic};

// Collaborator traits
pub use client::{LabelInfo, MailClient, ProductionGmailClient};
pub use notifier::{LogNotifier, SuggestionNotifier};
pub use storage::{JsonFileStore, MemoryStore, Storage, StoreLock};
