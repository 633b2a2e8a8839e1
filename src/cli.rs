//! Command-line interface

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::client::ProductionGmailClient;
use crate::config::Config;
use crate::engine::{CycleReport, Labeler};
use crate::error::{LabelerError, Result};
use crate::models::{ConditionType, Decision, Rule, Suggestion};
use crate::settings::Settings;
use crate::spam::SpamConfig;
use crate::storage::JsonFileStore;

#[derive(Parser, Debug)]
#[command(name = "gmail-labeler")]
#[command(version = "0.1.0")]
#[command(about = "Rule-based Gmail labeling with learned label suggestions", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-labeler/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Process one batch of unread messages now
    Run,

    /// Process unread messages periodically until interrupted
    Daemon,

    /// Show last run, rule count and pending suggestions
    Status,

    /// Show or import settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Manage labeling rules
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Configure spam detection
    #[command(subcommand)]
    Spam(SpamCommand),

    /// List label suggestions
    Suggestions {
        /// Include approved, rejected and failed suggestions
        #[arg(long)]
        all: bool,
    },

    /// Approve a pending suggestion and create its label
    Approve { id: String },

    /// Reject a pending suggestion
    Reject { id: String },

    /// Decide pending suggestions one by one
    Review,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print current settings as JSON
    Show,
    /// Replace settings with the contents of a JSON or TOML file
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// List rules in evaluation order
    List,
    /// Append a rule
    Add(AddRuleArgs),
    /// Remove a rule by its position in `rules list`
    Remove { position: usize },
}

#[derive(Args, Debug)]
pub struct AddRuleArgs {
    /// sender, subject or keyword
    #[arg(long = "type", value_parser = parse_condition_type)]
    pub condition_type: ConditionType,

    /// Text to look for (case-insensitive)
    #[arg(long)]
    pub value: String,

    /// Label to apply on match
    #[arg(long)]
    pub label: String,
}

#[derive(Subcommand, Debug)]
pub enum SpamCommand {
    Enable,
    Disable,
    /// Flag subjects containing this keyword
    AddKeyword { keyword: String },
    /// Flag senders whose domain ends with this domain
    AddDomain { domain: String },
}

fn parse_condition_type(s: &str) -> std::result::Result<ConditionType, String> {
    s.parse()
}

/// Spinner shown while a cycle or API call is in flight
pub struct ProgressReporter {
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self { spinner_style }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings store under the configured state directory
pub fn open_store(config: &Config) -> Arc<JsonFileStore> {
    Arc::new(JsonFileStore::new(&config.storage.state_dir))
}

/// Authenticate and assemble a [`Labeler`] over the Gmail API
pub async fn build_labeler(cli: &Cli, config: &Config) -> Result<Labeler> {
    let hub = crate::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    let client = Arc::new(ProductionGmailClient::new(hub, config.processing.max_retries));
    Ok(Labeler::new(client, open_store(config), config))
}

/// Parse settings from a `.toml` file, or JSON for any other extension
pub async fn read_settings_file(path: &Path) -> Result<Settings> {
    let content = tokio::fs::read_to_string(path).await?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

    let settings: Settings = if is_toml {
        toml::from_str(&content).map_err(|e| {
            LabelerError::ConfigError(format!("Failed to parse settings file: {}", e))
        })?
    } else {
        serde_json::from_str(&content).map_err(|e| {
            LabelerError::ConfigError(format!("Failed to parse settings file: {}", e))
        })?
    };
    settings.validate()?;
    Ok(settings)
}

pub fn apply_spam_command(spam: &mut SpamConfig, command: &SpamCommand) {
    match command {
        SpamCommand::Enable => spam.enabled = true,
        SpamCommand::Disable => spam.enabled = false,
        SpamCommand::AddKeyword { keyword } => {
            spam.keywords.insert(keyword.trim().to_string());
        }
        SpamCommand::AddDomain { domain } => {
            spam.suspicious_domains.insert(domain.trim().to_lowercase());
        }
    }
}

/// Remove the rule at 1-based `position`
pub fn remove_rule(settings: &mut Settings, position: usize) -> Result<Rule> {
    if position == 0 || position > settings.rules.len() {
        return Err(LabelerError::ConfigError(format!(
            "No rule at position {} ({} rules defined)",
            position,
            settings.rules.len()
        )));
    }
    Ok(settings.rules.remove(position - 1))
}

pub fn print_rules(settings: &Settings) {
    if settings.rules.is_empty() {
        println!("No rules defined.");
        return;
    }
    for (i, rule) in settings.rules.iter().enumerate() {
        println!(
            "{:>3}. {:<8} {:<32} -> {}{}",
            i + 1,
            rule.condition_type.to_string(),
            truncate_string(&rule.condition_value, 32),
            rule.target_label_name,
            rule.target_label_id
                .as_deref()
                .map(|id| format!(" ({})", id))
                .unwrap_or_default()
        );
    }
}

pub fn print_suggestions(suggestions: &[Suggestion]) {
    if suggestions.is_empty() {
        println!("No suggestions.");
        return;
    }
    for s in suggestions {
        println!(
            "{}  {:<16} {}  (from label '{}', created {})",
            s.id,
            s.status.to_string(),
            s.suggested_name,
            s.based_on_label_name,
            s.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

pub fn print_report(report: &CycleReport) {
    println!("\n========================================");
    println!("Processing Cycle Summary");
    println!("========================================");
    println!("Messages fetched: {}", report.fetched);
    println!("Messages labeled: {}", report.labeled);
    println!("  as spam: {}", report.spam);
    println!("  by rule: {}", report.rule_matched);
    println!("Messages skipped: {}", report.skipped);
    println!("Messages failed: {}", report.failed);
    println!("New suggestions: {}", report.suggestions_created);
    if let Some(at) = report.completed_at {
        println!("Completed: {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("========================================");
}

/// Walk pending suggestions and ask for a decision on each
///
/// Returns the number of suggestions decided; skipped ones stay pending.
pub async fn review_suggestions(labeler: &Labeler) -> Result<usize> {
    let pending = labeler.get_suggested_labels(false).await?;
    if pending.is_empty() {
        println!("No pending suggestions.");
        return Ok(0);
    }

    const APPROVE: &str = "Approve";
    const REJECT: &str = "Reject";
    const SKIP: &str = "Skip";
    const QUIT: &str = "Quit";

    let mut decided = 0;
    for (i, suggestion) in pending.iter().enumerate() {
        println!(
            "\n[{}/{}] '{}' (messages from {} labeled '{}')",
            i + 1,
            pending.len(),
            suggestion.suggested_name,
            suggestion.based_on_domain,
            suggestion.based_on_label_name
        );

        let choice = inquire::Select::new("Decision:", vec![APPROVE, REJECT, SKIP, QUIT])
            .prompt()
            .unwrap_or(QUIT);

        let decision = match choice {
            APPROVE => Decision::Approve,
            REJECT => Decision::Reject,
            SKIP => continue,
            _ => break,
        };

        match labeler.decide_suggestion(&suggestion.id, decision).await {
            Ok(updated) => {
                println!("  -> {}", updated.status);
                decided += 1;
            }
            Err(e) if e.requires_reauth() => return Err(e),
            Err(e) => tracing::warn!("Could not decide {}: {}", suggestion.id, e),
        }
    }

    Ok(decided)
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}
