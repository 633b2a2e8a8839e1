use anyhow::Result;
use clap::Parser;
use gmail_labeler::cli::{self, Cli, Commands, RulesCommand, SettingsCommand};
use gmail_labeler::config::Config;
use gmail_labeler::error::LabelerError;
use gmail_labeler::learner::DomainLabelCounters;
use gmail_labeler::models::Rule;
use gmail_labeler::settings::Settings;
use gmail_labeler::storage::{load_as, COUNTERS_KEY, SUGGESTIONS_KEY};
use gmail_labeler::suggestions::SuggestionStore;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        display_error(&e);
        eprintln!("\nFor help, run: gmail-labeler --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // On non-Windows platforms use aws-lc-rs, on Windows ring
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_labeler=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gmail_labeler=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = Config::load(&cli.config).await?;
    tokio::fs::create_dir_all(&config.storage.state_dir).await?;
    let store = cli::open_store(&config);

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            if let Some(parent) = cli.token_cache.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            if *force && cli.token_cache.exists() {
                tokio::fs::remove_file(&cli.token_cache).await?;
                tracing::info!("Removed existing token cache");
            }

            let hub =
                gmail_labeler::auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache)
                    .await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope("https://www.googleapis.com/auth/gmail.modify")
                .doit()
                .await
                .map_err(LabelerError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );
        }

        Commands::Run => {
            let reporter = cli::ProgressReporter::new();
            let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
            let labeler = cli::build_labeler(&cli, &config).await?;
            reporter.finish_spinner(&auth_spinner, "Gmail API authenticated");

            let cycle_spinner = reporter.add_spinner("Processing unread messages...");
            let result = labeler.process_now().await;
            cycle_spinner.finish_and_clear();

            cli::print_report(&result?);
        }

        Commands::Daemon => {
            let labeler = cli::build_labeler(&cli, &config).await?;
            println!("Processing unread messages periodically. Press Ctrl-C to stop.");
            let cycles = gmail_labeler::scheduler::run_until_ctrl_c(&labeler).await?;
            println!("Stopped after {} cycles", cycles);
        }

        Commands::Status => {
            let settings = Settings::load(store.as_ref()).await?;
            let suggestions: SuggestionStore = load_as(store.as_ref(), SUGGESTIONS_KEY)
                .await?
                .unwrap_or_default();
            let counters: DomainLabelCounters = load_as(store.as_ref(), COUNTERS_KEY)
                .await?
                .unwrap_or_default();

            println!("\n========================================");
            println!("Labeler Status");
            println!("========================================");
            match settings.last_processed_timestamp {
                Some(at) => println!("Last processed: {}", at.format("%Y-%m-%d %H:%M:%S")),
                None => println!("Last processed: never"),
            }
            println!("Interval: {} minutes", settings.processing_interval_minutes);
            println!("Rules: {}", settings.rules.len());
            println!(
                "Spam detection: {}",
                if settings.spam.enabled { "enabled" } else { "disabled" }
            );
            println!(
                "Pattern detection: {}",
                if settings.pattern_detection_enabled { "enabled" } else { "disabled" }
            );
            println!("Tracked domain/label pairs: {}", counters.len());
            println!(
                "Suggestions: {} pending, {} total",
                suggestions.pending().count(),
                suggestions.len()
            );
            println!("State directory: {:?}", config.storage.state_dir);
            println!("========================================");
        }

        Commands::Settings(SettingsCommand::Show) => {
            let settings = Settings::load(store.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }

        Commands::Settings(SettingsCommand::Import { file }) => {
            let imported = cli::read_settings_file(file).await?;
            let saved = Settings::update(store.as_ref(), |current| {
                // Keep run history from the current settings
                let last_processed = current.last_processed_timestamp;
                *current = imported;
                current.last_processed_timestamp = last_processed;
                Ok(())
            })
            .await?;
            println!("Imported {} rules from {:?}", saved.rules.len(), file);
        }

        Commands::Rules(RulesCommand::List) => {
            let settings = Settings::load(store.as_ref()).await?;
            cli::print_rules(&settings);
        }

        Commands::Rules(RulesCommand::Add(args)) => {
            let rule = Rule::new(args.condition_type, args.value.clone(), args.label.clone());
            let settings = Settings::update(store.as_ref(), |settings| {
                settings.rules.push(rule);
                Ok(())
            })
            .await?;
            println!("Added rule {}", settings.rules.len());
        }

        Commands::Rules(RulesCommand::Remove { position }) => {
            let mut removed = None;
            Settings::update(store.as_ref(), |settings| {
                removed = Some(cli::remove_rule(settings, *position)?);
                Ok(())
            })
            .await?;
            if let Some(removed) = removed {
                println!(
                    "Removed rule {} ({} '{}' -> {})",
                    position,
                    removed.condition_type,
                    removed.condition_value,
                    removed.target_label_name
                );
            }
        }

        Commands::Spam(command) => {
            let settings = Settings::update(store.as_ref(), |settings| {
                cli::apply_spam_command(&mut settings.spam, command);
                Ok(())
            })
            .await?;
            println!(
                "Spam detection {} ({} keywords, {} domains)",
                if settings.spam.enabled { "enabled" } else { "disabled" },
                settings.spam.keywords.len(),
                settings.spam.suspicious_domains.len()
            );
        }

        Commands::Suggestions { all } => {
            let suggestions: SuggestionStore = load_as(store.as_ref(), SUGGESTIONS_KEY)
                .await?
                .unwrap_or_default();
            let shown: Vec<_> = if *all {
                suggestions.all().to_vec()
            } else {
                suggestions.pending().cloned().collect()
            };
            cli::print_suggestions(&shown);
        }

        Commands::Approve { id } => {
            let labeler = cli::build_labeler(&cli, &config).await?;
            let updated = labeler.approve_suggestion(id).await?;
            println!("Suggestion '{}' is now {}", updated.suggested_name, updated.status);
        }

        Commands::Reject { id } => {
            let labeler = cli::build_labeler(&cli, &config).await?;
            let updated = labeler.reject_suggestion(id).await?;
            println!("Suggestion '{}' is now {}", updated.suggested_name, updated.status);
        }

        Commands::Review => {
            let labeler = cli::build_labeler(&cli, &config).await?;
            let decided = cli::review_suggestions(&labeler).await?;
            println!("Decided {} suggestions", decided);
        }

        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(LabelerError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nKey settings to review:");
            println!("  - processing.batch_size: Unread messages handled per cycle");
            println!("  - processing.pattern_threshold: Matches before a label is suggested");
            println!("  - labels.spam_label: Label applied to suspected spam");
            println!("  - storage.state_dir: Where settings and suggestions are kept");
        }
    }

    Ok(())
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(labeler_err) = error.downcast_ref::<LabelerError>() {
        match labeler_err {
            e if e.requires_reauth() => {
                eprintln!("\nHint: Your Gmail authorization is missing or expired.");
                eprintln!("      Try running: gmail-labeler auth --force");
            }
            LabelerError::RateLimitExceeded { .. } => {
                eprintln!("\nHint: You've hit Gmail API rate limits.");
                eprintln!("      Wait a few minutes or lower processing.batch_size.");
            }
            LabelerError::CycleInProgress => {
                eprintln!("\nHint: Another cycle is running; try again when it finishes.");
            }
            LabelerError::SuggestionNotFound(_) | LabelerError::InvalidSuggestionState { .. } => {
                eprintln!("\nHint: List pending suggestions with: gmail-labeler suggestions");
            }
            LabelerError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: gmail-labeler init-config --force");
            }
            _ => {}
        }
    }
}
