//! Processing cycle failure handling, batching and concurrency

mod common;

use common::{
    create_billing_message, create_test_message, FakeMailClient, GatedStore, Harness, MockMailClient,
};
use gmail_labeler::config::Config;
use gmail_labeler::engine::Labeler;
use gmail_labeler::error::LabelerError;
use gmail_labeler::models::{ConditionType, Rule, Suggestion, SuggestionStatus};
use gmail_labeler::settings::Settings;
use gmail_labeler::storage::MemoryStore;
use std::sync::Arc;
use tokio::sync::Notify;

fn finance_settings() -> Settings {
    let mut settings = Settings::default();
    settings
        .rules
        .push(Rule::new(ConditionType::Sender, "billing.example.com", "Finance"));
    settings
}

/// Billing and shop senders both filed under Finance, with auto-created rules
fn two_sender_settings() -> Settings {
    let mut settings = finance_settings();
    settings.auto_create_rules_from_suggestions = true;
    settings
        .rules
        .push(Rule::new(ConditionType::Sender, "shop.example.com", "Finance"));
    settings
}

fn add_shop_messages(client: &FakeMailClient) {
    for i in 1..=3 {
        client.add_unread(create_test_message(
            &format!("s{}", i),
            "Shop <orders@shop.example.com>",
            "Your order has shipped",
        ));
    }
}

fn status_of(suggestions: &[Suggestion], name: &str) -> Option<SuggestionStatus> {
    suggestions
        .iter()
        .find(|s| s.suggested_name == name)
        .map(|s| s.status)
}

#[tokio::test]
async fn test_listing_failure_leaves_timestamp_untouched() {
    let harness = Harness::new(FakeMailClient::new().with_label("Label_1", "Finance"));
    harness.labeler.save_settings(&finance_settings()).await.unwrap();
    harness.client.add_unread(create_billing_message("m1"));

    let first = harness.labeler.run_cycle().await.unwrap();
    let recorded = harness.labeler.get_settings().await.unwrap().last_processed_timestamp;
    assert_eq!(recorded, first.completed_at);

    harness.client.set_fail_listing(true);
    let result = harness.labeler.run_cycle().await;
    assert!(matches!(result, Err(LabelerError::NetworkError(_))));

    let after = harness.labeler.get_settings().await.unwrap().last_processed_timestamp;
    assert_eq!(after, recorded);
}

#[tokio::test]
async fn test_fetch_failure_is_skipped_and_cycle_continues() {
    let harness = Harness::new(FakeMailClient::new().with_label("Label_1", "Finance"));
    harness.labeler.save_settings(&finance_settings()).await.unwrap();
    harness.client.add_unread(create_billing_message("m1"));
    harness.client.add_unread(create_billing_message("m2"));
    harness.client.fail_fetch_of("m1");

    let report = harness.labeler.run_cycle().await.unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.labeled, 1);
    assert!(report.completed_at.is_some());
    assert_eq!(harness.client.modifications()[0].message_id, "m2");
}

#[tokio::test]
async fn test_batch_size_bounds_each_cycle() {
    let harness = Harness::new(FakeMailClient::new().with_label("Label_1", "Finance"));
    harness.labeler.save_settings(&finance_settings()).await.unwrap();
    for i in 0..15 {
        harness.client.add_unread(create_billing_message(&format!("m{}", i)));
    }

    let first = harness.labeler.run_cycle().await.unwrap();
    assert_eq!(first.fetched, 10);
    assert_eq!(harness.client.unread_count(), 5);

    let second = harness.labeler.run_cycle().await.unwrap();
    assert_eq!(second.fetched, 5);
    assert_eq!(harness.client.unread_count(), 0);
}

#[tokio::test]
async fn test_learner_emits_once_across_cycles() {
    let harness = Harness::new(FakeMailClient::new().with_label("Label_1", "Finance"));
    harness.labeler.save_settings(&finance_settings()).await.unwrap();

    for cycle in 0..3 {
        for i in 0..4 {
            harness
                .client
                .add_unread(create_billing_message(&format!("c{}-m{}", cycle, i)));
        }
        harness.labeler.run_cycle().await.unwrap();
    }

    assert_eq!(harness.labeler.get_suggested_labels(true).await.unwrap().len(), 1);
    let counters = harness.labeler.domain_label_counters().await.unwrap();
    assert_eq!(counters.get("billing.example.com", "Label_1"), 12);
}

#[tokio::test]
async fn test_pattern_detection_disabled_records_nothing() {
    let harness = Harness::new(FakeMailClient::new().with_label("Label_1", "Finance"));
    let mut settings = finance_settings();
    settings.pattern_detection_enabled = false;
    harness.labeler.save_settings(&settings).await.unwrap();
    for i in 0..5 {
        harness.client.add_unread(create_billing_message(&format!("m{}", i)));
    }

    let report = harness.labeler.run_cycle().await.unwrap();

    assert_eq!(report.labeled, 5);
    assert_eq!(report.suggestions_created, 0);
    assert!(harness.labeler.domain_label_counters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_custom_threshold_and_spam_label() {
    let mut config = Config::default();
    config.processing.pattern_threshold = 2;
    config.labels.spam_label = "Junk/Heuristic".to_string();
    let harness = Harness::with_config(
        FakeMailClient::new().with_label("Label_1", "Finance"),
        &config,
    );
    let mut settings = finance_settings();
    settings.spam.enabled = true;
    harness.labeler.save_settings(&settings).await.unwrap();

    harness.client.add_unread(create_billing_message("m1"));
    harness.client.add_unread(create_billing_message("m2"));
    harness
        .client
        .add_unread(create_test_message("m3", "root@intranet", "Report"));

    let report = harness.labeler.run_cycle().await.unwrap();

    assert_eq!(report.suggestions_created, 1);
    assert_eq!(report.spam, 1);
    assert!(harness.client.label_id("Junk/Heuristic").is_some());
}

#[tokio::test]
async fn test_resolved_label_ids_are_persisted() {
    let harness = Harness::new(FakeMailClient::new());
    harness.labeler.save_settings(&finance_settings()).await.unwrap();
    harness.client.add_unread(create_billing_message("m1"));
    harness.client.add_unread(create_billing_message("m2"));

    harness.labeler.run_cycle().await.unwrap();

    // Created once, then reused from the cache
    assert_eq!(harness.client.created_labels(), vec!["Finance".to_string()]);
    let stored = harness.labeler.get_settings().await.unwrap();
    assert_eq!(stored.rules[0].target_label_id, harness.client.label_id("Finance"));
}

#[tokio::test]
async fn test_concurrent_cycle_is_rejected() {
    let client = FakeMailClient::new().with_label("Label_1", "Finance");
    let gate = Arc::new(Notify::new());
    client.hold_listing(gate.clone());
    let harness = Harness::new(client);

    let (first, second) = tokio::join!(harness.labeler.run_cycle(), async {
        let second = harness.labeler.run_cycle().await;
        gate.notify_one();
        second
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(LabelerError::CycleInProgress)));
}

#[tokio::test]
async fn test_settings_saved_during_cycle_survive_write_back() {
    let client = FakeMailClient::new().with_label("Label_1", "Finance");
    client.add_unread(create_billing_message("m1"));
    let gate = Arc::new(Notify::new());
    client.hold_listing(gate.clone());
    let harness = Harness::new(client);
    harness.labeler.save_settings(&finance_settings()).await.unwrap();

    let (cycle, _) = tokio::join!(harness.labeler.run_cycle(), async {
        let mut edited = finance_settings();
        edited
            .rules
            .push(Rule::new(ConditionType::Keyword, "invoice", "Receipts"));
        harness.labeler.save_settings(&edited).await.unwrap();
        gate.notify_one();
    });

    let report = cycle.unwrap();
    let stored = harness.labeler.get_settings().await.unwrap();
    assert_eq!(stored.rules.len(), 2);
    assert_eq!(stored.rules[0].target_label_id.as_deref(), Some("Label_1"));
    assert_eq!(stored.last_processed_timestamp, report.completed_at);
}

#[tokio::test]
async fn test_approval_during_cycle_survives_learner_save_and_write_back() {
    let harness = Harness::new(FakeMailClient::new().with_label("Label_1", "Finance"));
    harness.labeler.save_settings(&two_sender_settings()).await.unwrap();
    for i in 1..=3 {
        harness.client.add_unread(create_billing_message(&format!("m{}", i)));
    }
    harness.labeler.run_cycle().await.unwrap();
    let billing_id = harness.labeler.get_suggested_labels(false).await.unwrap()[0]
        .id
        .clone();

    add_shop_messages(&harness.client);
    let gate = Arc::new(Notify::new());
    harness.client.hold_listing(gate.clone());

    let (cycle, approved) = tokio::join!(harness.labeler.run_cycle(), async {
        let approved = harness.labeler.approve_suggestion(&billing_id).await;
        gate.notify_one();
        approved
    });

    let report = cycle.unwrap();
    assert_eq!(report.suggestions_created, 1);
    assert_eq!(approved.unwrap().status, SuggestionStatus::Approved);

    let all = harness.labeler.get_suggested_labels(true).await.unwrap();
    assert_eq!(
        status_of(&all, "Finance - billing.example.com"),
        Some(SuggestionStatus::Approved)
    );
    assert_eq!(
        status_of(&all, "Finance - shop.example.com"),
        Some(SuggestionStatus::Pending)
    );

    let stored = harness.labeler.get_settings().await.unwrap();
    assert_eq!(stored.rules.len(), 3);
    assert_eq!(stored.rules[2].condition_value, "@billing.example.com");
    assert_eq!(stored.rules[0].target_label_id.as_deref(), Some("Label_1"));
    assert_eq!(stored.last_processed_timestamp, report.completed_at);
}

#[tokio::test]
async fn test_approval_from_second_labeler_waits_for_cycle_write() {
    let client = Arc::new(FakeMailClient::new().with_label("Label_1", "Finance"));
    let store = Arc::new(GatedStore::default());
    let daemon = Labeler::new(client.clone(), store.clone(), &Config::default());
    let other = Labeler::new(client.clone(), store.clone(), &Config::default());

    daemon.save_settings(&two_sender_settings()).await.unwrap();
    for i in 1..=3 {
        client.add_unread(create_billing_message(&format!("m{}", i)));
    }
    daemon.run_cycle().await.unwrap();
    let billing_id = other.get_suggested_labels(false).await.unwrap()[0].id.clone();

    // The daemon parks after loading suggestions, before saving the new one
    add_shop_messages(&client);
    store.hold_next_suggestions_save();

    let (cycle, approved, _) = tokio::join!(
        daemon.run_cycle(),
        other.approve_suggestion(&billing_id),
        async {
            while !store.is_parked() {
                tokio::task::yield_now().await;
            }
            tokio::task::yield_now().await;
            store.release();
        }
    );

    cycle.unwrap();
    assert_eq!(approved.unwrap().status, SuggestionStatus::Approved);

    let all = daemon.get_suggested_labels(true).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(
        status_of(&all, "Finance - billing.example.com"),
        Some(SuggestionStatus::Approved)
    );
    assert_eq!(
        status_of(&all, "Finance - shop.example.com"),
        Some(SuggestionStatus::Pending)
    );

    let rules = daemon.get_settings().await.unwrap().rules;
    assert_eq!(rules.len(), 3);
    assert_eq!(rules[2].condition_value, "@billing.example.com");
}

#[tokio::test]
async fn test_auth_loss_aborts_cycle() {
    let mut mock = MockMailClient::new();
    mock.expect_list_labels().returning(|| Ok(vec![]));
    mock.expect_list_unread_message_ids()
        .times(1)
        .returning(|_| Ok(vec!["m1".to_string(), "m2".to_string()]));
    mock.expect_get_message()
        .times(1)
        .returning(|_| Err(LabelerError::AuthRequired("token revoked".to_string())));
    mock.expect_modify_message_labels().times(0);

    let store = Arc::new(MemoryStore::new());
    let labeler = Labeler::new(Arc::new(mock), store, &Config::default());
    labeler.save_settings(&finance_settings()).await.unwrap();

    let result = labeler.run_cycle().await;
    assert!(matches!(result, Err(LabelerError::AuthRequired(_))));
    assert!(labeler
        .get_settings()
        .await
        .unwrap()
        .last_processed_timestamp
        .is_none());
}

#[tokio::test]
async fn test_invalid_settings_are_not_saved() {
    let harness = Harness::new(FakeMailClient::new());
    let mut settings = finance_settings();
    settings.rules.push(Rule::new(ConditionType::Subject, "", "Empty"));

    let result = harness.labeler.save_settings(&settings).await;
    assert!(matches!(result, Err(LabelerError::ConfigError(_))));
    assert!(harness.labeler.get_settings().await.unwrap().rules.is_empty());
}
