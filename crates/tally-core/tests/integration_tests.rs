//! Integration tests for tally-core
//!
//! These tests exercise the full import → dispatch → parse workflow.

use std::sync::Arc;
use std::time::Duration;

use tally_core::{
    parse_csv, summarize, AppConfig, Dispatcher, Error, ManualClock, MockProvider, MockReply,
    OpenAICompatibleProvider, PromptLibrary, ProviderSet, StatementAnalyzer, TransactionKind,
};

/// Five-line statement export with mixed debits and credits
fn statement_csv() -> &'static str {
    r#"Date,Description,Amount
01/15/2025,Grocery Store,-85.50
01/16/2025,Salary Deposit,3500.00
01/18/2025,Electric Company,-120.75
01/20/2025,Coffee Shop,-4.95
01/22/2025,Netflix Subscription,-15.49"#
}

const CATEGORIES_REPLY: &str =
    r#"{"Groceries": 85.5, "Utilities": 120.75, "Dining": 4.95, "Subscriptions": 15.49}"#;

fn analyzer(providers: ProviderSet) -> StatementAnalyzer {
    let config = AppConfig::embedded().expect("embedded config");
    let dispatcher = Dispatcher::from_config(&config, providers)
        .expect("dispatcher")
        .with_clock(Arc::new(ManualClock::new()));
    StatementAnalyzer::new(Arc::new(dispatcher), PromptLibrary::embedded_only())
}

// =============================================================================
// Import
// =============================================================================

#[test]
fn test_import_and_summarize() {
    let transactions = parse_csv(statement_csv().as_bytes()).expect("Failed to parse CSV");
    assert_eq!(transactions.len(), 5);

    let summary = summarize(&transactions);
    assert_eq!(summary.debits.count, 4);
    assert_eq!(summary.credits.count, 1);
    assert_eq!(summary.credits.total_amount, 3500.0);
    assert_eq!(summary.debits.total_amount, 226.69);
    assert!(transactions
        .iter()
        .filter(|t| t.kind == TransactionKind::Debit)
        .all(|t| t.amount > 0.0));
}

// =============================================================================
// End-to-end categorization
// =============================================================================

#[tokio::test]
async fn test_categorize_answered_by_primary() {
    let primary = MockProvider::always("openrouter", MockReply::Content(CATEGORIES_REPLY.into()));
    let secondary = MockProvider::failing("cerebras", 500);
    let analyzer = analyzer(ProviderSet {
        primary: Arc::new(primary.clone()),
        secondary: Some(Arc::new(secondary.clone())),
    });

    let transactions = parse_csv(statement_csv().as_bytes()).unwrap();
    let answered = analyzer.categorize(&transactions, None).await.unwrap();

    assert_eq!(answered.provider, "openrouter");
    assert_eq!(answered.value["Groceries"], 85.5);
    assert_eq!(answered.value.len(), 4);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn test_categorize_falls_back_to_secondary() {
    let primary = MockProvider::failing("openrouter", 500);
    let secondary = MockProvider::always("cerebras", MockReply::Content(CATEGORIES_REPLY.into()));
    let analyzer = analyzer(ProviderSet {
        primary: Arc::new(primary.clone()),
        secondary: Some(Arc::new(secondary.clone())),
    });

    let transactions = parse_csv(statement_csv().as_bytes()).unwrap();
    let answered = analyzer.categorize(&transactions, None).await.unwrap();

    assert_eq!(answered.provider, "cerebras");
    assert_eq!(answered.value["Utilities"], 120.75);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test]
async fn test_unreachable_primary_falls_back_to_secondary() {
    let primary =
        OpenAICompatibleProvider::new("openrouter", "http://127.0.0.1:9", Duration::from_secs(2))
            .unwrap();
    let secondary = MockProvider::always("cerebras", MockReply::Content(CATEGORIES_REPLY.into()));
    let analyzer = analyzer(ProviderSet {
        primary: Arc::new(primary),
        secondary: Some(Arc::new(secondary)),
    });

    let transactions = parse_csv(statement_csv().as_bytes()).unwrap();
    let answered = analyzer
        .categorize(&transactions, Some("llama3.1-8b"))
        .await
        .unwrap();

    assert_eq!(answered.provider, "cerebras");
    assert_eq!(answered.model, "llama3.1-8b");
}

#[tokio::test]
async fn test_everything_down_reports_each_attempt() {
    let analyzer = analyzer(ProviderSet {
        primary: Arc::new(MockProvider::failing("openrouter", 502)),
        secondary: Some(Arc::new(MockProvider::failing("cerebras", 503))),
    });

    let transactions = parse_csv(statement_csv().as_bytes()).unwrap();
    let err = analyzer
        .categorize(&transactions, Some("llama3.1-8b"))
        .await
        .unwrap_err();

    match err {
        Error::ProviderUnavailable(attempts) => {
            assert_eq!(attempts.len(), 3);
            assert_eq!(attempts[2].model, "cerebras-1.3b");
        }
        other => panic!("expected ProviderUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_analysis_with_offline_providers() {
    let config = AppConfig::embedded().unwrap();
    let analyzer = analyzer(ProviderSet::mock(&config));

    let transactions = parse_csv(statement_csv().as_bytes()).unwrap();
    let report = analyzer.analyze(&transactions, None).await.unwrap();

    assert_eq!(report.summary.total_transactions, 5);
    assert_eq!(report.categories["Subscriptions"], 15.49);
    assert!(report.savings_matrix.contains_key("conservative"));
    assert!(report.savings_matrix.contains_key("moderate"));
    assert!(report.savings_matrix.contains_key("aggressive"));
}
