mod common;

use business_assistant::classifier::Route;
use business_assistant::llm::ScriptedOracle;
use business_assistant::BusinessAssistant;
use common::{offline_config, refund_spike, write_transactions};
use std::sync::Arc;

const CLASSIFIER: &str = "classifying business questions";
const KPI: &str = "extracting Key Performance Indicators";
const CAUSAL: &str = "senior business analyst";

fn causal_oracle(kpi_reply: &str, narrative: &str) -> Arc<ScriptedOracle> {
    Arc::new(
        ScriptedOracle::new()
            .on(CLASSIFIER, "causal")
            .on(KPI, kpi_reply)
            .on(CAUSAL, narrative),
    )
}

fn score_lines(user_prompt: &str) -> Vec<String> {
    user_prompt
        .lines()
        .skip_while(|l| !l.starts_with("Attribution scores"))
        .skip(1)
        .take_while(|l| !l.trim().is_empty())
        .map(|l| l.to_string())
        .collect()
}

#[tokio::test]
async fn test_refund_spike_gets_number_free_explanation() {
    let oracle = causal_oracle(
        "\"refund-amount\"",
        "Held payouts explain roughly 60% of the spike, and card payments added another 25%.",
    );
    let assistant = BusinessAssistant::new(oracle.clone(), offline_config(write_transactions(&refund_spike("Acme"))));

    let response = assistant.handle_query("Why did refunds spike?", "Acme").await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.route, Some(Route::Causal));
    assert!(!response.narrative.is_empty());
    assert!(!response.narrative.chars().any(|c| c.is_ascii_digit()), "{}", response.narrative);
    assert!(response.narrative.starts_with("Held payouts explain roughly"));
    assert!(response.snippet.is_none());

    let requests = oracle.requests();
    assert_eq!(requests.len(), 3);
    let causal = &requests[2];
    assert!(causal.user_prompt.contains("KPI that changed: Refund Amount"));

    let lines = score_lines(&causal.user_prompt);
    assert_eq!(lines.len(), 6, "{:?}", lines);
    for line in &lines {
        assert!(!line.starts_with("Refund Amount:"));
        assert!(!line.starts_with("Settlement Amount:"));
    }
}

#[tokio::test]
async fn test_settlement_kpi_excludes_refund_and_settlement() {
    let oracle = causal_oracle("\"settlement-amount\"", "Refund activity and bank fees moved settlements.");
    let assistant = BusinessAssistant::new(oracle.clone(), offline_config(write_transactions(&refund_spike("Acme"))));

    let response = assistant.handle_query("Why did my settlement drop?", "Acme").await;
    assert!(response.success, "{:?}", response.error);

    let lines = score_lines(&oracle.requests()[2].user_prompt);
    assert_eq!(lines.len(), 9, "{:?}", lines);
    assert!(lines.iter().any(|l| l.starts_with("Bank Commision:")));
    assert!(lines.iter().all(|l| !l.starts_with("Refund Amount:") && !l.starts_with("Settlement Amount:")));
}

#[tokio::test]
async fn test_two_kpis_are_both_explained() {
    let oracle = causal_oracle("\"refund-amount\", \"settlement-amount\"", "Payout holds drove the change.");
    let assistant = BusinessAssistant::new(oracle.clone(), offline_config(write_transactions(&refund_spike("Acme"))));

    let response = assistant.handle_query("Why did refunds and settlements move?", "Acme").await;
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.narrative, "Payout holds drove the change.\n\nPayout holds drove the change.");
    assert_eq!(oracle.requests().len(), 4);
}

#[tokio::test]
async fn test_unknown_kpi_fails_causal_query() {
    let oracle = causal_oracle("\"gmv\"", "unused");
    let assistant = BusinessAssistant::new(oracle.clone(), offline_config(write_transactions(&refund_spike("Acme"))));

    let response = assistant.handle_query("Why did GMV fall?", "Acme").await;
    assert!(!response.success);
    assert!(response.narrative.is_empty());
    assert!(response.error.unwrap().starts_with("Causal model error"));
    assert_eq!(oracle.requests().len(), 2);
}

#[tokio::test]
async fn test_missing_target_day_fails_causal_query() {
    let oracle = causal_oracle("\"refund-amount\"", "unused");
    let mut config = offline_config(write_transactions(&refund_spike("Acme")));
    config.causal_target_date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1);
    let assistant = BusinessAssistant::new(oracle, config);

    let response = assistant.handle_query("Why did refunds spike?", "Acme").await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("no transactions on 2025-06-01"));
}

#[tokio::test]
async fn test_unknown_merchant_fails_causal_query() {
    let oracle = causal_oracle("\"refund-amount\"", "unused");
    let assistant = BusinessAssistant::new(oracle, offline_config(write_transactions(&refund_spike("Acme"))));

    let response = assistant.handle_query("Why did refunds spike?", "Nobody").await;
    assert!(!response.success);
    assert!(response.error.unwrap().starts_with("Causal model error"));
}
