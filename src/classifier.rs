//! Question classifier and KPI extraction.
//!
//! Both parse oracle text into closed enums and fall back to the safe variant
//! instead of failing: an unrecognized route becomes [`Route::Other`], an
//! unrecognized KPI token becomes [`Kpi::Unknown`].

use crate::data::schema::{REFUND_AMOUNT, SETTLEMENT_AMOUNT};
use crate::error::{AssistantError, Result};
use crate::llm::{CompletionRequest, TextOracle};
use crate::prompts::{CLASSIFY_QUESTION_PROMPT, EXTRACT_KPI_PROMPT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Causal,
    Insight,
    Other,
}

impl Route {
    /// Strict parse of a single route token.
    pub fn from_token(raw: &str) -> Result<Self> {
        match normalize(raw).as_str() {
            "causal" => Ok(Route::Causal),
            "insight" => Ok(Route::Insight),
            "other" => Ok(Route::Other),
            _ => Err(AssistantError::ClassificationAmbiguous(raw.trim().to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Causal => "causal",
            Route::Insight => "insight",
            Route::Other => "other",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Route for arbitrary oracle output; anything unrecognized is `Other`.
pub fn parse_route(raw: &str) -> Route {
    match Route::from_token(raw) {
        Ok(route) => route,
        Err(e) => {
            warn!("{}; falling back to 'other'", e);
            Route::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kpi {
    RefundAmount,
    SettlementAmount,
    Unknown(String),
}

impl Kpi {
    pub fn from_token(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "refund-amount" => Kpi::RefundAmount,
            "settlement-amount" => Kpi::SettlementAmount,
            _ => Kpi::Unknown(raw.trim().to_string()),
        }
    }

    /// Dataset column (and causal graph node) the KPI measures.
    pub fn column(&self) -> Option<&'static str> {
        match self {
            Kpi::RefundAmount => Some(REFUND_AMOUNT),
            Kpi::SettlementAmount => Some(SETTLEMENT_AMOUNT),
            Kpi::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kpi::RefundAmount => f.write_str("refund-amount"),
            Kpi::SettlementAmount => f.write_str("settlement-amount"),
            Kpi::Unknown(token) => write!(f, "unknown KPI '{}'", token),
        }
    }
}

/// `"refund-amount", "settlement-amount"` -> one `Kpi` per non-empty token, in order.
pub fn parse_kpis(raw: &str) -> Vec<Kpi> {
    raw.split(|c| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|token| !token.trim_matches(|c: char| c == '"' || c == '\'').is_empty())
        .map(Kpi::from_token)
        .collect()
}

/// Lowercase with surrounding whitespace, quotes and punctuation removed.
fn normalize(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '`' || c == '.')
        .to_lowercase()
}

pub struct QuestionClassifier {
    oracle: Arc<dyn TextOracle>,
    model: String,
}

impl QuestionClassifier {
    pub fn new(oracle: Arc<dyn TextOracle>, model: impl Into<String>) -> Self {
        Self {
            oracle,
            model: model.into(),
        }
    }

    /// One oracle call with the fixed rubric. Oracle failures propagate;
    /// unexpected text does not.
    pub async fn classify(&self, question: &str) -> Result<Route> {
        let request = CompletionRequest::new(CLASSIFY_QUESTION_PROMPT, question, &self.model);
        let raw = self.oracle.complete(&request).await?;
        let route = parse_route(&raw);
        debug!("Classified question as {} (raw: {:?})", route, raw.trim());
        Ok(route)
    }

    pub async fn extract_kpis(&self, question: &str) -> Result<Vec<Kpi>> {
        let request = CompletionRequest::new(EXTRACT_KPI_PROMPT, question, &self.model);
        let raw = self.oracle.complete(&request).await?;
        let kpis = parse_kpis(&raw);
        debug!("Extracted KPIs {:?} (raw: {:?})", kpis, raw.trim());
        Ok(kpis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedOracle;

    #[test]
    fn test_route_tokens() {
        assert_eq!(parse_route("causal"), Route::Causal);
        assert_eq!(parse_route("  Insight.\n"), Route::Insight);
        assert_eq!(parse_route("\"other\""), Route::Other);
    }

    #[test]
    fn test_unrecognized_route_falls_back_to_other() {
        for raw in ["", "causal analysis", "I think this is insight", "Error: timeout", "CAUSAL!!"] {
            assert_eq!(parse_route(raw), Route::Other, "{:?}", raw);
        }
        assert!(matches!(
            Route::from_token("maybe"),
            Err(AssistantError::ClassificationAmbiguous(_))
        ));
    }

    #[test]
    fn test_kpi_parsing() {
        assert_eq!(parse_kpis("\"refund-amount\""), vec![Kpi::RefundAmount]);
        assert_eq!(
            parse_kpis("\"refund-amount\", \"settlement-amount\""),
            vec![Kpi::RefundAmount, Kpi::SettlementAmount]
        );
        assert_eq!(parse_kpis("gmv"), vec![Kpi::Unknown("gmv".to_string())]);
        assert!(parse_kpis("  ").is_empty());
        assert_eq!(Kpi::SettlementAmount.column(), Some(SETTLEMENT_AMOUNT));
        assert_eq!(Kpi::Unknown("x".into()).column(), None);
    }

    #[tokio::test]
    async fn test_classify_uses_rubric_and_defaults() {
        let oracle = Arc::new(ScriptedOracle::new().otherwise("something odd"));
        let classifier = QuestionClassifier::new(oracle.clone(), "gpt-4o");
        assert_eq!(classifier.classify("Tell me a joke").await.unwrap(), Route::Other);

        let requests = oracle.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system_prompt, CLASSIFY_QUESTION_PROMPT);
        assert_eq!(requests[0].max_output_tokens, Some(500));
        assert_eq!(requests[0].temperature, 0.0);
    }

    #[tokio::test]
    async fn test_oracle_failure_propagates() {
        let oracle = Arc::new(ScriptedOracle::new().fail_on("classifying", "connection refused"));
        let classifier = QuestionClassifier::new(oracle, "gpt-4o");
        assert!(matches!(
            classifier.classify("Why did refunds spike?").await,
            Err(AssistantError::OracleUnavailable(_))
        ));
    }
}
