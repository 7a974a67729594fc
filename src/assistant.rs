//! Business assistant: routes each merchant question to causal attribution,
//! a sandboxed data query, or a conversational fallback.

use crate::causal::CausalEngine;
use crate::classifier::{Kpi, QuestionClassifier, Route};
use crate::config::AssistantConfig;
use crate::data::{CardsSummary, Dataset};
use crate::error::{AssistantError, Result};
use crate::execution::{execute_snippet, ExecutionOutcome};
use crate::llm::{LlmClient, TextOracle};
use crate::narration::Narrator;
use crate::prompts::UNGENERABLE_NARRATIVE;
use crate::synthesis::{CodeSynthesizer, SynthesizedSnippet};
use crate::time::TimePeriods;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Outcome of one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub question: String,
    /// `None` only when classification itself failed.
    pub route: Option<Route>,
    pub success: bool,
    pub narrative: String,
    pub error: Option<String>,
    /// Snippet that was executed (insight path only).
    pub snippet: Option<String>,
    /// Rendered execution outcome handed to narration (insight path only).
    pub result: Option<String>,
}

impl QueryResponse {
    fn answered(question: &str, route: Route, narrative: String) -> Self {
        Self {
            question: question.to_string(),
            route: Some(route),
            success: true,
            narrative,
            error: None,
            snippet: None,
            result: None,
        }
    }

    fn failed(question: &str, route: Option<Route>, error: &AssistantError) -> Self {
        Self {
            question: question.to_string(),
            route,
            success: false,
            narrative: String::new(),
            error: Some(error.to_string()),
            snippet: None,
            result: None,
        }
    }
}

pub struct BusinessAssistant {
    config: AssistantConfig,
    classifier: QuestionClassifier,
    synthesizer: CodeSynthesizer,
    narrator: Narrator,
    causal: CausalEngine,
}

impl BusinessAssistant {
    pub fn new(oracle: Arc<dyn TextOracle>, config: AssistantConfig) -> Self {
        Self {
            classifier: QuestionClassifier::new(oracle.clone(), config.model.clone()),
            synthesizer: CodeSynthesizer::new(oracle.clone(), config.model.clone()),
            narrator: Narrator::new(oracle, config.model.clone()),
            causal: CausalEngine::from_config(&config),
            config,
        }
    }

    /// Assistant backed by the HTTP oracle; needs an API key.
    pub fn from_config(config: AssistantConfig) -> Result<Self> {
        let client = LlmClient::from_config(&config)?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Answer one question about one merchant. Never returns an error: every
    /// failure becomes `success = false` with the cause in `error`.
    pub async fn handle_query(&self, question: &str, merchant: &str) -> QueryResponse {
        let span = info_span!("query", request_id = %Uuid::new_v4(), merchant = %merchant);
        async move {
            info!("Question: {}", question);
            let route = match self.classifier.classify(question).await {
                Ok(route) => route,
                Err(e) => {
                    warn!("Classification failed: {}", e);
                    return QueryResponse::failed(question, None, &e);
                }
            };
            info!("Routed to {}", route);

            let outcome = match route {
                Route::Causal => self.explain_change(question, merchant).await,
                Route::Insight => self.answer_with_data(question, merchant).await,
                Route::Other => self
                    .narrator
                    .answer_other(question)
                    .await
                    .map(|narrative| QueryResponse::answered(question, route, narrative)),
            };

            outcome.unwrap_or_else(|e| {
                warn!("Query failed: {}", e);
                QueryResponse::failed(question, Some(route), &e)
            })
        }
        .instrument(span)
        .await
    }

    /// Dashboard cards for one merchant. No oracle call.
    pub fn summarize(&self, merchant: &str) -> Result<CardsSummary> {
        self.merchant_rows(merchant)?.summary()
    }

    /// Reloaded on every call; nothing is cached between requests.
    fn merchant_rows(&self, merchant: &str) -> Result<Dataset> {
        Dataset::load(&self.config.data_path)?.filter_by_merchant(merchant)
    }

    async fn explain_change(&self, question: &str, merchant: &str) -> Result<QueryResponse> {
        let kpis = self.classifier.extract_kpis(question).await?;
        if kpis.is_empty() {
            return Err(AssistantError::CausalModelFault(
                "no KPI could be identified in the question".to_string(),
            ));
        }
        if let Some(unknown) = kpis.iter().find(|k| matches!(k, Kpi::Unknown(_))) {
            return Err(AssistantError::CausalModelFault(unknown.to_string()));
        }

        let rows = self.merchant_rows(merchant)?;
        let mut narratives = Vec::with_capacity(kpis.len());
        for kpi in &kpis {
            let report = self.causal.attribute(&rows, kpi)?;
            let narrative = self
                .narrator
                .narrate_attribution(question, &report.kpi, &report.score_lines())
                .await?;
            narratives.push(narrative);
        }

        Ok(QueryResponse::answered(
            question,
            Route::Causal,
            narratives.join("\n\n"),
        ))
    }

    async fn answer_with_data(&self, question: &str, merchant: &str) -> Result<QueryResponse> {
        let rows = self.merchant_rows(merchant)?;
        let time_periods = TimePeriods::resolve(self.config.as_of_or_today());

        let code = match self.synthesizer.synthesize(question, &time_periods).await? {
            SynthesizedSnippet::Code(code) => code,
            SynthesizedSnippet::Ungenerable => {
                info!("{}", AssistantError::SnippetUngenerable);
                return Ok(QueryResponse::answered(
                    question,
                    Route::Insight,
                    UNGENERABLE_NARRATIVE.to_string(),
                ));
            }
        };

        let outcome = execute_snippet(&code, &rows, &time_periods);
        if let ExecutionOutcome::Fault(detail) = &outcome {
            // Still narrated: the explanation can say what went wrong.
            warn!("{}", AssistantError::ExecutionFault(detail.clone()));
        }
        let result = outcome.to_string();
        let narrative = self.narrator.narrate_result(question, &result).await?;

        let mut response = QueryResponse::answered(question, Route::Insight, narrative);
        response.snippet = Some(code);
        response.result = Some(result);
        Ok(response)
    }
}
