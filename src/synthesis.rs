//! Turns an insight question into an analysis snippet.

use crate::error::Result;
use crate::execution::strip_code_fences;
use crate::llm::{CompletionRequest, TextOracle};
use crate::prompts::{synthesis_system_prompt, UNGENERABLE_SENTINEL};
use crate::time::TimePeriods;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesizedSnippet {
    Code(String),
    /// The model answered with the sentinel instead of code.
    Ungenerable,
}

impl SynthesizedSnippet {
    /// Classify raw model output. The sentinel is matched after trimming and
    /// fence stripping, ignoring a missing trailing period and letter case.
    pub fn from_response(raw: &str) -> Self {
        let code = strip_code_fences(raw);
        if is_sentinel(&code) {
            SynthesizedSnippet::Ungenerable
        } else {
            SynthesizedSnippet::Code(code)
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            SynthesizedSnippet::Code(code) => Some(code.as_str()),
            SynthesizedSnippet::Ungenerable => None,
        }
    }
}

fn is_sentinel(text: &str) -> bool {
    let sentinel = UNGENERABLE_SENTINEL.trim_end_matches('.');
    let quote = |c: char| c == '"' || c == '\'' || c == '`';
    let candidate = text
        .trim()
        .trim_matches(quote)
        .trim_end_matches('.')
        .trim_matches(quote);
    // a blank reply has nothing to execute, so it takes the same path
    candidate.is_empty() || candidate.eq_ignore_ascii_case(sentinel)
}

pub struct CodeSynthesizer {
    oracle: Arc<dyn TextOracle>,
    model: String,
}

impl CodeSynthesizer {
    pub fn new(oracle: Arc<dyn TextOracle>, model: impl Into<String>) -> Self {
        Self {
            oracle,
            model: model.into(),
        }
    }

    pub async fn synthesize(&self, question: &str, time_periods: &TimePeriods) -> Result<SynthesizedSnippet> {
        let request = CompletionRequest::new(synthesis_system_prompt(time_periods), question, &self.model)
            .with_max_output_tokens(None);
        let raw = self.oracle.complete(&request).await?;
        let snippet = SynthesizedSnippet::from_response(&raw);
        match &snippet {
            SynthesizedSnippet::Code(code) => debug!("Synthesized snippet:\n{}", code),
            SynthesizedSnippet::Ungenerable => info!("Model declined to write a snippet"),
        }
        Ok(snippet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedOracle;
    use chrono::NaiveDate;

    #[test]
    fn test_sentinel_detection() {
        assert_eq!(
            SynthesizedSnippet::from_response("Unable to generate python snippet."),
            SynthesizedSnippet::Ungenerable
        );
        assert_eq!(
            SynthesizedSnippet::from_response("```\nunable to generate python snippet\n```"),
            SynthesizedSnippet::Ungenerable
        );
        assert_eq!(
            SynthesizedSnippet::from_response("'Unable to generate python snippet.'"),
            SynthesizedSnippet::Ungenerable
        );
        assert_eq!(
            SynthesizedSnippet::from_response("`Unable to generate python snippet`."),
            SynthesizedSnippet::Ungenerable
        );
        assert_eq!(SynthesizedSnippet::from_response("  \n"), SynthesizedSnippet::Ungenerable);
        assert_eq!(
            SynthesizedSnippet::from_response("'Unable to generate'"),
            SynthesizedSnippet::Code("'Unable to generate'".to_string())
        );
    }

    #[test]
    fn test_code_is_fence_stripped() {
        let snippet = SynthesizedSnippet::from_response("```python\nlen(df)\n```");
        assert_eq!(snippet.code(), Some("len(df)"));
    }

    #[tokio::test]
    async fn test_synthesis_request_is_uncapped() {
        let oracle = Arc::new(ScriptedOracle::new().otherwise("df['Refund Amount'].sum()"));
        let synthesizer = CodeSynthesizer::new(oracle.clone(), "gpt-4o");
        let periods = TimePeriods::resolve(NaiveDate::from_ymd_opt(2025, 5, 14).unwrap());

        let snippet = synthesizer.synthesize("Total refunds?", &periods).await.unwrap();
        assert_eq!(snippet.code(), Some("df['Refund Amount'].sum()"));

        let requests = oracle.requests();
        assert_eq!(requests[0].max_output_tokens, None);
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].user_prompt, "Total refunds?");
        assert!(requests[0].system_prompt.contains("2025-05-14"));
    }
}
