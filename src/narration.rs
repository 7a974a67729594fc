//! Natural-language explanations of computed results and attribution scores,
//! plus the conversational reply for out-of-domain questions.

use crate::error::Result;
use crate::llm::{CompletionRequest, TextOracle};
use crate::prompts::{
    causal_user_prompt, narration_user_prompt, CAUSAL_SYSTEM_PROMPT, FALLBACK_PROMPT,
    NARRATION_SYSTEM_PROMPT,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

const NARRATION_MAX_TOKENS: u32 = 200;
const NARRATION_TEMPERATURE: f32 = 0.3;

/// Used when redaction leaves nothing of the causal narrative.
const EMPTY_CAUSAL_NARRATIVE: &str =
    "Several factors in your transaction mix shifted together; review the largest drivers listed in your dashboard.";

lazy_static! {
    static ref NUMBER: Regex =
        Regex::new(r"[-+]?[₹$]?\d[\d,]*(\.\d+)?\s*(%|percent\b|lakhs?\b|crores?\b)?").expect("static regex");
    static ref SPACES: Regex = Regex::new(r"[ \t]{2,}").expect("static regex");
    static ref SPACE_BEFORE_PUNCT: Regex = Regex::new(r"\s+([,.;:])").expect("static regex");
}

/// Remove every numeral (with attached currency, unit or percent sign).
pub fn redact_numbers(text: &str) -> String {
    let stripped = NUMBER.replace_all(text, "");
    let collapsed = SPACES.replace_all(&stripped, " ");
    let tidied = SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1");
    // Anything the pattern missed, e.g. digits glued to letters.
    tidied
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()
        .trim()
        .to_string()
}

pub struct Narrator {
    oracle: Arc<dyn TextOracle>,
    model: String,
}

impl Narrator {
    pub fn new(oracle: Arc<dyn TextOracle>, model: impl Into<String>) -> Self {
        Self {
            oracle,
            model: model.into(),
        }
    }

    /// `result` is the rendered execution outcome, including `"None"` and
    /// `"Execution error: ..."` texts.
    pub async fn narrate_result(&self, question: &str, result: &str) -> Result<String> {
        let request = CompletionRequest::new(
            NARRATION_SYSTEM_PROMPT,
            narration_user_prompt(question, result),
            &self.model,
        )
        .with_max_output_tokens(Some(NARRATION_MAX_TOKENS))
        .with_temperature(NARRATION_TEMPERATURE);
        let text = self.oracle.complete(&request).await?;
        Ok(text.trim().to_string())
    }

    /// The returned narrative never contains a digit, whatever the model wrote.
    pub async fn narrate_attribution(&self, question: &str, kpi: &str, scores: &str) -> Result<String> {
        let request = CompletionRequest::new(
            CAUSAL_SYSTEM_PROMPT,
            causal_user_prompt(question, kpi, scores),
            &self.model,
        )
        .with_max_output_tokens(Some(NARRATION_MAX_TOKENS))
        .with_temperature(NARRATION_TEMPERATURE);
        let raw = self.oracle.complete(&request).await?;

        let narrative = redact_numbers(&raw);
        if narrative != raw.trim() {
            warn!("Causal narrative contained numbers; redacted");
        }
        if narrative.is_empty() {
            return Ok(EMPTY_CAUSAL_NARRATIVE.to_string());
        }
        Ok(narrative)
    }

    pub async fn answer_other(&self, question: &str) -> Result<String> {
        let request = CompletionRequest::new(FALLBACK_PROMPT, question, &self.model);
        let text = self.oracle.complete(&request).await?;
        debug!("Fallback reply: {}", text.trim());
        Ok(text.trim().to_string())
    }
}
