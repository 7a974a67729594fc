use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Oracle returned something other than a known route token.
    /// Recovered by the classifier; only surfaces in logs.
    #[error("Classification ambiguous: {0}")]
    ClassificationAmbiguous(String),

    #[error("Unable to generate a query snippet for this question")]
    SnippetUngenerable,

    #[error("Execution error: {0}")]
    ExecutionFault(String),

    #[error("Causal model error: {0}")]
    CausalModelFault(String),

    #[error("LLM unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for AssistantError {
    fn from(err: polars::error::PolarsError) -> Self {
        AssistantError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
