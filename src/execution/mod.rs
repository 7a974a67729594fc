//! Sandboxed execution of generated analysis snippets.
//!
//! Snippets are written in a small pandas-flavoured dialect. They are parsed
//! into an AST and interpreted over polars; nothing reaches a host language
//! runtime, the filesystem or the network. The only names in scope are the
//! merchant frame `df`, the helpers in [`utils`], `time_periods` and a handful
//! of builtins.

pub mod interpreter;
pub mod lexer;
pub mod methods;
pub mod ops;
pub mod parser;
pub mod sanitize;
pub mod utils;
pub mod value;

pub use interpreter::Interpreter;
pub use sanitize::strip_code_fences;
pub use value::Value;

use crate::data::Dataset;
use crate::time::TimePeriods;
use polars::error::PolarsError;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SnippetError {
    #[error("invalid syntax (line {line}): {message}")]
    Syntax { line: usize, message: String },

    #[error("name '{0}' is not defined")]
    Name(String),

    #[error("'{type_name}' object has no attribute '{attribute}'")]
    Attribute { type_name: String, attribute: String },

    #[error("{0}")]
    Type(String),

    #[error("KeyError: '{0}'")]
    Key(String),

    #[error("{0}")]
    Value(String),

    #[error("division by zero")]
    ZeroDivision,

    #[error("import of '{0}' is not permitted")]
    ImportDenied(String),

    #[error("snippet contains no statements")]
    Empty,

    #[error("{0}")]
    Data(String),
}

impl From<PolarsError> for SnippetError {
    fn from(err: PolarsError) -> Self {
        SnippetError::Data(err.to_string())
    }
}

/// What running a snippet produced.
///
/// Faults are data, not errors: they are rendered into the narration prompt
/// so the explanation can say the computation failed.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// The last statement was an expression.
    Value(Value),
    /// The snippet ran but ended in a statement (an assignment).
    NoValue,
    Fault(String),
}

impl ExecutionOutcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, ExecutionOutcome::Fault(_))
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionOutcome::Value(value) => write!(f, "{}", value),
            ExecutionOutcome::NoValue => write!(f, "None"),
            ExecutionOutcome::Fault(detail) => write!(f, "Execution error: {}", detail),
        }
    }
}

/// Strip fences, parse and run `code` against the merchant slice.
pub fn execute_snippet(code: &str, dataset: &Dataset, time_periods: &TimePeriods) -> ExecutionOutcome {
    let source = strip_code_fences(code);
    let result = parser::parse_program(&source).and_then(|program| {
        let mut interpreter = Interpreter::new(dataset, time_periods);
        interpreter.run(&program)
    });

    match result {
        Ok(Some(value)) => {
            debug!("Snippet produced a {}", value.type_name());
            ExecutionOutcome::Value(value)
        }
        Ok(None) => ExecutionOutcome::NoValue,
        Err(e) => {
            warn!("Snippet failed: {}", e);
            ExecutionOutcome::Fault(e.to_string())
        }
    }
}
