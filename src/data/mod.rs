//! Tabular Data Gateway: loading, merchant filtering and derived metrics.

pub mod dataset;
pub mod schema;

pub use dataset::{CardsSummary, Dataset};
