//! Causal attribution: why a KPI moved between a baseline and a target day.

pub mod engine;
pub mod graph;
pub mod mechanism;
pub mod model;

pub use engine::{CausalEngine, CausalReport};
pub use graph::CausalGraph;
pub use model::{AttributionScores, CausalModel, StructuralCausalModel};

use std::collections::HashMap;

/// Numeric column per graph node, all of equal length.
pub type NodeColumns = HashMap<String, Vec<f64>>;
