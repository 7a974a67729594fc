use crate::causal::graph::CausalGraph;
use crate::causal::model::{AttributionScores, CausalModel, StructuralCausalModel};
use crate::causal::NodeColumns;
use crate::classifier::Kpi;
use crate::config::{AssistantConfig, DEFAULT_CAUSAL_SAMPLES, DEFAULT_CAUSAL_SEED};
use crate::data::schema::{
    ACQUIRER_NAME, CATEGORICAL_COLUMNS, CONVENIENCE_FEE, REFUND_AMOUNT, SETTLEMENT_AMOUNT,
};
use crate::data::Dataset;
use crate::error::{AssistantError, Result};
use crate::time::iso;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Columns with too little signal to model.
const DROPPED_COLUMNS: &[&str] = &[CONVENIENCE_FEE, ACQUIRER_NAME];

/// The refund -> settlement chain is never reported back as its own cause.
const OUTCOME_NODES: &[&str] = &[REFUND_AMOUNT, SETTLEMENT_AMOUNT];

#[derive(Debug, Clone, Serialize)]
pub struct CausalReport {
    pub kpi: String,
    pub target_date: NaiveDate,
    pub baseline_rows: usize,
    pub target_rows: usize,
    #[serde(skip)]
    pub scores: AttributionScores,
}

impl CausalReport {
    /// `node: magnitude` lines, strongest first.
    pub fn score_lines(&self) -> String {
        self.scores.to_prompt_lines()
    }
}

/// Alphabetical integer codes per categorical column, fitted once on the full
/// merchant slice so baseline and target share one encoding.
#[derive(Debug, Clone, Default)]
pub struct CategoricalEncoder {
    levels: HashMap<String, Vec<String>>,
}

impl CategoricalEncoder {
    pub fn fit(dataset: &Dataset, columns: &[&str]) -> Result<Self> {
        let mut levels = HashMap::new();
        for column in columns {
            let mut values: Vec<String> = dataset
                .string_values(column)?
                .into_iter()
                .flatten()
                .collect();
            values.sort();
            values.dedup();
            levels.insert(column.to_string(), values);
        }
        Ok(Self { levels })
    }

    pub fn code(&self, column: &str, value: &str) -> Option<usize> {
        self.levels
            .get(column)
            .and_then(|levels| levels.binary_search_by(|l| l.as_str().cmp(value)).ok())
    }

    pub fn is_categorical(&self, column: &str) -> bool {
        self.levels.contains_key(column)
    }

    /// One numeric column per graph node.
    pub fn encode(&self, dataset: &Dataset, graph: &CausalGraph) -> Result<NodeColumns> {
        let mut columns = NodeColumns::new();
        for node in graph.nodes() {
            let values = if self.is_categorical(node) {
                dataset
                    .string_values(node)?
                    .into_iter()
                    .map(|v| v.and_then(|v| self.code(node, &v)).map(|c| c as f64))
                    .collect::<Option<Vec<f64>>>()
            } else {
                dataset
                    .numeric_values(node)?
                    .into_iter()
                    .collect::<Option<Vec<f64>>>()
            };
            let values = values.ok_or_else(|| {
                AssistantError::CausalModelFault(format!("column '{}' has unusable values", node))
            })?;
            columns.insert(node.clone(), values);
        }
        Ok(columns)
    }
}

/// Runs one attribution for one merchant slice and one KPI.
#[derive(Debug, Clone)]
pub struct CausalEngine {
    num_samples: usize,
    seed: u64,
    target_date: Option<NaiveDate>,
}

impl Default for CausalEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CAUSAL_SAMPLES, DEFAULT_CAUSAL_SEED)
    }
}

impl CausalEngine {
    pub fn new(num_samples: usize, seed: u64) -> Self {
        Self {
            num_samples,
            seed,
            target_date: None,
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        Self::new(config.causal_num_samples, config.causal_seed)
            .with_target_date(config.causal_target_date)
    }

    /// Compare against this day instead of the latest one in the data.
    pub fn with_target_date(mut self, target_date: Option<NaiveDate>) -> Self {
        self.target_date = target_date;
        self
    }

    /// Drop low-signal columns, then every row with a missing value.
    pub fn prepare(&self, merchant_rows: &Dataset) -> Result<Dataset> {
        let prepared = merchant_rows.without_columns_and_nulls(DROPPED_COLUMNS)?;
        debug!(
            "Prepared {} of {} rows for causal fitting",
            prepared.height(),
            merchant_rows.height()
        );
        if prepared.is_empty() {
            return Err(AssistantError::CausalModelFault(
                "no complete rows for this merchant".to_string(),
            ));
        }
        Ok(prepared)
    }

    pub fn attribute(&self, merchant_rows: &Dataset, kpi: &Kpi) -> Result<CausalReport> {
        let kpi_node = kpi
            .column()
            .ok_or_else(|| AssistantError::CausalModelFault(kpi.to_string()))?;

        let prepared = self.prepare(merchant_rows)?;
        let graph = CausalGraph::transactions()?;
        let encoder = CategoricalEncoder::fit(&prepared, CATEGORICAL_COLUMNS)?;

        let mut model = StructuralCausalModel::new(graph.clone(), self.num_samples, self.seed);
        model.fit(&encoder.encode(&prepared, &graph)?)?;

        let target_date = match self.target_date {
            Some(date) => date,
            None => prepared.latest_date()?.ok_or_else(|| {
                AssistantError::CausalModelFault("no dated rows to compare".to_string())
            })?,
        };
        let (baseline, target) = prepared.partition_by_date(target_date)?;
        if target.is_empty() {
            return Err(AssistantError::CausalModelFault(format!(
                "no transactions on {}",
                iso(target_date)
            )));
        }
        if baseline.is_empty() {
            return Err(AssistantError::CausalModelFault(format!(
                "no transactions before or after {} to compare against",
                iso(target_date)
            )));
        }

        let scores = model
            .attribute(
                &encoder.encode(&baseline, &graph)?,
                &encoder.encode(&target, &graph)?,
                kpi_node,
            )?
            .without(OUTCOME_NODES)
            .magnitudes();

        info!(
            "Attributed change in '{}' on {} ({} baseline rows, {} target rows) across {} factors",
            kpi_node,
            iso(target_date),
            baseline.height(),
            target.height(),
            scores.len()
        );

        Ok(CausalReport {
            kpi: kpi_node.to_string(),
            target_date,
            baseline_rows: baseline.height(),
            target_rows: target.height(),
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::fixtures::dataset_for;
    use crate::data::schema::{BANK_COMMISSION, PAYMENT_MODE, PAYOUT_STATUS};

    fn merchant_rows(rows: usize, days: u32) -> Dataset {
        let statuses: Vec<&str> = (0..rows)
            .map(|i| match i % 4 {
                0 => "REFUNDED",
                1 => "FAILED",
                _ => "CAPTURED",
            })
            .collect();
        dataset_for("Acme", &statuses, days)
    }

    fn engine() -> CausalEngine {
        CausalEngine::new(200, 7)
    }

    #[test]
    fn test_refund_attribution_excludes_outcomes() {
        let report = engine().attribute(&merchant_rows(60, 5), &Kpi::RefundAmount).unwrap();
        assert_eq!(report.kpi, REFUND_AMOUNT);
        assert_eq!(report.target_date, NaiveDate::from_ymd_opt(2025, 5, 5).unwrap());
        assert_eq!(report.target_rows, 12);
        assert_eq!(report.baseline_rows, 48);

        assert_eq!(report.scores.len(), 6);
        assert!(report.scores.contains(PAYMENT_MODE));
        assert!(report.scores.contains(PAYOUT_STATUS));
        assert!(!report.scores.contains(REFUND_AMOUNT));
        assert!(!report.scores.contains(SETTLEMENT_AMOUNT));
        assert!(report.scores.iter().all(|(_, s)| s >= 0.0));
    }

    #[test]
    fn test_settlement_attribution_excludes_refund_mediator() {
        let report = engine().attribute(&merchant_rows(60, 5), &Kpi::SettlementAmount).unwrap();
        assert!(!report.scores.contains(SETTLEMENT_AMOUNT));
        assert!(!report.scores.contains(REFUND_AMOUNT));
        assert!(report.scores.contains(BANK_COMMISSION));
        assert_eq!(report.scores.len(), 9);

        let lines = report.score_lines();
        assert_eq!(lines.lines().count(), 9);
        for line in lines.lines() {
            let (_, score) = line.rsplit_once(": ").unwrap();
            assert_eq!(score.split('.').nth(1).map(str::len), Some(2), "{}", line);
        }
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let rows = merchant_rows(40, 4);
        let a = engine().attribute(&rows, &Kpi::RefundAmount).unwrap();
        let b = engine().attribute(&rows, &Kpi::RefundAmount).unwrap();
        assert_eq!(a.scores, b.scores);
    }

    #[test]
    fn test_unknown_kpi_fails() {
        let err = engine()
            .attribute(&merchant_rows(20, 4), &Kpi::Unknown("gmv".into()))
            .unwrap_err();
        assert!(matches!(err, AssistantError::CausalModelFault(_)));
    }

    #[test]
    fn test_empty_partitions_fail() {
        let single_day = merchant_rows(20, 1);
        assert!(matches!(
            engine().attribute(&single_day, &Kpi::RefundAmount),
            Err(AssistantError::CausalModelFault(_))
        ));

        let missing_day = engine().with_target_date(NaiveDate::from_ymd_opt(2024, 1, 1));
        assert!(missing_day.attribute(&merchant_rows(20, 4), &Kpi::RefundAmount).is_err());

        let empty = dataset_for("Acme", &[], 1);
        assert!(engine().attribute(&empty, &Kpi::RefundAmount).is_err());
    }

    #[test]
    fn test_encoding_is_alphabetical() {
        let rows = merchant_rows(8, 2);
        let encoder = CategoricalEncoder::fit(&rows, CATEGORICAL_COLUMNS).unwrap();
        assert_eq!(encoder.code(PAYMENT_MODE, "CREDIT/DEBIT CARD"), Some(0));
        assert_eq!(encoder.code(PAYMENT_MODE, "UPI"), Some(1));
        assert_eq!(encoder.code(PAYMENT_MODE, "NETBANKING"), None);
    }
}
