use crate::data::schema::{
    CAPTURED, DATE, MERCHANT, NUMERIC_COLUMNS, REFUND_AMOUNT, REQUIRED_COLUMNS,
    SETTLEMENT_AMOUNT, TRANSACTION_STATUS,
};
use crate::error::{AssistantError, Result};
use crate::execution::utils::safe_divide;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Days between 1970-01-01 and `date`, the physical value of a polars Date.
pub fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    date.signed_duration_since(epoch).num_days() as i32
}

pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days as i64)))
}

/// Literal that compares against a Date column.
pub fn date_literal(date: NaiveDate) -> Expr {
    lit(days_since_epoch(date)).cast(DataType::Date)
}

/// Card metrics for one merchant.
///
/// On an empty slice every field is `0` / `0.0`: the average settlement and
/// success rate are defined as zero rather than NaN so callers can serialize
/// them without special cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardsSummary {
    pub total_transactions: usize,
    pub total_refund_amount: f64,
    pub average_settlement_amount: f64,
    pub success_rate: f64,
}

/// Typed, in-memory transaction table.
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    /// Read the CSV at `path`, coerce monetary columns to Float64 and the date
    /// column to a calendar date. Any failure is `DataUnavailable`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AssistantError::DataUnavailable(format!(
                "dataset not found at {}",
                path.display()
            )));
        }

        let frame = LazyCsvReader::new(path)
            .with_has_header(true)
            .with_try_parse_dates(true)
            .with_infer_schema_length(Some(1000))
            .finish()
            .and_then(|lf| lf.collect())
            .map_err(|e| {
                AssistantError::DataUnavailable(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let dataset = Self::from_frame(frame)?;
        info!("Loaded {} rows from {}", dataset.height(), path.display());
        Ok(dataset)
    }

    /// Validate and type an already-built frame.
    pub fn from_frame(frame: DataFrame) -> Result<Self> {
        let present: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !present.iter().any(|p| p.as_str() == *c))
            .collect();
        if !missing.is_empty() {
            return Err(AssistantError::DataUnavailable(format!(
                "dataset is missing columns: {}",
                missing.join(", ")
            )));
        }

        let date_expr = match frame.column(DATE)?.dtype() {
            DataType::Date => col(DATE),
            DataType::Datetime(_, _) => col(DATE).cast(DataType::Date),
            DataType::String => col(DATE).str().to_date(StrptimeOptions {
                format: Some("%Y-%m-%d".into()),
                strict: false,
                ..Default::default()
            }),
            other => {
                return Err(AssistantError::DataUnavailable(format!(
                    "column '{}' has unsupported type {}",
                    DATE, other
                )))
            }
        };

        let mut casts: Vec<Expr> = NUMERIC_COLUMNS
            .iter()
            .map(|c| col(c).cast(DataType::Float64))
            .collect();
        casts.push(col(MERCHANT).cast(DataType::String));
        casts.push(date_expr.alias(DATE));

        let frame = frame
            .lazy()
            .with_columns(casts)
            .collect()
            .map_err(|e| AssistantError::DataUnavailable(format!("failed to type dataset: {}", e)))?;

        let bad_dates = frame.column(DATE)?.null_count();
        if bad_dates > 0 {
            return Err(AssistantError::DataUnavailable(format!(
                "{} rows have an unparsable '{}' value",
                bad_dates, DATE
            )));
        }

        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Rows whose merchant display name equals `merchant` exactly (case-sensitive).
    /// No match gives an empty dataset, not an error.
    pub fn filter_by_merchant(&self, merchant: &str) -> Result<Self> {
        let frame = self
            .frame
            .clone()
            .lazy()
            .filter(col(MERCHANT).eq(lit(merchant)))
            .collect()?;
        debug!("Merchant '{}' has {} of {} rows", merchant, frame.height(), self.height());
        Ok(Self { frame })
    }

    /// Split into (every other date, exactly `target`).
    pub fn partition_by_date(&self, target: NaiveDate) -> Result<(Self, Self)> {
        let baseline = self
            .frame
            .clone()
            .lazy()
            .filter(col(DATE).neq(date_literal(target)))
            .collect()?;
        let on_target = self
            .frame
            .clone()
            .lazy()
            .filter(col(DATE).eq(date_literal(target)))
            .collect()?;
        Ok((Self { frame: baseline }, Self { frame: on_target }))
    }

    pub fn latest_date(&self) -> Result<Option<NaiveDate>> {
        if self.is_empty() {
            return Ok(None);
        }
        let out = self
            .frame
            .clone()
            .lazy()
            .select([col(DATE).max().cast(DataType::Int32).alias("latest")])
            .collect()?;
        let days = out.column("latest")?.i32()?.get(0);
        Ok(days.and_then(date_from_days))
    }

    pub fn total_transactions(&self) -> usize {
        self.height()
    }

    /// Absolute value of the summed refund column; `0.0` when empty.
    pub fn total_refund_amount(&self) -> Result<f64> {
        Ok(self.sum_of(REFUND_AMOUNT)?.abs())
    }

    /// Mean settlement per row; `0.0` when empty.
    pub fn average_settlement_amount(&self) -> Result<f64> {
        if self.is_empty() {
            return Ok(0.0);
        }
        let out = self
            .frame
            .clone()
            .lazy()
            .select([col(SETTLEMENT_AMOUNT).mean().alias("avg")])
            .collect()?;
        Ok(first_f64(&out, "avg")?.unwrap_or(0.0))
    }

    /// Share of rows whose status is exactly `CAPTURED`; `0.0` when empty.
    pub fn success_rate(&self) -> Result<f64> {
        if self.is_empty() {
            return Ok(0.0);
        }
        let out = self
            .frame
            .clone()
            .lazy()
            .select([col(TRANSACTION_STATUS)
                .cast(DataType::String)
                .eq(lit(CAPTURED))
                .cast(DataType::Float64)
                .sum()
                .alias("captured")])
            .collect()?;
        let captured = first_f64(&out, "captured")?.unwrap_or(0.0);
        Ok(safe_divide(captured, self.height() as f64))
    }

    /// Gross merchandise value: total settled amount.
    pub fn gmv(&self) -> Result<f64> {
        self.sum_of(SETTLEMENT_AMOUNT)
    }

    /// Refunded over settled, zero when nothing settled.
    pub fn refund_rate(&self) -> Result<f64> {
        Ok(safe_divide(self.sum_of(REFUND_AMOUNT)?, self.gmv()?))
    }

    pub fn summary(&self) -> Result<CardsSummary> {
        Ok(CardsSummary {
            total_transactions: self.total_transactions(),
            total_refund_amount: self.total_refund_amount()?,
            average_settlement_amount: self.average_settlement_amount()?,
            success_rate: self.success_rate()?,
        })
    }

    fn sum_of(&self, column: &str) -> Result<f64> {
        if self.is_empty() {
            return Ok(0.0);
        }
        let out = self
            .frame
            .clone()
            .lazy()
            .select([col(column).sum().alias("total")])
            .collect()?;
        Ok(first_f64(&out, "total")?.unwrap_or(0.0))
    }

    /// Column values as floats; non-numeric cells become `None`.
    pub fn numeric_values(&self, column: &str) -> Result<Vec<Option<f64>>> {
        let series = self.frame.column(column)?.cast(&DataType::Float64)?;
        let values = series.f64()?.into_iter().collect();
        Ok(values)
    }

    /// Column values rendered as strings.
    pub fn string_values(&self, column: &str) -> Result<Vec<Option<String>>> {
        let series = self.frame.column(column)?.cast(&DataType::String)?;
        let values = series
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect();
        Ok(values)
    }

    /// Drop the named columns (ignoring absent ones), then every row with a null
    /// in what remains.
    pub fn without_columns_and_nulls(&self, columns: &[&str]) -> Result<Self> {
        let keep: Vec<Expr> = self
            .frame
            .get_column_names()
            .iter()
            .filter(|name| !columns.contains(*name))
            .map(|name| col(name))
            .collect();
        let frame = self
            .frame
            .clone()
            .lazy()
            .select(keep)
            .drop_nulls(None)
            .collect()?;
        Ok(Self { frame })
    }
}

fn first_f64(df: &DataFrame, column: &str) -> Result<Option<f64>> {
    let series = df.column(column)?.cast(&DataType::Float64)?;
    let value = series.f64()?.get(0);
    Ok(value.filter(|v| v.is_finite()))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn hundred_rows_five_captured() -> Dataset {
        let statuses: Vec<&str> = (0..100)
            .map(|i| if i < 5 { "CAPTURED" } else { "REFUNDED" })
            .collect();
        dataset_for("A", &statuses, 5)
    }

    #[test]
    fn test_success_rate_over_merchant_slice() {
        let dataset = hundred_rows_five_captured();
        let slice = dataset.filter_by_merchant("A").unwrap();
        assert_eq!(slice.total_transactions(), 100);
        assert!((slice.success_rate().unwrap() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_absent_merchant_summary_is_zero() {
        let dataset = hundred_rows_five_captured();
        let summary = dataset.filter_by_merchant("Nobody").unwrap().summary().unwrap();
        assert_eq!(
            summary,
            CardsSummary {
                total_transactions: 0,
                total_refund_amount: 0.0,
                average_settlement_amount: 0.0,
                success_rate: 0.0,
            }
        );
    }

    #[test]
    fn test_merchant_match_is_case_sensitive() {
        let dataset = hundred_rows_five_captured();
        assert_eq!(dataset.filter_by_merchant("a").unwrap().height(), 0);
    }

    #[test]
    fn test_refund_total_is_absolute() {
        let dataset = dataset_for("A", &["CAPTURED"; 8], 2);
        let total = dataset.total_refund_amount().unwrap();
        // refunds are 0, -10, ..., -60, 0
        assert!((total - 210.0).abs() < 1e-9);
        assert!(dataset.refund_rate().unwrap() < 0.0);
    }

    #[test]
    fn test_string_dates_are_typed_and_partitioned() {
        let dataset = dataset_for("A", &["CAPTURED"; 10], 5);
        assert_eq!(dataset.frame().column(DATE).unwrap().dtype(), &DataType::Date);

        let latest = dataset.latest_date().unwrap().unwrap();
        assert_eq!(latest, NaiveDate::from_ymd_opt(2025, 5, 5).unwrap());

        let (baseline, target) = dataset.partition_by_date(latest).unwrap();
        assert_eq!(target.height(), 2);
        assert_eq!(baseline.height(), 8);
    }

    #[test]
    fn test_missing_file_is_data_unavailable() {
        let err = Dataset::load("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, AssistantError::DataUnavailable(_)));
    }

    #[test]
    fn test_missing_columns_are_data_unavailable() {
        let frame = df! [ "Date" => ["2025-05-01"] ].unwrap();
        let err = Dataset::from_frame(frame).unwrap_err();
        assert!(matches!(err, AssistantError::DataUnavailable(_)));
    }
}
