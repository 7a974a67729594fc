//! Runtime configuration.
//!
//! Values come from the process environment (a `.env` file is honoured by the
//! binary before this is read). CLI flags override individual fields afterwards.

use crate::error::{AssistantError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_DATA_PATH: &str = "data/data_cleaned.csv";
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const MAX_RETRIES_CEILING: u32 = 5;
pub const DEFAULT_CAUSAL_SAMPLES: usize = 2000;
pub const DEFAULT_CAUSAL_SEED: u64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// API key for the OpenAI-compatible endpoint. Never serialized.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub data_path: PathBuf,
    pub max_retries: u32,
    /// Reference date for time-period resolution. `None` means today.
    pub as_of: Option<NaiveDate>,
    /// Date whose rows form the target sample of a causal query.
    /// `None` means the latest date present in the merchant's data.
    pub causal_target_date: Option<NaiveDate>,
    pub causal_num_samples: usize,
    pub causal_seed: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            max_retries: DEFAULT_MAX_RETRIES,
            as_of: None,
            causal_target_date: None,
            causal_num_samples: DEFAULT_CAUSAL_SAMPLES,
            causal_seed: DEFAULT_CAUSAL_SEED,
        }
    }
}

impl AssistantConfig {
    /// Build a config from the current process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.api_key = get("OPENAI_API_KEY");
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("ASSISTANT_MODEL") {
            config.model = model;
        }
        if let Some(path) = get("ASSISTANT_DATA_PATH") {
            config.data_path = PathBuf::from(path);
        }
        if let Some(raw) = get("ASSISTANT_MAX_RETRIES") {
            config.max_retries = parse_value::<u32>("ASSISTANT_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = get("ASSISTANT_AS_OF") {
            config.as_of = Some(parse_date("ASSISTANT_AS_OF", &raw)?);
        }
        if let Some(raw) = get("CAUSAL_TARGET_DATE") {
            config.causal_target_date = Some(parse_date("CAUSAL_TARGET_DATE", &raw)?);
        }
        if let Some(raw) = get("CAUSAL_NUM_SAMPLES") {
            config.causal_num_samples = parse_value::<usize>("CAUSAL_NUM_SAMPLES", &raw)?;
        }
        if let Some(raw) = get("CAUSAL_SEED") {
            config.causal_seed = parse_value::<u64>("CAUSAL_SEED", &raw)?;
        }

        config.validate()
    }

    /// Clamp and check values that have hard bounds.
    pub fn validate(mut self) -> Result<Self> {
        // At least one retry before an oracle failure is surfaced.
        self.max_retries = self.max_retries.clamp(1, MAX_RETRIES_CEILING);
        if self.causal_num_samples == 0 {
            return Err(AssistantError::Config(
                "CAUSAL_NUM_SAMPLES must be greater than zero".to_string(),
            ));
        }
        if self.model.is_empty() {
            return Err(AssistantError::Config("model id must not be empty".to_string()));
        }
        Ok(self)
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            AssistantError::Config(
                "OPENAI_API_KEY is not set. Export it or add it to .env".to_string(),
            )
        })
    }

    pub fn as_of_or_today(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| AssistantError::Config(format!("{} has an invalid value: {}", key, raw)))
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        AssistantError::Config(format!("{} must be YYYY-MM-DD ({}): {}", key, e, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = AssistantConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.data_path, PathBuf::from(DEFAULT_DATA_PATH));
        assert!(config.api_key.is_none());
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_overrides_and_retry_clamp() {
        let config = AssistantConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:9000/v1/"),
            ("ASSISTANT_MAX_RETRIES", "0"),
            ("CAUSAL_TARGET_DATE", "2025-05-05"),
        ]))
        .unwrap();
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        assert_eq!(config.base_url, "http://localhost:9000/v1");
        assert_eq!(config.max_retries, 1);
        assert_eq!(
            config.causal_target_date,
            NaiveDate::from_ymd_opt(2025, 5, 5)
        );
    }

    #[test]
    fn test_malformed_values_are_config_errors() {
        let err = AssistantConfig::from_lookup(lookup(&[("CAUSAL_TARGET_DATE", "05/05/2025")]))
            .unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));

        let err = AssistantConfig::from_lookup(lookup(&[("CAUSAL_NUM_SAMPLES", "0")])).unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));
    }
}
