//! JSON configuration for the backtest binary.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};

use crate::error::BacktestError;
use crate::profile::ProfileRegistry;
use crate::simcontext::BacktestSettings;
use crate::types::{iso_date, PortfolioAllocation};

fn default_years_back() -> i64 {
    3
}

fn default_initial_capital() -> f64 {
    10_000.0
}

fn default_frequency() -> String {
    "quarterly".to_string()
}

/// Backtest parameters. Every field has a default so `{}` is a valid config.
///
/// When `start_date` or `end_date` is missing the window ends today (UTC) and starts
/// `years_back` × 365 days earlier. Without `profiles` the built-in registry is used.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default, with = "iso_date::option")]
    pub start_date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub end_date: Option<Date>,
    #[serde(default = "default_years_back")]
    pub years_back: i64,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    #[serde(default = "default_frequency")]
    pub rebalance_frequency: String,
    #[serde(default)]
    pub transaction_cost: f64,
    #[serde(default)]
    pub profiles: Option<BTreeMap<String, PortfolioAllocation>>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            years_back: default_years_back(),
            initial_capital: default_initial_capital(),
            rebalance_frequency: default_frequency(),
            transaction_cost: 0.0,
            profiles: None,
        }
    }
}

impl BacktestConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("could not read config {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Resolves the backtest window, filling missing ends relative to `today`. A look-back longer
    /// than the calendar supports starts at [Date::MIN], a negative one is treated as zero.
    pub fn window(&self, today: Date) -> (Date, Date) {
        let end = self.end_date.unwrap_or(today);
        let start = self.start_date.unwrap_or_else(|| {
            let max_days = (end - Date::MIN).whole_days();
            let days = self
                .years_back
                .checked_mul(365)
                .map_or(max_days, |days| days.clamp(0, max_days));
            end.checked_sub(Duration::days(days)).unwrap_or(Date::MIN)
        });
        (start, end)
    }

    pub fn settings(&self) -> Result<BacktestSettings, BacktestError> {
        let frequency = self.rebalance_frequency.parse()?;
        let (start, end) = self.window(OffsetDateTime::now_utc().date());
        Ok(BacktestSettings::new(start, end)
            .with_initial_capital(self.initial_capital)
            .with_frequency(frequency)
            .with_transaction_cost(self.transaction_cost))
    }

    pub fn registry(&self) -> ProfileRegistry {
        match &self.profiles {
            Some(profiles) => profiles
                .iter()
                .map(|(name, allocation)| (name.clone(), allocation.clone()))
                .collect(),
            None => ProfileRegistry::default(),
        }
    }
}
