//! Writes backtest results to disk as a JSON summary and a Markdown report.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use time::Date;

use crate::error::BacktestError;
use crate::perf::PerformanceMetrics;
use crate::profile::ProfileRegistry;
use crate::simcontext::BacktestResult;
use crate::types::{format_date, iso_date, CashValue};

pub type ProfileResults = BTreeMap<String, Result<BacktestResult, BacktestError>>;

/// Dollar amount with thousands separators, negative amounts as `-$1,234.56`.
pub fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (pos, digit) in whole.chars().enumerate() {
        if pos > 0 && (whole.len() - pos) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}

/// Fraction as a percentage with one decimal, 0.123 is `12.3%`.
pub fn format_percentage(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn metrics_or_empty<S: Serializer>(
    metrics: &Option<&PerformanceMetrics>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match metrics {
        Some(metrics) => metrics.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

#[derive(Debug, Serialize)]
struct CompletedSummary<'a> {
    risk_profile: &'a str,
    #[serde(with = "iso_date")]
    start_date: Date,
    #[serde(with = "iso_date")]
    end_date: Date,
    initial_capital: CashValue,
    final_value: CashValue,
    #[serde(serialize_with = "metrics_or_empty")]
    metrics: Option<&'a PerformanceMetrics>,
    rebalance_count: usize,
    rebalance_dates: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ProfileSummary<'a> {
    Completed(CompletedSummary<'a>),
    Failed { error: String },
}

impl<'a> From<&'a Result<BacktestResult, BacktestError>> for ProfileSummary<'a> {
    fn from(outcome: &'a Result<BacktestResult, BacktestError>) -> Self {
        match outcome {
            Ok(result) => ProfileSummary::Completed(CompletedSummary {
                risk_profile: &result.risk_profile,
                start_date: result.start_date,
                end_date: result.end_date,
                initial_capital: result.initial_capital,
                final_value: result.final_value,
                metrics: result.metrics.as_ref(),
                rebalance_count: result.rebalance_count(),
                rebalance_dates: result.rebalance_dates.iter().map(format_date).collect(),
            }),
            Err(e) => ProfileSummary::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// JSON object keyed by profile name, each entry either the run summary or `{"error": ...}`.
pub struct JsonReport<'a> {
    results: &'a ProfileResults,
}

impl<'a> JsonReport<'a> {
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let summaries: BTreeMap<&str, ProfileSummary> = self
            .results
            .iter()
            .map(|(name, outcome)| (name.as_str(), ProfileSummary::from(outcome)))
            .collect();
        Ok(serde_json::to_value(summaries)?)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.to_value()?)?;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("could not create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!("REPORT: Results saved to {}", path.display());
        Ok(())
    }

    pub fn new(results: &'a ProfileResults) -> Self {
        Self { results }
    }
}

/// Human-readable report: period, summary table and per-profile details.
pub struct MarkdownReport<'a> {
    results: &'a ProfileResults,
    registry: &'a ProfileRegistry,
}

impl<'a> MarkdownReport<'a> {
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "# Backtest Results\n")?;
        writeln!(
            out,
            "Performance analysis of different risk profiles using historical data.\n"
        )?;

        if self.results.is_empty() {
            writeln!(out, "No results available.")?;
            return Ok(());
        }

        if let Some(first) = self.results.values().find_map(|outcome| outcome.as_ref().ok()) {
            writeln!(
                out,
                "**Backtest Period:** {} to {}\n",
                format_date(&first.start_date),
                format_date(&first.end_date)
            )?;
            writeln!(
                out,
                "**Initial Capital:** {}\n",
                format_currency(*first.initial_capital)
            )?;
        }

        writeln!(out, "## Summary Table\n")?;
        writeln!(
            out,
            "| Risk Profile | Total Return | Annualized Return | Volatility | Sharpe Ratio | Max Drawdown |"
        )?;
        writeln!(
            out,
            "|-------------|--------------|-------------------|------------|--------------|-------------|"
        )?;
        for (name, outcome) in self.results {
            match outcome.as_ref().map(|result| result.metrics.as_ref()) {
                Ok(Some(m)) => writeln!(
                    out,
                    "| {} | {}% | {}% | {}% | {} | {}% |",
                    name,
                    m.total_return_pct,
                    m.annualized_return_pct,
                    m.annualized_volatility_pct,
                    m.sharpe_ratio,
                    m.max_drawdown_pct
                )?,
                Ok(None) => writeln!(out, "| {} | - | - | - | - | - |", name)?,
                Err(_) => writeln!(out, "| {} | ERROR | - | - | - | - |", name)?,
            }
        }

        writeln!(out, "\n## Detailed Results\n")?;
        for (name, outcome) in self.results {
            writeln!(out, "### {}\n", name)?;
            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    writeln!(out, "**Error:** {}\n", e)?;
                    continue;
                }
            };

            writeln!(
                out,
                "**Final Portfolio Value:** {}\n",
                format_currency(*result.final_value)
            )?;
            if let Some(m) = &result.metrics {
                writeln!(out, "**Performance Metrics:**")?;
                writeln!(out, "- Total Return: {}%", m.total_return_pct)?;
                writeln!(out, "- Annualized Return: {}%", m.annualized_return_pct)?;
                writeln!(out, "- Annualized Volatility: {}%", m.annualized_volatility_pct)?;
                writeln!(out, "- Sharpe Ratio: {}", m.sharpe_ratio)?;
                writeln!(out, "- Maximum Drawdown: {}%", m.max_drawdown_pct)?;
                writeln!(out, "- Best Day: {}%", m.best_day_pct)?;
                writeln!(out, "- Worst Day: {}%", m.worst_day_pct)?;
                writeln!(out, "- Total Trading Days: {}\n", m.total_days)?;
            }
            if !result.data_quality.is_clean() {
                writeln!(
                    out,
                    "**Data Quality:** {} prices carried forward, {} fallback prices\n",
                    result.data_quality.forward_filled, result.data_quality.fallback_priced
                )?;
            }

            if let Ok(profile) = self.registry.get(name) {
                writeln!(out, "**Target Allocation:**")?;
                for (symbol, weight) in profile
                    .allocation()
                    .iter()
                    .sorted_by(|a, b| a.0.cmp(b.0))
                {
                    writeln!(out, "- {}: {}", symbol, format_percentage(**weight))?;
                }
                writeln!(out)?;
            }
        }
        Ok(())
    }

    pub fn render(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("could not create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        info!("REPORT: Markdown report saved to {}", path.display());
        Ok(())
    }

    pub fn new(results: &'a ProfileResults, registry: &'a ProfileRegistry) -> Self {
        Self { results, registry }
    }
}
