//! Generates performance stats for backtest

use itertools::Itertools;
use serde::Serialize;
use time::Date;

use crate::types::PortfolioSnapshot;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const DAYS_PER_YEAR: f64 = 365.25;

/// Outcome of a single statistic. Callers that only want numbers use [Measured::or_zero], which is
/// how every "cannot compute" case is reported externally, but tests and diagnostics can tell a
/// statistic that is legitimately zero from one that had too little data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Measured {
    Value(f64),
    NotComputable,
}

impl Measured {
    pub fn or_zero(&self) -> f64 {
        match self {
            Measured::Value(v) => *v,
            Measured::NotComputable => 0.0,
        }
    }

    pub fn is_computable(&self) -> bool {
        matches!(self, Measured::Value(_))
    }

    fn map(self, f: impl FnOnce(f64) -> f64) -> Measured {
        match self {
            Measured::Value(v) => Measured::Value(f(v)),
            Measured::NotComputable => Measured::NotComputable,
        }
    }
}

/// Summary statistics for a completed backtest. Percentages are in percent (20.0 is 20%) and
/// every float is rounded to two decimals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub annualized_volatility_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub best_day_pct: f64,
    pub worst_day_pct: f64,
    pub total_days: usize,
}

/// Unrounded statistics, each tagged with whether it could be computed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetailedMetrics {
    pub total_return_pct: Measured,
    pub annualized_return_pct: Measured,
    pub annualized_volatility_pct: Measured,
    pub sharpe_ratio: Measured,
    pub max_drawdown_pct: Measured,
    pub best_day_pct: Measured,
    pub worst_day_pct: Measured,
    pub total_days: usize,
}

impl DetailedMetrics {
    pub fn reported(&self) -> PerformanceMetrics {
        let report = |m: Measured| round_to_cents(m.or_zero());
        PerformanceMetrics {
            total_return_pct: report(self.total_return_pct),
            annualized_return_pct: report(self.annualized_return_pct),
            annualized_volatility_pct: report(self.annualized_volatility_pct),
            sharpe_ratio: report(self.sharpe_ratio),
            max_drawdown_pct: report(self.max_drawdown_pct),
            best_day_pct: report(self.best_day_pct),
            worst_day_pct: report(self.worst_day_pct),
            total_days: self.total_days,
        }
    }
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Group of functions common to portfolio performance calculations.
struct CalculationAlgos;

impl CalculationAlgos {
    //Simple daily returns. A return off a zero value cannot be computed and is recorded as zero.
    fn returns(values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .tuple_windows()
            .map(|(start, end)| {
                if *start == 0.0 {
                    0.0
                } else {
                    (end - start) / start
                }
            })
            .collect_vec()
    }

    //Sample variance, n - 1 denominator
    fn var(values: &[f64]) -> Measured {
        let count = values.len();
        if count < 2 {
            return Measured::NotComputable;
        }
        let mean: f64 = values.iter().sum::<f64>() / (count as f64);
        let sum_of_diff: f64 = values
            .iter()
            .map(|ret| ret - mean)
            .map(|diff| diff.powf(2.0))
            .sum();
        Measured::Value(sum_of_diff / ((count - 1) as f64))
    }

    fn vol(values: &[f64]) -> Measured {
        //Accepts returns not raw portfolio values
        CalculationAlgos::var(values).map(f64::sqrt)
    }

    //Largest fall from the running peak in percent. The peak starts at the first value.
    fn maxdd(values: &[f64]) -> Measured {
        let mut peak = match values.first() {
            Some(first) => *first,
            None => return Measured::NotComputable,
        };
        let mut maxdd: Option<f64> = None;
        for value in values {
            if *value > peak {
                peak = *value;
            }
            if peak > 0.0 {
                let drawdown = (peak - value) / peak * 100.0;
                maxdd = Some(maxdd.map_or(drawdown, |curr: f64| curr.max(drawdown)));
            }
        }
        match maxdd {
            Some(dd) => Measured::Value(dd),
            None => Measured::NotComputable,
        }
    }
}

/// Calculates performance statistics from the equity curve of a backtest.
///
/// Intended to be run after the simulation is completed.
#[derive(Debug, Clone)]
pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Returns `None` when there are no values, a zero-length backtest has no statistics.
    pub fn calculate(
        values: &[f64],
        initial_capital: f64,
        start_date: Date,
        end_date: Date,
    ) -> Option<PerformanceMetrics> {
        Self::calculate_detailed(values, initial_capital, start_date, end_date)
            .map(|detailed| detailed.reported())
    }

    pub fn from_snapshots(
        snapshots: &[PortfolioSnapshot],
        initial_capital: f64,
        start_date: Date,
        end_date: Date,
    ) -> Option<PerformanceMetrics> {
        let values = snapshots.iter().map(|snap| *snap.value).collect_vec();
        Self::calculate(&values, initial_capital, start_date, end_date)
    }

    pub fn calculate_detailed(
        values: &[f64],
        initial_capital: f64,
        start_date: Date,
        end_date: Date,
    ) -> Option<DetailedMetrics> {
        let final_value = *values.last()?;

        let total_return_pct = if initial_capital > 0.0 {
            Measured::Value((final_value - initial_capital) / initial_capital * 100.0)
        } else {
            Measured::NotComputable
        };

        let years = (end_date - start_date).whole_days() as f64 / DAYS_PER_YEAR;
        let annualized_return_pct = if years > 0.0 && initial_capital > 0.0 {
            Measured::Value(((final_value / initial_capital).powf(1.0 / years) - 1.0) * 100.0)
        } else {
            Measured::NotComputable
        };

        let returns = CalculationAlgos::returns(values);

        let annualized_volatility_pct = CalculationAlgos::vol(&returns)
            .map(|vol| vol * TRADING_DAYS_PER_YEAR.sqrt() * 100.0);

        //Zero risk-free rate
        let sharpe_ratio = match (annualized_return_pct, annualized_volatility_pct) {
            (Measured::Value(ret), Measured::Value(vol)) if vol > 0.0 => Measured::Value(ret / vol),
            _ => Measured::NotComputable,
        };

        let (best_day_pct, worst_day_pct) = if returns.is_empty() {
            (Measured::NotComputable, Measured::NotComputable)
        } else {
            let best = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let worst = returns.iter().copied().fold(f64::INFINITY, f64::min);
            (Measured::Value(best * 100.0), Measured::Value(worst * 100.0))
        };

        Some(DetailedMetrics {
            total_return_pct,
            annualized_return_pct,
            annualized_volatility_pct,
            sharpe_ratio,
            max_drawdown_pct: CalculationAlgos::maxdd(values),
            best_day_pct,
            worst_day_pct,
            total_days: values.len(),
        })
    }
}
