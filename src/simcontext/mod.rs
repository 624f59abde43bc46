//! Running context for backtest

mod builder;

pub use builder::SimContextBuilder;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{info, warn};
use time::Date;

use crate::error::BacktestError;
use crate::input::PriceSeries;
use crate::perf::{PerformanceCalculator, PerformanceMetrics};
use crate::portfolio::{PortfolioCalculations, PortfolioValuation};
use crate::profile::{ProfileRegistry, RiskProfile};
use crate::schedule::{FixedIntervalSchedule, RebalanceFrequency};
use crate::sim::{step, DataQuality, SimState, StepContext};
use crate::types::{CashValue, PortfolioSnapshot};

/// Parameters shared by every profile in a backtest.
#[derive(Clone, Debug, PartialEq)]
pub struct BacktestSettings {
    pub start_date: Date,
    pub end_date: Date,
    pub initial_capital: CashValue,
    pub frequency: RebalanceFrequency,
    /// Fixed cost charged against portfolio value at every rebalance.
    pub transaction_cost: CashValue,
}

impl BacktestSettings {
    pub fn with_initial_capital(mut self, initial_capital: impl Into<CashValue>) -> Self {
        self.initial_capital = initial_capital.into();
        self
    }

    pub fn with_frequency(mut self, frequency: RebalanceFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_transaction_cost(mut self, cost: impl Into<CashValue>) -> Self {
        self.transaction_cost = cost.into();
        self
    }

    /// Defaults to 10,000 of capital, quarterly rebalancing and no costs.
    pub fn new(start_date: Date, end_date: Date) -> Self {
        Self {
            start_date,
            end_date,
            initial_capital: 10_000.0.into(),
            frequency: RebalanceFrequency::Quarterly,
            transaction_cost: 0.0.into(),
        }
    }
}

/// Output of one completed backtest. Immutable once produced.
#[derive(Clone, Debug, PartialEq)]
pub struct BacktestResult {
    pub risk_profile: String,
    pub start_date: Date,
    pub end_date: Date,
    pub initial_capital: CashValue,
    pub final_value: CashValue,
    pub portfolio_values: Vec<PortfolioSnapshot>,
    pub rebalance_dates: Vec<Date>,
    /// `None` when no trading day fell inside the window.
    pub metrics: Option<PerformanceMetrics>,
    pub data_quality: DataQuality,
}

impl BacktestResult {
    pub fn equity_curve(&self) -> Vec<f64> {
        self.portfolio_values.iter().map(|snap| *snap.value).collect()
    }

    pub fn rebalance_count(&self) -> usize {
        self.rebalance_dates.len()
    }
}

/// There is no failed state: bad input is rejected by [SimContextBuilder] before a context exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimStatus {
    NotStarted,
    Running,
    Completed,
}

/// Context for a single-profile simulation run.
///
/// The run is strictly sequential: each day's rebalance decision and valuation depend on the
/// previous day's result. Anything that cannot be resolved (unknown profile, bad frequency) has
/// already failed in the builder, so a context that exists always completes.
pub struct SimContext {
    profile: RiskProfile,
    prices: Arc<PriceSeries>,
    settings: BacktestSettings,
    schedule: FixedIntervalSchedule,
    status: SimStatus,
}

impl SimContext {
    pub fn status(&self) -> SimStatus {
        self.status
    }

    pub fn profile(&self) -> &RiskProfile {
        &self.profile
    }

    pub fn settings(&self) -> &BacktestSettings {
        &self.settings
    }

    /// Walks every trading date within the settings window. Calling this again re-runs from the
    /// initial capital and produces the same result.
    pub fn run(&mut self) -> BacktestResult {
        self.status = SimStatus::Running;
        let start_date = self.settings.start_date;
        let end_date = self.settings.end_date;
        info!(
            "SIM: Starting {} from {} to {} with {:.2}",
            self.profile.name(),
            start_date,
            end_date,
            *self.settings.initial_capital
        );

        let ctx = StepContext {
            allocation: self.profile.allocation(),
            schedule: &self.schedule,
            transaction_cost: self.settings.transaction_cost,
        };

        let mut state = SimState::new(self.settings.initial_capital);
        let mut portfolio_values: Vec<PortfolioSnapshot> = Vec::new();
        for (date, day) in self.prices.range(start_date, end_date) {
            let (next, snapshot) = step(state, &ctx, *date, Some(day));
            state = next;
            portfolio_values.push(snapshot);
        }

        let final_value = portfolio_values
            .last()
            .map(|snap| snap.value)
            .unwrap_or(self.settings.initial_capital);
        let metrics = PerformanceCalculator::from_snapshots(
            &portfolio_values,
            *self.settings.initial_capital,
            start_date,
            end_date,
        );
        PortfolioCalculations::summarize_allocation(&PortfolioValuation::position_values(
            state.last_known(),
            state.holdings(),
        ));
        let data_quality = *state.data_quality();
        if !data_quality.is_clean() {
            warn!(
                "SIM: {} priced {} symbol-days by carrying forward and {} with the fallback price",
                self.profile.name(),
                data_quality.forward_filled,
                data_quality.fallback_priced
            );
        }

        let result = BacktestResult {
            risk_profile: self.profile.name().to_string(),
            start_date,
            end_date,
            initial_capital: self.settings.initial_capital,
            final_value,
            portfolio_values,
            rebalance_dates: state.into_rebalance_dates(),
            metrics,
            data_quality,
        };
        self.status = SimStatus::Completed;
        info!(
            "SIM: Finished {} over {} days with {} rebalances, final value {:.2}",
            result.risk_profile,
            result.portfolio_values.len(),
            result.rebalance_count(),
            *result.final_value
        );
        result
    }

    /// Looks up `name` and builds a context for it, failing before any simulation state exists
    /// when the profile is unknown.
    pub fn from_registry(
        registry: &ProfileRegistry,
        name: &str,
        prices: Arc<PriceSeries>,
        settings: BacktestSettings,
    ) -> Result<SimContext, BacktestError> {
        let mut builder = SimContextBuilder::new();
        builder
            .with_profile_from(registry, name)?
            .with_prices(prices)
            .with_settings(settings);
        builder.build()
    }
}

/// Runs each named profile over the same prices, one blocking task per profile.
///
/// Failures are isolated per profile: an unknown name or a panicking run produces an error entry
/// for that profile and the rest still complete.
pub async fn run_profiles(
    registry: &ProfileRegistry,
    names: &[String],
    prices: Arc<PriceSeries>,
    settings: BacktestSettings,
) -> BTreeMap<String, Result<BacktestResult, BacktestError>> {
    let mut results = BTreeMap::new();
    let mut handles = Vec::with_capacity(names.len());

    for name in names {
        match SimContext::from_registry(registry, name, Arc::clone(&prices), settings.clone()) {
            Ok(mut ctx) => {
                let handle = tokio::task::spawn_blocking(move || ctx.run());
                handles.push((name.clone(), handle));
            }
            Err(e) => {
                warn!("SIM: Skipping {}: {}", name, e);
                results.insert(name.clone(), Err(e));
            }
        }
    }

    for (name, handle) in handles {
        let outcome = handle.await.map_err(|e| {
            warn!("SIM: Backtest for {} did not complete: {}", name, e);
            BacktestError::Aborted {
                profile: name.clone(),
            }
        });
        results.insert(name, outcome);
    }
    results
}
