//! # How does Libra work?
//!
//! Libra backtests fixed-weight portfolios: a set of named risk profiles, each a target
//! allocation over a handful of symbols, is held through historical daily closes and brought back
//! to its target weights on a fixed calendar schedule. The output for each profile is an equity
//! curve, the dates it rebalanced, and a small set of summary statistics.
//!
//! A backtest is composed of three parts: prices, a schedule, and the simulation itself. Prices are
//! loaded once, up front, through a [PriceSource](input::PriceSource) into a
//! [PriceSeries](input::PriceSeries). The schedule is a set of dates spaced 30, 91 or 365 days
//! apart from the start date. The simulation is a fold of [step](sim::step) over the trading
//! dates: on the first day, and on any scheduled day, holdings are resized to the target using the
//! previous day's value, then every day is marked to market with that day's closes.
//!
//! ## Execution
//!
//! Trades are assumed to fill at the close used to size them and only whole shares are bought, so
//! the cash left over by rounding down is not reinvested and is not part of the portfolio value.
//! Over many rebalances this drags the value below an idealised fractional-share portfolio. A
//! fixed cost per rebalance can be set with
//! [BacktestSettings::with_transaction_cost](simcontext::BacktestSettings::with_transaction_cost),
//! otherwise trading is free.
//!
//! Missing data never stops a run. A symbol without a close on a given day is valued at its last
//! known close, or at [FALLBACK_PRICE](sim::FALLBACK_PRICE) if it has never traded. Both cases are
//! counted in [DataQuality](sim::DataQuality) and logged at the end of the run so that results
//! built on bad data can be spotted.
//!
//! ## Example
//!
//! ```
//!     use std::sync::Arc;
//!
//!     use libra::input::PriceSeries;
//!     use libra::profile::ProfileRegistry;
//!     use libra::schedule::RebalanceFrequency;
//!     use libra::simcontext::{BacktestSettings, SimContext};
//!     use time::macros::date;
//!
//!     let start = date!(2021 - 01 - 04);
//!     let prices = PriceSeries::random(start, 500, &["VTI", "VOO", "VXUS", "VTWO", "BND"]);
//!     let settings = BacktestSettings::new(start, date!(2022 - 12 - 30))
//!         .with_initial_capital(100_000.0)
//!         .with_frequency(RebalanceFrequency::Quarterly);
//!
//!     let registry = ProfileRegistry::default();
//!     let mut sim = SimContext::from_registry(&registry, "moderate", Arc::new(prices), settings)
//!         .unwrap();
//!     let result = sim.run();
//!
//!     assert_eq!(result.rebalance_dates[0], start);
//! ```
//!
//! Several profiles can be run over the same prices with
//! [run_profiles](simcontext::run_profiles), which runs each profile on its own blocking tokio task
//! and isolates failures so that one unknown profile does not stop the others.
//!
//! # Missing features that you may expect
//!
//! * Fractional shares
//! * Dividends and corporate actions
//! * Risk-free rate in the Sharpe ratio
pub mod config;
pub mod error;
pub mod input;
pub mod perf;
pub mod portfolio;
pub mod profile;
pub mod report;
pub mod schedule;
pub mod sim;
pub mod simcontext;
pub mod types;
