use derive_more::{Display, Error};

/// Failures surfaced to callers of the simulation.
///
/// `UnknownProfile` and `UnsupportedFrequency` are invalid-argument errors: they are returned
/// before any simulation state is created and retrying with the same input cannot succeed.
/// Missing prices and degenerate valuations are not errors; they are absorbed inside the run with
/// fixed fallback values.
#[derive(Clone, Debug, Display, Error, PartialEq, Eq)]
pub enum BacktestError {
    #[display("invalid risk profile: {name}")]
    UnknownProfile { name: String },
    #[display("invalid rebalance frequency: {value}")]
    UnsupportedFrequency { value: String },
    #[display("backtest is missing {field}")]
    MissingInput { field: String },
    #[display("backtest for {profile} aborted before completion")]
    Aborted { profile: String },
}

impl BacktestError {
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            BacktestError::UnknownProfile { .. }
                | BacktestError::UnsupportedFrequency { .. }
                | BacktestError::MissingInput { .. }
        )
    }
}

/// Reasons an allocation fails validation. Returned by
/// [validate_allocation](crate::profile::validate_allocation).
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum AllocationError {
    #[display("allocation is empty")]
    Empty,
    #[display("negative allocation for {symbol}: {weight}")]
    NegativeWeight { symbol: String, weight: f64 },
    #[display("allocation sums to {:.1}%, expected 100%", total * 100.0)]
    WeightSum { total: f64 },
}
