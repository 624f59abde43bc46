use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use log::debug;
use time::{Date, Duration};

use crate::error::BacktestError;

/// Decides whether a given date triggers a rebalance.
pub trait RebalanceSchedule {
    fn should_rebalance(&self, date: &Date) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RebalanceFrequency {
    Monthly,
    Quarterly,
    Yearly,
}

impl RebalanceFrequency {
    /// Fixed calendar-day step between rebalances.
    pub fn interval_days(&self) -> i64 {
        match self {
            RebalanceFrequency::Monthly => 30,
            RebalanceFrequency::Quarterly => 91,
            RebalanceFrequency::Yearly => 365,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceFrequency::Monthly => "monthly",
            RebalanceFrequency::Quarterly => "quarterly",
            RebalanceFrequency::Yearly => "yearly",
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebalanceFrequency {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(RebalanceFrequency::Monthly),
            "quarterly" => Ok(RebalanceFrequency::Quarterly),
            "yearly" => Ok(RebalanceFrequency::Yearly),
            _ => Err(BacktestError::UnsupportedFrequency {
                value: s.to_string(),
            }),
        }
    }
}

/// Dates from `start` stepping by the frequency interval while not past `end`. The first date is
/// always `start` when `start <= end`.
pub fn rebalance_dates(start: Date, end: Date, frequency: RebalanceFrequency) -> Vec<Date> {
    let step = Duration::days(frequency.interval_days());
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        match current.checked_add(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    dates
}

/// As [rebalance_dates] taking the frequency as a tag, `monthly`, `quarterly` or `yearly`.
pub fn rebalance_dates_for(
    start: Date,
    end: Date,
    frequency: &str,
) -> Result<Vec<Date>, BacktestError> {
    let frequency = frequency.parse::<RebalanceFrequency>()?;
    Ok(rebalance_dates(start, end, frequency))
}

/// Rebalances on a precomputed set of dates spaced by a fixed interval.
#[derive(Clone, Debug)]
pub struct FixedIntervalSchedule {
    dates: BTreeSet<Date>,
}

impl FixedIntervalSchedule {
    pub fn dates(&self) -> impl Iterator<Item = &Date> {
        self.dates.iter()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn new(start: Date, end: Date, frequency: RebalanceFrequency) -> Self {
        let dates: BTreeSet<Date> = rebalance_dates(start, end, frequency).into_iter().collect();
        debug!(
            "SCHEDULE: {} rebalance dates between {} and {} ({})",
            dates.len(),
            start,
            end,
            frequency
        );
        Self { dates }
    }
}

impl RebalanceSchedule for FixedIntervalSchedule {
    fn should_rebalance(&self, date: &Date) -> bool {
        self.dates.contains(date)
    }
}
