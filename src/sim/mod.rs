//! Single-day transition of a fixed-weight backtest.
//!
//! A run is a fold of [step] over the trading dates: each call takes the state left by the
//! previous day, the prices for today, and returns the new state together with the snapshot to
//! append to the equity curve. Holdings only change inside [step] and only on rebalance days, so
//! every transition can be tested in isolation.

use std::ops::AddAssign;

use log::{debug, info};
use serde::Serialize;
use time::Date;

use crate::portfolio::{PortfolioCalculations, PortfolioValuation, Rebalancer};
use crate::schedule::RebalanceSchedule;
use crate::types::{CashValue, Holdings, PortfolioAllocation, PortfolioSnapshot, PriceSnapshot};

/// Price used for a symbol that has never been quoted in the run. This is a placeholder so the
/// run can continue, not an estimate of the true price.
pub const FALLBACK_PRICE: f64 = 100.0;

/// Counts of prices that did not come from the day's data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DataQuality {
    /// Symbol/date pairs priced with the last known price.
    pub forward_filled: usize,
    /// Symbol/date pairs priced with [FALLBACK_PRICE].
    pub fallback_priced: usize,
}

impl DataQuality {
    pub fn is_clean(&self) -> bool {
        self.forward_filled == 0 && self.fallback_priced == 0
    }
}

impl AddAssign for DataQuality {
    fn add_assign(&mut self, rhs: Self) {
        self.forward_filled += rhs.forward_filled;
        self.fallback_priced += rhs.fallback_priced;
    }
}

/// Everything a run carries from one day to the next.
#[derive(Clone, Debug, PartialEq)]
pub struct SimState {
    holdings: Holdings,
    last_known: PriceSnapshot,
    value: CashValue,
    rebalance_dates: Vec<Date>,
    data_quality: DataQuality,
}

impl SimState {
    pub fn holdings(&self) -> &Holdings {
        &self.holdings
    }

    /// Value at the close of the last processed day, or the initial capital before the first.
    pub fn value(&self) -> &CashValue {
        &self.value
    }

    /// Most recent observed close for each symbol. Fallback prices are never stored here.
    pub fn last_known(&self) -> &PriceSnapshot {
        &self.last_known
    }

    pub fn rebalance_dates(&self) -> &[Date] {
        &self.rebalance_dates
    }

    pub fn data_quality(&self) -> &DataQuality {
        &self.data_quality
    }

    pub fn into_rebalance_dates(self) -> Vec<Date> {
        self.rebalance_dates
    }

    pub fn new(initial_capital: CashValue) -> Self {
        Self {
            holdings: Holdings::new(),
            last_known: PriceSnapshot::new(),
            value: initial_capital,
            rebalance_dates: Vec::new(),
            data_quality: DataQuality::default(),
        }
    }
}

/// Read-only inputs shared by every step of a run.
pub struct StepContext<'a, S: RebalanceSchedule> {
    pub allocation: &'a PortfolioAllocation,
    pub schedule: &'a S,
    pub transaction_cost: CashValue,
}

/// Prices for every symbol in the allocation on one day.
///
/// Today's price is used when present, then the last known price, then [FALLBACK_PRICE].
pub fn resolve_prices(
    allocation: &PortfolioAllocation,
    day: Option<&PriceSnapshot>,
    last_known: &PriceSnapshot,
) -> (PriceSnapshot, DataQuality) {
    let mut prices = PriceSnapshot::new();
    let mut quality = DataQuality::default();
    for symbol in allocation.keys() {
        if let Some(price) = day.and_then(|snapshot| snapshot.get(&symbol)) {
            prices.insert(&symbol, *price);
        } else if let Some(price) = last_known.get(&symbol) {
            debug!("SIM: No price for {}, carrying forward {:?}", symbol, **price);
            quality.forward_filled += 1;
            prices.insert(&symbol, *price);
        } else {
            debug!("SIM: No price history for {}, using fallback", symbol);
            quality.fallback_priced += 1;
            prices.insert(&symbol, FALLBACK_PRICE);
        }
    }
    (prices, quality)
}

/// Rebalance on scheduled dates, and on any date where nothing is held yet.
pub fn should_rebalance<S: RebalanceSchedule>(
    date: &Date,
    holdings: &Holdings,
    schedule: &S,
) -> bool {
    holdings.is_empty() || schedule.should_rebalance(date)
}

pub fn step<S: RebalanceSchedule>(
    state: SimState,
    ctx: &StepContext<'_, S>,
    date: Date,
    day: Option<&PriceSnapshot>,
) -> (SimState, PortfolioSnapshot) {
    let (prices, quality) = resolve_prices(ctx.allocation, day, &state.last_known);

    let SimState {
        mut holdings,
        mut last_known,
        value,
        mut rebalance_dates,
        mut data_quality,
    } = state;
    data_quality += quality;

    if let Some(day) = day {
        for symbol in ctx.allocation.keys() {
            if let Some(price) = day.get(&symbol) {
                last_known.insert(&symbol, *price);
            }
        }
    }

    if should_rebalance(&date, &holdings, ctx.schedule) {
        if !holdings.is_empty() {
            let positions = PortfolioValuation::position_values(&prices, &holdings);
            let drift = PortfolioCalculations::allocation_drift(&positions, ctx.allocation);
            debug!(
                "SIM: Drift on {} is {:.4}, largest {:.4}",
                date, drift.drift, drift.max_drift
            );
        }
        //Sized with yesterday's close (initial capital on the first day), marked with today's
        //prices below
        holdings = Rebalancer::rebalance_with_cost(
            &value,
            &prices,
            ctx.allocation,
            &ctx.transaction_cost,
        );
        rebalance_dates.push(date);
        info!("SIM: Rebalanced on {} with value {:.2}", date, *value);
    }

    let value = PortfolioValuation::value(&prices, &holdings);
    let snapshot = PortfolioSnapshot {
        date,
        value,
        holdings: holdings.clone(),
    };

    let next = SimState {
        holdings,
        last_known,
        value,
        rebalance_dates,
        data_quality,
    };
    (next, snapshot)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use time::macros::date;
    use time::Date;

    use super::{resolve_prices, should_rebalance, step, SimState, StepContext, FALLBACK_PRICE};
    use crate::schedule::RebalanceSchedule;
    use crate::types::{CashValue, Holdings, PortfolioAllocation, Price, PriceSnapshot, ShareQty};

    struct OnDates(BTreeSet<Date>);

    impl RebalanceSchedule for OnDates {
        fn should_rebalance(&self, date: &Date) -> bool {
            self.0.contains(date)
        }
    }

    fn never() -> OnDates {
        OnDates(BTreeSet::new())
    }

    fn allocation() -> PortfolioAllocation {
        vec![("ABC", 0.5), ("BCD", 0.5)].into_iter().collect()
    }

    #[test]
    fn test_that_prices_prefer_today_then_last_known_then_fallback() {
        let today: PriceSnapshot = vec![("ABC", 10.0)].into_iter().collect();
        let last_known: PriceSnapshot = vec![("ABC", 9.0), ("BCD", 20.0)].into_iter().collect();
        let alloc: PortfolioAllocation =
            vec![("ABC", 0.4), ("BCD", 0.4), ("CDE", 0.2)].into_iter().collect();

        let (prices, quality) = resolve_prices(&alloc, Some(&today), &last_known);
        assert_eq!(prices.get("ABC"), Some(&Price::from(10.0)));
        assert_eq!(prices.get("BCD"), Some(&Price::from(20.0)));
        assert_eq!(prices.get("CDE"), Some(&Price::from(FALLBACK_PRICE)));
        assert_eq!(quality.forward_filled, 1);
        assert_eq!(quality.fallback_priced, 1);
    }

    #[test]
    fn test_that_missing_day_forward_fills_everything_known() {
        let last_known: PriceSnapshot = vec![("ABC", 9.0), ("BCD", 20.0)].into_iter().collect();
        let (prices, quality) = resolve_prices(&allocation(), None, &last_known);
        assert_eq!(prices, last_known);
        assert_eq!(quality.forward_filled, 2);
        assert!(!quality.is_clean());
    }

    #[test]
    fn test_that_empty_holdings_always_trigger_rebalance() {
        let day = date!(2023 - 01 - 05);
        assert!(should_rebalance(&day, &Holdings::new(), &never()));

        let held: Holdings = vec![("ABC", 1)].into_iter().collect();
        assert!(!should_rebalance(&day, &held, &never()));
        assert!(should_rebalance(
            &day,
            &held,
            &OnDates(vec![day].into_iter().collect())
        ));
    }

    #[test]
    fn test_that_first_step_allocates_initial_capital() {
        let alloc = allocation();
        let schedule = never();
        let ctx = StepContext {
            allocation: &alloc,
            schedule: &schedule,
            transaction_cost: 0.0.into(),
        };
        let day = date!(2023 - 01 - 03);
        let prices: PriceSnapshot = vec![("ABC", 100.0), ("BCD", 30.0)].into_iter().collect();

        let (state, snap) = step(SimState::new(10_000.0.into()), &ctx, day, Some(&prices));

        assert_eq!(state.holdings().get("ABC"), Some(&ShareQty::from(50)));
        assert_eq!(state.holdings().get("BCD"), Some(&ShareQty::from(166)));
        assert_eq!(state.rebalance_dates(), &[day]);
        assert_eq!(snap.value, CashValue::from(9_980.0));
        assert_eq!(state.value(), &snap.value);
        assert_eq!(snap.holdings, *state.holdings());
    }

    #[test]
    fn test_that_holdings_are_kept_between_rebalances() {
        let alloc = allocation();
        let schedule = never();
        let ctx = StepContext {
            allocation: &alloc,
            schedule: &schedule,
            transaction_cost: 0.0.into(),
        };
        let day1: PriceSnapshot = vec![("ABC", 100.0), ("BCD", 50.0)].into_iter().collect();
        let day2: PriceSnapshot = vec![("ABC", 110.0), ("BCD", 40.0)].into_iter().collect();

        let (state, _) = step(
            SimState::new(10_000.0.into()),
            &ctx,
            date!(2023 - 01 - 03),
            Some(&day1),
        );
        let held = state.holdings().clone();
        let (state, snap) = step(state, &ctx, date!(2023 - 01 - 04), Some(&day2));

        assert_eq!(state.holdings(), &held);
        assert_eq!(state.rebalance_dates().len(), 1);
        assert_eq!(snap.value, CashValue::from(50.0 * 110.0 + 100.0 * 40.0));
    }

    #[test]
    fn test_that_scheduled_rebalance_uses_previous_value() {
        let alloc = allocation();
        let rebalance_day = date!(2023 - 01 - 04);
        let schedule = OnDates(vec![rebalance_day].into_iter().collect());
        let ctx = StepContext {
            allocation: &alloc,
            schedule: &schedule,
            transaction_cost: 0.0.into(),
        };
        let day1: PriceSnapshot = vec![("ABC", 100.0), ("BCD", 50.0)].into_iter().collect();
        let day2: PriceSnapshot = vec![("ABC", 200.0), ("BCD", 50.0)].into_iter().collect();

        let (state, _) = step(
            SimState::new(10_000.0.into()),
            &ctx,
            date!(2023 - 01 - 03),
            Some(&day1),
        );
        //Previous close is 10_000, so the ABC target is 5_000 at a price of 200
        let (state, snap) = step(state, &ctx, rebalance_day, Some(&day2));

        assert_eq!(state.holdings().get("ABC"), Some(&ShareQty::from(25)));
        assert_eq!(state.holdings().get("BCD"), Some(&ShareQty::from(100)));
        assert_eq!(state.rebalance_dates().len(), 2);
        assert_eq!(snap.value, CashValue::from(10_000.0));
    }

    #[test]
    fn test_that_missing_day_is_valued_with_last_known_prices() {
        let alloc = allocation();
        let schedule = never();
        let ctx = StepContext {
            allocation: &alloc,
            schedule: &schedule,
            transaction_cost: 0.0.into(),
        };
        let day1: PriceSnapshot = vec![("ABC", 100.0), ("BCD", 50.0)].into_iter().collect();
        let (state, first) = step(
            SimState::new(10_000.0.into()),
            &ctx,
            date!(2023 - 01 - 03),
            Some(&day1),
        );
        let (state, second) = step(state, &ctx, date!(2023 - 01 - 04), None);

        assert_eq!(first.value, second.value);
        assert_eq!(state.data_quality().forward_filled, 2);
        assert_eq!(state.data_quality().fallback_priced, 0);
    }
}
