use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::types::{CashValue, PortfolioAllocation, PortfolioValues};

/// How far a set of positions has moved away from its target allocation, in weight terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct AllocationDrift {
    pub total_value: CashValue,
    /// Sum over target symbols of |current weight - target weight|.
    pub drift: f64,
    pub max_drift: f64,
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

///Calculations shared by anything that moves a portfolio toward a target allocation. None of
///these functions touch holdings directly, callers decide what to do with the output.
pub struct PortfolioCalculations;

impl PortfolioCalculations {
    //Calculates the dollar diff between the current state of the portfolio and the target
    //weights. Positive is a buy, negative is a sell. Values are rounded to cents.
    //
    //Only symbols in the target are returned, a held symbol missing from the target gets no diff.
    pub fn calculate_diffs(
        current_alloc: &PortfolioValues,
        target_alloc: &PortfolioAllocation,
        total_value: &CashValue,
    ) -> PortfolioValues {
        let mut diffs = PortfolioValues::new();
        for (symbol, weight) in target_alloc.iter() {
            if (**total_value).eq(&0.0) {
                diffs.insert(symbol, 0.0);
                continue;
            }
            let curr_val = current_alloc.get(symbol).copied().unwrap_or_default();
            let target_val = **total_value * **weight;
            diffs.insert(symbol, round_to_cents(target_val - *curr_val));
        }
        diffs
    }

    pub fn allocation_drift(
        positions: &PortfolioValues,
        target_alloc: &PortfolioAllocation,
    ) -> AllocationDrift {
        let total_value = positions.total();
        if (*total_value).eq(&0.0) {
            return AllocationDrift::default();
        }

        let drifts = target_alloc
            .iter()
            .map(|(symbol, weight)| {
                let curr_val = positions.get(symbol).copied().unwrap_or_default();
                (*curr_val / *total_value - **weight).abs()
            })
            .collect_vec();

        AllocationDrift {
            total_value,
            drift: drifts.iter().sum(),
            max_drift: drifts.iter().copied().fold(0.0, f64::max),
        }
    }

    /// Logs each position largest first with its share of the total.
    pub fn summarize_allocation(positions: &PortfolioValues) {
        let total = *positions.total();
        info!("PORTFOLIO: Allocation");
        for (symbol, value) in positions
            .iter()
            .sorted_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            let pct = if total > 0.0 {
                **value / total * 100.0
            } else {
                0.0
            };
            info!("PORTFOLIO:   {}: {:.2} ({:.1}%)", symbol, **value, pct);
        }
        info!("PORTFOLIO:   TOTAL: {:.2}", total);
    }
}

#[cfg(test)]
mod tests {
    use super::PortfolioCalculations;
    use crate::types::{CashValue, PortfolioAllocation, PortfolioValues};

    fn even_split() -> PortfolioAllocation {
        vec![("A", 0.5), ("B", 0.5)].into_iter().collect()
    }

    #[test]
    fn test_that_diffs_from_empty_portfolio_buy_full_target() {
        let diffs = PortfolioCalculations::calculate_diffs(
            &PortfolioValues::new(),
            &even_split(),
            &1000.0.into(),
        );
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs.get("A"), Some(&CashValue::from(500.0)));
        assert_eq!(diffs.get("B"), Some(&CashValue::from(500.0)));
    }

    #[test]
    fn test_that_diffs_sell_overweight_and_buy_underweight() {
        let current: PortfolioValues = vec![("A", 600.0), ("B", 400.0)].into_iter().collect();
        let diffs =
            PortfolioCalculations::calculate_diffs(&current, &even_split(), &1000.0.into());
        assert_eq!(diffs.get("A"), Some(&CashValue::from(-100.0)));
        assert_eq!(diffs.get("B"), Some(&CashValue::from(100.0)));
    }

    #[test]
    fn test_that_diffs_are_zero_with_zero_total_value() {
        let current: PortfolioValues = vec![("A", 600.0)].into_iter().collect();
        let diffs =
            PortfolioCalculations::calculate_diffs(&current, &even_split(), &0.0.into());
        assert_eq!(diffs.get("A"), Some(&CashValue::from(0.0)));
        assert_eq!(diffs.get("B"), Some(&CashValue::from(0.0)));
    }

    #[test]
    fn test_that_diffs_ignore_symbols_outside_target() {
        let current: PortfolioValues =
            vec![("A", 500.0), ("B", 400.0), ("C", 100.0)].into_iter().collect();
        let diffs =
            PortfolioCalculations::calculate_diffs(&current, &even_split(), &1000.0.into());
        assert_eq!(diffs.len(), 2);
        assert!(diffs.get("C").is_none());
        assert_eq!(diffs.get("B"), Some(&CashValue::from(100.0)));
    }

    #[test]
    fn test_that_diffs_round_to_cents() {
        let target: PortfolioAllocation = vec![("A", 1.0 / 3.0)].into_iter().collect();
        let diffs = PortfolioCalculations::calculate_diffs(
            &PortfolioValues::new(),
            &target,
            &1000.0.into(),
        );
        assert_eq!(diffs.get("A"), Some(&CashValue::from(333.33)));
    }

    #[test]
    fn test_that_drift_measures_distance_from_target() {
        let current: PortfolioValues = vec![("A", 700.0), ("B", 300.0)].into_iter().collect();
        let drift = PortfolioCalculations::allocation_drift(&current, &even_split());
        assert_eq!(drift.total_value, CashValue::from(1000.0));
        assert!((drift.drift - 0.4).abs() < 1e-12);
        assert!((drift.max_drift - 0.2).abs() < 1e-12);

        let empty = PortfolioCalculations::allocation_drift(&PortfolioValues::new(), &even_split());
        assert_eq!(empty.drift, 0.0);
        assert_eq!(empty.max_drift, 0.0);
    }
}
