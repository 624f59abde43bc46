//! Marking holdings to market and sizing holdings toward a target allocation.

mod calculations;

pub use calculations::{AllocationDrift, PortfolioCalculations};

use log::debug;

use crate::types::{CashValue, Holdings, PortfolioAllocation, PortfolioValues, PriceSnapshot};

pub struct PortfolioValuation;

impl PortfolioValuation {
    /// Sum of shares x price over the symbols held. A held symbol with no price in the snapshot
    /// contributes nothing, this signals stale data rather than aborting the simulation.
    pub fn value(prices: &PriceSnapshot, holdings: &Holdings) -> CashValue {
        Self::position_values(prices, holdings).total()
    }

    pub fn position_values(prices: &PriceSnapshot, holdings: &Holdings) -> PortfolioValues {
        let mut values = PortfolioValues::new();
        for (symbol, qty) in holdings.iter() {
            match prices.get(symbol) {
                Some(price) => values.insert(symbol, **qty as f64 * **price),
                None => {
                    debug!("PORTFOLIO: No price for held {}, valuing at zero", symbol);
                    values.insert(symbol, 0.0);
                }
            }
        }
        values
    }
}

/// Converts a value and a target allocation into whole-share holdings.
pub struct Rebalancer;

impl Rebalancer {
    /// Each symbol gets `floor(value * weight / price)` shares. A symbol without a positive price
    /// gets zero shares.
    ///
    /// Remainders from flooring are not carried as cash, so the holdings are worth slightly less
    /// than `current_value` at these prices: at most one share price per symbol.
    pub fn rebalance(
        current_value: &CashValue,
        current_prices: &PriceSnapshot,
        target_allocation: &PortfolioAllocation,
    ) -> Holdings {
        let mut holdings = Holdings::new();
        for (symbol, weight) in target_allocation.iter() {
            let target_value = **current_value * **weight;
            let shares = match current_prices.get(symbol) {
                Some(price) if price.is_tradable() => (target_value / **price).floor() as i64,
                _ => {
                    debug!("PORTFOLIO: Cannot buy {} without a valid price", symbol);
                    0
                }
            };
            holdings.insert(symbol, shares);
        }
        holdings
    }

    /// As [Rebalancer::rebalance] with a fixed cost taken out of the value before sizing.
    pub fn rebalance_with_cost(
        current_value: &CashValue,
        current_prices: &PriceSnapshot,
        target_allocation: &PortfolioAllocation,
        transaction_cost: &CashValue,
    ) -> Holdings {
        let investable = CashValue::from((**current_value - **transaction_cost).max(0.0));
        Self::rebalance(&investable, current_prices, target_allocation)
    }
}
