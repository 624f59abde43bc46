//! Named target allocations and the registry that serves them to backtests.

use std::collections::BTreeMap;

use itertools::Itertools;
use log::warn;

use crate::error::{AllocationError, BacktestError};
use crate::types::PortfolioAllocation;

const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// A named fixed-weight allocation. Read-only once registered.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskProfile {
    name: String,
    allocation: PortfolioAllocation,
}

impl RiskProfile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allocation(&self) -> &PortfolioAllocation {
        &self.allocation
    }

    pub fn symbols(&self) -> Vec<String> {
        self.allocation.keys().into_iter().sorted().collect()
    }

    /// Logs a warning when the allocation is not valid. Invalid allocations still produce a
    /// usable, if skewed, target so this never fails.
    pub fn warn_if_invalid(&self) {
        if let Err(e) = validate_allocation(&self.allocation) {
            warn!("PROFILE: {} has an invalid allocation: {}", self.name, e);
        }
    }

    pub fn new(name: impl Into<String>, allocation: PortfolioAllocation) -> Self {
        Self {
            name: name.into(),
            allocation,
        }
    }
}

/// Checks that weights are non-negative and sum to 1 within ±0.01.
pub fn validate_allocation(allocation: &PortfolioAllocation) -> Result<(), AllocationError> {
    if allocation.is_empty() {
        return Err(AllocationError::Empty);
    }

    for (symbol, weight) in allocation.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
        if **weight < 0.0 {
            return Err(AllocationError::NegativeWeight {
                symbol: symbol.clone(),
                weight: **weight,
            });
        }
    }

    let total = allocation.total_weight();
    if !((1.0 - WEIGHT_SUM_TOLERANCE)..=(1.0 + WEIGHT_SUM_TOLERANCE)).contains(&total) {
        return Err(AllocationError::WeightSum { total });
    }
    Ok(())
}

/// Lookup from profile name to [RiskProfile].
///
/// The registry is plain data handed to each backtest, concurrent backtests each read their own
/// profile and nothing is shared mutably.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, RiskProfile>,
}

impl ProfileRegistry {
    pub fn get(&self, name: &str) -> Result<&RiskProfile, BacktestError> {
        self.profiles
            .get(name)
            .ok_or_else(|| BacktestError::UnknownProfile {
                name: name.to_string(),
            })
    }

    pub fn insert(&mut self, name: impl Into<String>, allocation: PortfolioAllocation) {
        let name = name.into();
        self.profiles
            .insert(name.clone(), RiskProfile::new(name, allocation));
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Union of symbols over every profile, sorted.
    pub fn symbols(&self) -> Vec<String> {
        self.profiles
            .values()
            .flat_map(|profile| profile.symbols())
            .sorted()
            .dedup()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RiskProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn new() -> Self {
        Self {
            profiles: BTreeMap::new(),
        }
    }
}

impl Default for ProfileRegistry {
    /// ETF allocations ranging from mostly bonds to mostly growth equity.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.insert(
            "very_conservative",
            vec![
                ("VTI", 0.15),
                ("VOO", 0.10),
                ("VXUS", 0.10),
                ("VTWO", 0.05),
                ("BND", 0.60),
            ]
            .into_iter()
            .collect(),
        );
        registry.insert(
            "conservative",
            vec![
                ("VTI", 0.20),
                ("VOO", 0.15),
                ("VXUS", 0.15),
                ("VTWO", 0.10),
                ("BND", 0.40),
            ]
            .into_iter()
            .collect(),
        );
        registry.insert(
            "moderate",
            vec![
                ("VTI", 0.20),
                ("VOO", 0.25),
                ("VXUS", 0.15),
                ("VTWO", 0.10),
                ("BND", 0.30),
            ]
            .into_iter()
            .collect(),
        );
        registry.insert(
            "aggressive",
            vec![
                ("VUG", 0.25),
                ("VOO", 0.40),
                ("VXUS", 0.15),
                ("VTWO", 0.10),
                ("BND", 0.10),
            ]
            .into_iter()
            .collect(),
        );
        registry.insert(
            "aggressive_growth",
            vec![
                ("VUG", 0.45),
                ("VOO", 0.30),
                ("VXUS", 0.10),
                ("VTWO", 0.10),
                ("BND", 0.05),
            ]
            .into_iter()
            .collect(),
        );
        registry
    }
}

impl FromIterator<(String, PortfolioAllocation)> for ProfileRegistry {
    fn from_iter<I: IntoIterator<Item = (String, PortfolioAllocation)>>(iter: I) -> Self {
        let mut registry = Self::new();
        for (name, allocation) in iter {
            registry.insert(name, allocation);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_allocation, ProfileRegistry};
    use crate::error::{AllocationError, BacktestError};
    use crate::types::PortfolioAllocation;

    #[test]
    fn test_that_default_profiles_are_valid() {
        let registry = ProfileRegistry::default();
        assert_eq!(registry.len(), 5);
        for profile in registry.iter() {
            assert!(
                validate_allocation(profile.allocation()).is_ok(),
                "{} should be valid",
                profile.name()
            );
        }
    }

    #[test]
    fn test_that_validation_accepts_sums_within_tolerance() {
        let alloc: PortfolioAllocation = vec![("ABC", 0.5), ("BCD", 0.495)].into_iter().collect();
        assert!(validate_allocation(&alloc).is_ok());

        let alloc: PortfolioAllocation = vec![("ABC", 0.5), ("BCD", 0.505)].into_iter().collect();
        assert!(validate_allocation(&alloc).is_ok());
    }

    #[test]
    fn test_that_validation_rejects_bad_allocations() {
        let empty = PortfolioAllocation::new();
        assert_eq!(validate_allocation(&empty), Err(AllocationError::Empty));

        let negative: PortfolioAllocation =
            vec![("ABC", 1.2), ("BCD", -0.2)].into_iter().collect();
        assert!(matches!(
            validate_allocation(&negative),
            Err(AllocationError::NegativeWeight { .. })
        ));

        let over: PortfolioAllocation = vec![("ABC", 0.6), ("BCD", 0.5)].into_iter().collect();
        let err = validate_allocation(&over).unwrap_err();
        assert_eq!(err.to_string(), "allocation sums to 110.0%, expected 100%");

        let under: PortfolioAllocation = vec![("ABC", 0.5), ("BCD", 0.48)].into_iter().collect();
        assert!(matches!(
            validate_allocation(&under),
            Err(AllocationError::WeightSum { .. })
        ));
    }

    #[test]
    fn test_that_unknown_profile_is_invalid_argument() {
        let registry = ProfileRegistry::default();
        let err = registry.get("reckless").unwrap_err();
        assert_eq!(
            err,
            BacktestError::UnknownProfile {
                name: "reckless".to_string()
            }
        );
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_that_registry_symbols_are_the_sorted_union() {
        let registry = ProfileRegistry::default();
        assert_eq!(
            registry.symbols(),
            vec!["BND", "VOO", "VTI", "VTWO", "VUG", "VXUS"]
        );
    }
}
