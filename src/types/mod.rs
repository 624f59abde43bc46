//! Defines types that are used by multiple components.

use std::collections::HashMap;

use derive_more::{Deref, From, Into};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::Date;

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Deref, From, Into, Serialize, Deserialize)]
pub struct CashValue(f64);

impl std::ops::Add<CashValue> for CashValue {
    type Output = CashValue;

    fn add(self, rhs: CashValue) -> Self::Output {
        CashValue::from(*self + *rhs)
    }
}

impl std::iter::Sum for CashValue {
    fn sum<I: Iterator<Item = CashValue>>(iter: I) -> Self {
        iter.fold(CashValue::default(), |acc, val| acc + val)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Deref, From, Into, Serialize, Deserialize)]
pub struct Price(f64);

impl Price {
    /// Prices are only usable for division when strictly positive.
    pub fn is_tradable(&self) -> bool {
        self.0 > 0.0
    }
}

/// Whole number of shares held in a position. Fractional shares are never held.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Deref, From, Into, Serialize, Deserialize,
)]
pub struct ShareQty(i64);

///Size of a position in a portfolio in percentage terms, 0.5 is 50%.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Deref, From, Into, Serialize, Deserialize)]
pub struct PortfolioWeight(f64);

///Portfolio state in terms of percentage weight allocated to a stock represented by string name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation(HashMap<String, PortfolioWeight>);

impl PortfolioAllocation {
    pub fn get(&self, ticker: impl AsRef<str>) -> Option<&PortfolioWeight> {
        self.0.get(ticker.as_ref())
    }

    pub fn insert(&mut self, ticker: impl AsRef<str>, value: impl Into<PortfolioWeight>) {
        self.0.insert(ticker.as_ref().to_string(), value.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PortfolioWeight)> {
        self.0.iter()
    }

    pub fn total_weight(&self) -> f64 {
        self.0.values().map(|weight| **weight).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn new() -> Self {
        Self(HashMap::new())
    }
}

impl<S: AsRef<str>> FromIterator<(S, f64)> for PortfolioAllocation {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut allocation = Self::new();
        for (ticker, weight) in iter {
            allocation.insert(ticker, weight);
        }
        allocation
    }
}

///Portfolio state in terms of cash allocation to each position. Position is represented by string
///name/ticker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValues(HashMap<String, CashValue>);

impl PortfolioValues {
    pub fn get(&self, ticker: impl AsRef<str>) -> Option<&CashValue> {
        self.0.get(ticker.as_ref())
    }

    pub fn insert(&mut self, ticker: impl AsRef<str>, value: impl Into<CashValue>) {
        self.0.insert(ticker.as_ref().to_string(), value.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CashValue)> {
        self.0.iter()
    }

    pub fn total(&self) -> CashValue {
        self.0.values().copied().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn new() -> Self {
        Self(HashMap::new())
    }
}

impl<S: AsRef<str>> FromIterator<(S, f64)> for PortfolioValues {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (ticker, value) in iter {
            values.insert(ticker, value);
        }
        values
    }
}

/// Closing price for each symbol on a single date.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot(HashMap<String, Price>);

impl PriceSnapshot {
    pub fn get(&self, ticker: impl AsRef<str>) -> Option<&Price> {
        self.0.get(ticker.as_ref())
    }

    pub fn insert(&mut self, ticker: impl AsRef<str>, price: impl Into<Price>) {
        self.0.insert(ticker.as_ref().to_string(), price.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Price)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn new() -> Self {
        Self(HashMap::new())
    }
}

impl<S: AsRef<str>> FromIterator<(S, f64)> for PriceSnapshot {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (ticker, price) in iter {
            snapshot.insert(ticker, price);
        }
        snapshot
    }
}

///Portfolio state in terms of the qty held for each position. Postions are represented by the
///string name/ticker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Holdings(HashMap<String, ShareQty>);

impl Holdings {
    pub fn get(&self, ticker: impl AsRef<str>) -> Option<&ShareQty> {
        self.0.get(ticker.as_ref())
    }

    pub fn insert(&mut self, ticker: impl AsRef<str>, qty: impl Into<ShareQty>) {
        self.0.insert(ticker.as_ref().to_string(), qty.into());
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ShareQty)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn new() -> Self {
        Self(HashMap::new())
    }
}

impl<S: AsRef<str>> FromIterator<(S, i64)> for Holdings {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        let mut holdings = Self::new();
        for (ticker, qty) in iter {
            holdings.insert(ticker, qty);
        }
        holdings
    }
}

/// Point-in-time state of a backtest, recorded once per simulated day. The ordered sequence of
/// snapshots is the equity curve.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub value: CashValue,
    pub holdings: Holdings,
}

pub fn parse_date(value: &str) -> Result<Date, time::error::Parse> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
}

pub fn format_date(date: &Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Serde adapter that reads and writes [`Date`] as an ISO-8601 `YYYY-MM-DD` string.
pub mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(serde::de::Error::custom)
    }

    /// Same as the parent module for `Option<Date>`, used by config files where dates can be
    /// omitted.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::Date;

        pub fn serialize<S: Serializer>(
            date: &Option<Date>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => serializer.serialize_some(&super::super::format_date(date)),
                None => serializer.serialize_none(),
            }
        }

        #[derive(Deserialize)]
        struct IsoDate(#[serde(with = "super")] Date);

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Date>, D::Error> {
            let raw = Option::<IsoDate>::deserialize(deserializer)?;
            Ok(raw.map(|IsoDate(date)| date))
        }
    }
}
