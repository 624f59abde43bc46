//! Historical prices consumed by the simulation.
//!
//! Price retrieval happens entirely before a backtest starts: a [PriceSource] hands over a full
//! [PriceSeries] and the simulation never goes back to the source. Gaps in the series are left as
//! gaps, the simulation decides how to fill them.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;
use rand::thread_rng;
use rand_distr::{Distribution, Uniform};
use serde::Deserialize;
use time::{Date, Duration, Weekday};

use crate::types::{parse_date, Price, PriceSnapshot};

/// Closing prices by date, ascending. Dates with no rows for a symbol simply lack that symbol.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceSeries {
    inner: BTreeMap<Date, PriceSnapshot>,
}

impl PriceSeries {
    pub fn get(&self, date: &Date) -> Option<&PriceSnapshot> {
        self.inner.get(date)
    }

    pub fn get_price(&self, date: &Date, symbol: &str) -> Option<&Price> {
        self.inner.get(date)?.get(symbol)
    }

    pub fn dates(&self) -> impl Iterator<Item = &Date> {
        self.inner.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Date, &PriceSnapshot)> {
        self.inner.iter()
    }

    /// Dates within `[start, end]`, ascending, with the snapshot for each.
    pub fn range(&self, start: Date, end: Date) -> impl Iterator<Item = (&Date, &PriceSnapshot)> {
        //BTreeMap::range panics when start > end
        let (lower, upper) = if start <= end { (start, end) } else { (end, start) };
        self.inner
            .range(lower..=upper)
            .filter(move |(date, _)| start <= **date && **date <= end)
    }

    pub fn first_date(&self) -> Option<&Date> {
        self.inner.keys().next()
    }

    pub fn last_date(&self) -> Option<&Date> {
        self.inner.keys().next_back()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Copy restricted to the given symbols and dates. Dates left without any price are dropped.
    pub fn subset(&self, symbols: &[String], start: Date, end: Date) -> PriceSeries {
        let mut builder = PriceSeriesBuilder::new();
        for (date, snapshot) in self.range(start, end) {
            for symbol in symbols {
                if let Some(price) = snapshot.get(symbol) {
                    builder.add_price(*date, symbol, *price);
                }
            }
        }
        builder.build()
    }

    /// Reads long-format `date,symbol,close` rows with ISO dates. Non-finite closes (`NaN`, `inf`)
    /// are rejected.
    pub fn from_csv_reader<R: io::Read>(reader: R) -> Result<PriceSeries> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut builder = PriceSeriesBuilder::new();
        for (pos, result) in rdr.deserialize::<PriceRow>().enumerate() {
            let row = result.with_context(|| format!("malformed price row {}", pos + 1))?;
            let date = parse_date(row.date.trim())
                .with_context(|| format!("bad date {:?} on price row {}", row.date, pos + 1))?;
            if !row.close.is_finite() {
                bail!(
                    "close for {} on {} is not a finite number on price row {}",
                    row.symbol.trim(),
                    row.date.trim(),
                    pos + 1
                );
            }
            builder.add_price(date, row.symbol.trim(), row.close);
        }
        Ok(builder.build())
    }

    /// Random walk of daily closes on weekdays, used to generate test data.
    pub fn random(start: Date, trading_days: usize, symbols: &[&str]) -> Self {
        let start_price_dist = Uniform::new(50.0, 150.0);
        let return_dist = Uniform::new(-0.02, 0.02);
        let mut rng = thread_rng();

        let mut last: Vec<f64> = symbols
            .iter()
            .map(|_| start_price_dist.sample(&mut rng))
            .collect();

        let mut builder = PriceSeriesBuilder::new();
        let mut date = start;
        let mut generated = 0;
        while generated < trading_days {
            if !matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday) {
                for (pos, symbol) in symbols.iter().enumerate() {
                    last[pos] *= 1.0 + return_dist.sample(&mut rng);
                    builder.add_price(date, symbol, last[pos]);
                }
                generated += 1;
            }
            match date.checked_add(Duration::days(1)) {
                Some(next) => date = next,
                None => break,
            }
        }
        builder.build()
    }
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: String,
    symbol: String,
    close: f64,
}

pub struct PriceSeriesBuilder {
    inner: BTreeMap<Date, PriceSnapshot>,
}

impl PriceSeriesBuilder {
    pub fn add_price(&mut self, date: Date, symbol: impl AsRef<str>, close: impl Into<Price>) {
        self.inner.entry(date).or_default().insert(symbol, close);
    }

    /// Adds a date with no prices at all, a trading day where every symbol is missing.
    pub fn add_empty_date(&mut self, date: Date) {
        self.inner.entry(date).or_default();
    }

    pub fn build(self) -> PriceSeries {
        PriceSeries { inner: self.inner }
    }

    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }
}

impl Default for PriceSeriesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Supplies daily closing prices for a set of symbols over a date range.
pub trait PriceSource {
    fn fetch(&self, symbols: &[String], start: Date, end: Date) -> Result<PriceSeries>;
}

impl PriceSource for PriceSeries {
    fn fetch(&self, symbols: &[String], start: Date, end: Date) -> Result<PriceSeries> {
        Ok(self.subset(symbols, start, end))
    }
}

/// Reads prices from a CSV file with a `date,symbol,close` header.
#[derive(Clone, Debug)]
pub struct CsvPriceSource {
    path: PathBuf,
}

impl CsvPriceSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PriceSource for CsvPriceSource {
    fn fetch(&self, symbols: &[String], start: Date, end: Date) -> Result<PriceSeries> {
        info!(
            "INPUT: Loading prices for {:?} from {}",
            symbols,
            self.path.display()
        );
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("could not open price file {}", self.path.display()))?;
        let all = PriceSeries::from_csv_reader(file)
            .with_context(|| format!("could not read price file {}", self.path.display()))?;
        let series = all.subset(symbols, start, end);
        info!("INPUT: Loaded {} trading days", series.len());
        Ok(series)
    }
}
