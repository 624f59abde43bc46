use std::io::Write;
use std::sync::Arc;

use libra::error::BacktestError;
use libra::input::{CsvPriceSource, PriceSeries, PriceSeriesBuilder, PriceSource};
use libra::profile::ProfileRegistry;
use libra::report::{JsonReport, MarkdownReport};
use libra::schedule::RebalanceFrequency;
use libra::simcontext::{run_profiles, BacktestSettings, SimContext};
use libra::types::{CashValue, PortfolioAllocation};
use time::macros::date;
use time::{Date, Duration, Weekday};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn weekdays(start: Date, end: Date) -> Vec<Date> {
    let mut dates = Vec::new();
    let mut date = start;
    while date <= end {
        if !matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday) {
            dates.push(date);
        }
        date += Duration::days(1);
    }
    dates
}

//Single symbol rising linearly from 100 to 120 over 2023
fn rising_series() -> PriceSeries {
    let dates = weekdays(date!(2023 - 01 - 02), date!(2023 - 12 - 29));
    let steps = (dates.len() - 1) as f64;
    let mut builder = PriceSeriesBuilder::new();
    for (pos, date) in dates.iter().enumerate() {
        builder.add_price(*date, "XYZ", 100.0 + 20.0 * pos as f64 / steps);
    }
    builder.build()
}

fn single_symbol_registry() -> ProfileRegistry {
    vec![(
        "all_in".to_string(),
        vec![("XYZ", 1.0)].into_iter().collect::<PortfolioAllocation>(),
    )]
    .into_iter()
    .collect()
}

#[test]
fn rising_single_symbol_backtest() {
    init_logger();
    let start = date!(2023 - 01 - 02);
    let settings = BacktestSettings::new(start, date!(2023 - 12 - 29))
        .with_initial_capital(10_000.0)
        .with_frequency(RebalanceFrequency::Quarterly);

    let mut sim = SimContext::from_registry(
        &single_symbol_registry(),
        "all_in",
        Arc::new(rising_series()),
        settings,
    )
    .unwrap();
    let result = sim.run();

    assert_eq!(result.rebalance_dates[0], start);
    //Quarterly dates from the start all land on weekdays in 2023
    assert_eq!(result.rebalance_count(), 4);
    assert!(*result.final_value > 10_000.0);

    let metrics = result.metrics.unwrap();
    assert!(metrics.total_return_pct > 0.0);
    assert!(metrics.total_return_pct <= 20.0);
    //Only whole-share rounding on rebalance days can pull the value down
    assert!(metrics.max_drawdown_pct < 2.0);
    assert_eq!(metrics.total_days, result.portfolio_values.len());
    assert!(result.data_quality.is_clean());
}

#[test]
fn values_are_never_negative_and_holdings_are_whole_shares() {
    init_logger();
    let start = date!(2021 - 01 - 04);
    let symbols = ["VTI", "VOO", "VXUS", "VTWO", "BND", "VUG"];
    let prices = Arc::new(PriceSeries::random(start, 300, &symbols));
    let settings = BacktestSettings::new(start, date!(2022 - 12 - 30))
        .with_frequency(RebalanceFrequency::Monthly);

    let registry = ProfileRegistry::default();
    for name in registry.names() {
        let mut sim =
            SimContext::from_registry(&registry, &name, Arc::clone(&prices), settings.clone())
                .unwrap();
        let result = sim.run();
        assert!(!result.portfolio_values.is_empty());
        for snap in &result.portfolio_values {
            assert!(*snap.value >= 0.0);
            assert!(snap.holdings.iter().all(|(_, qty)| **qty >= 0));
        }
        assert!(result
            .rebalance_dates
            .windows(2)
            .all(|pair| pair[0] < pair[1]));
    }
}

#[test]
fn unknown_profile_is_rejected_before_running() {
    let settings = BacktestSettings::new(date!(2023 - 01 - 01), date!(2023 - 12 - 31));
    let err = SimContext::from_registry(
        &ProfileRegistry::default(),
        "reckless",
        Arc::new(PriceSeries::default()),
        settings,
    )
    .err()
    .unwrap();
    assert!(err.is_invalid_argument());
    assert_eq!(err.to_string(), "invalid risk profile: reckless");
}

#[tokio::test]
async fn profiles_run_in_isolation() {
    init_logger();
    let start = date!(2022 - 01 - 03);
    let prices = Arc::new(PriceSeries::random(
        start,
        250,
        &["VTI", "VOO", "VXUS", "VTWO", "BND", "VUG"],
    ));
    let settings = BacktestSettings::new(start, date!(2022 - 12 - 30));
    let registry = ProfileRegistry::default();

    let mut names = registry.names();
    names.push("reckless".to_string());
    let results = run_profiles(&registry, &names, Arc::clone(&prices), settings.clone()).await;

    assert_eq!(results.len(), 6);
    assert!(matches!(
        results["reckless"],
        Err(BacktestError::UnknownProfile { .. })
    ));

    //Same result as running the profile alone
    let mut alone =
        SimContext::from_registry(&registry, "moderate", Arc::clone(&prices), settings).unwrap();
    assert_eq!(results["moderate"].as_ref().unwrap(), &alone.run());
}

#[tokio::test]
async fn csv_prices_to_reports() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("prices.csv");
    let mut file = std::fs::File::create(&csv_path).unwrap();
    writeln!(file, "date,symbol,close").unwrap();
    for (pos, date) in weekdays(date!(2023 - 01 - 02), date!(2023 - 03 - 31))
        .iter()
        .enumerate()
    {
        writeln!(file, "{},XYZ,{}", date, 50.0 + pos as f64).unwrap();
        //Gap in the second symbol every fifth day
        if pos % 5 != 4 {
            writeln!(file, "{},ABC,{}", date, 20.0).unwrap();
        }
    }
    drop(file);

    let mut registry = single_symbol_registry();
    registry.insert(
        "split",
        vec![("XYZ", 0.5), ("ABC", 0.5)]
            .into_iter()
            .collect::<PortfolioAllocation>(),
    );

    let settings = BacktestSettings::new(date!(2023 - 01 - 01), date!(2023 - 03 - 31))
        .with_frequency(RebalanceFrequency::Monthly);
    let prices = CsvPriceSource::new(&csv_path)
        .fetch(&registry.symbols(), settings.start_date, settings.end_date)
        .unwrap();
    assert_eq!(prices.first_date(), Some(&date!(2023 - 01 - 02)));

    let results = run_profiles(&registry, &registry.names(), Arc::new(prices), settings).await;
    let split = results["split"].as_ref().unwrap();
    assert!(split.data_quality.forward_filled > 0);
    assert_eq!(split.data_quality.fallback_priced, 0);
    assert_eq!(split.initial_capital, CashValue::from(10_000.0));

    let json_path = dir.path().join("backtest_results.json");
    let md_path = dir.path().join("BACKTEST_RESULTS.md");
    JsonReport::new(&results).save(&json_path).unwrap();
    MarkdownReport::new(&results, &registry)
        .save(&md_path)
        .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["all_in"]["start_date"], "2023-01-01");
    assert_eq!(json["split"]["rebalance_dates"][0], "2023-01-02");

    let markdown = std::fs::read_to_string(&md_path).unwrap();
    assert!(markdown.contains("### split"));
    assert!(markdown.contains("- ABC: 50.0%"));
}
