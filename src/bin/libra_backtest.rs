use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use libra::config::BacktestConfig;
use libra::input::{CsvPriceSource, PriceSource};
use libra::report::{JsonReport, MarkdownReport};
use libra::simcontext::run_profiles;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: libra_backtest <config.json> <prices.csv> [output_dir]");
    }

    let config = BacktestConfig::from_file(&args[1])?;
    let output_dir = args.get(3).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    let settings = config.settings()?;
    let registry = config.registry();
    info!(
        "Backtesting {} profiles from {} to {}, rebalancing {}",
        registry.len(),
        settings.start_date,
        settings.end_date,
        settings.frequency
    );

    let source = CsvPriceSource::new(&args[2]);
    let prices = source.fetch(&registry.symbols(), settings.start_date, settings.end_date)?;

    let results = run_profiles(&registry, &registry.names(), Arc::new(prices), settings).await;

    JsonReport::new(&results).save(output_dir.join("backtest_results.json"))?;
    MarkdownReport::new(&results, &registry).save(output_dir.join("BACKTEST_RESULTS.md"))?;

    for (name, outcome) in &results {
        match outcome {
            Ok(result) => println!(
                "{:<20} final value {:>14.2} over {} days",
                name,
                *result.final_value,
                result.portfolio_values.len()
            ),
            Err(e) => println!("{:<20} {}", name, e),
        }
    }
    Ok(())
}
