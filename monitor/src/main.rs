//! RateBridge Monitor
//!
//! Answers rate and conversion queries from live CoinGecko prices.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ratebridge_common::{describe_age, Currency, CurrencyPair};
use ratebridge_fx::{RateQueryService, RateReading};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod coingecko;
mod config;

use coingecko::CoinGeckoQuoteSource;
use config::MonitorConfig;

/// RateBridge Monitor CLI
#[derive(Parser, Debug)]
#[command(name = "ratebridge")]
#[command(about = "Query cross-rates derived from live quotes")]
struct Args {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rate for one unit of FROM in TO
    Rate { from: Currency, to: Currency },

    /// Convert AMOUNT of FROM into TO
    Convert {
        #[arg(allow_negative_numbers = true)]
        amount: Decimal,
        from: Currency,
        to: Currency,
    },

    /// Convert AMOUNT of FROM into every configured quote currency
    ConvertAll {
        #[arg(allow_negative_numbers = true)]
        amount: Decimal,
        from: Currency,
    },

    /// Every known rate from ID
    Rates { id: Currency },

    /// Refresh once and print cache status
    Status,

    /// Poll pairs until interrupted
    Watch {
        /// Seconds between polls
        #[arg(long, default_value = "30")]
        interval: u64,

        /// Comma-separated pairs, e.g. BTC:USD,ETH:EUR
        #[arg(long, value_delimiter = ',', default_value = "BTC:USD,ETH:USD,EUR:USD")]
        pairs: Vec<CurrencyPair>,
    },
}

#[derive(Serialize)]
struct Conversion<'a> {
    amount: Decimal,
    from: &'a Currency,
    to: &'a Currency,
    result: Decimal,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // Load configuration
    let config = MonitorConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let source = Arc::new(CoinGeckoQuoteSource::new(
        &config.coingecko_base_url,
        config.rates.fetch_timeout,
    )?);
    let service = RateQueryService::new(source, config.rates.clone())?;

    match args.command {
        Command::Rate { from, to } => {
            let reading = service.lookup(&from, &to).await?;
            emit(args.json, &reading, describe_reading(&reading))?;
        }
        Command::Convert { amount, from, to } => {
            let result = service.convert(amount, &from, &to).await?;
            let line = format!("{} {} = {} {}", amount, from, result.normalize(), to);
            let conversion = Conversion {
                amount,
                from: &from,
                to: &to,
                result,
            };
            emit(args.json, &conversion, line)?;
        }
        Command::ConvertAll { amount, from } => {
            let targets: Vec<Currency> = config
                .rates
                .quote_currencies
                .iter()
                .filter(|c| **c != from)
                .cloned()
                .collect();
            let converted = service.convert_many(amount, &from, &targets).await?;
            let lines: Vec<String> = converted
                .iter()
                .map(|(to, value)| format!("{} {} = {} {}", amount, from, value.normalize(), to))
                .collect();
            emit(args.json, &converted, lines.join("\n"))?;
        }
        Command::Rates { id } => {
            let rates = service.get_all_rates_for(&id).await?;
            let lines: Vec<String> = rates
                .iter()
                .map(|(to, rate)| format!("1 {} = {} {}", id, rate.normalize(), to))
                .collect();
            emit(args.json, &rates, lines.join("\n"))?;
        }
        Command::Status => {
            if let Err(e) = service.refresh().await {
                warn!(error = %e, "Refresh failed");
            }
            let stats = service.stats();
            let age = service
                .last_update_time()
                .map(describe_age)
                .unwrap_or_else(|| "never".to_string());
            let line = format!(
                "state: {}\nsource: {}\nlast update: {}\npairs: {}\nfetches: {} ({} ok, {} failed)",
                service.state(),
                service.cache().source_name(),
                age,
                stats.pairs,
                stats.upstream_fetches,
                stats.successful_refreshes,
                stats.failed_refreshes,
            );
            emit(args.json, &stats, line)?;
        }
        Command::Watch { interval, pairs } => {
            watch(&service, Duration::from_secs(interval.max(1)), &pairs).await;
        }
    }

    Ok(())
}

async fn watch(service: &RateQueryService, interval: Duration, pairs: &[CurrencyPair]) {
    info!(pairs = pairs.len(), interval_secs = interval.as_secs(), "Watching rates");
    info!("Press Ctrl+C to stop");

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for pair in pairs {
                    match service.lookup(&pair.base, &pair.quote).await {
                        Ok(reading) => info!(
                            pair = %pair,
                            rate = %reading.rate.normalize(),
                            state = %reading.state,
                            "Rate"
                        ),
                        Err(e) => warn!(pair = %pair, error = %e, "Rate unavailable"),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let stats = service.stats();
    info!(
        fetches = stats.upstream_fetches,
        failed = stats.failed_refreshes,
        coalesced = stats.coalesced_waiters,
        "Watch complete"
    );
}

fn describe_reading(reading: &RateReading) -> String {
    let age = reading
        .as_of
        .map(describe_age)
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "1 {} = {} {} ({}, {})",
        reading.pair.base,
        reading.rate.normalize(),
        reading.pair.quote,
        reading.state,
        age
    )
}

fn emit<T: Serialize>(json: bool, value: &T, text: String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text);
    }
    Ok(())
}
