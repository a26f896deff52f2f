//! Bracket-Ladder Prediction Market Bot
//!
//! A decision engine for date-bound bracketed prediction markets.

use std::collections::BTreeMap;
use std::sync::Arc;

use bracket_bot::client::{ForecastClient, GammaClient, MarketProvider, RetryPolicy};
use bracket_bot::config::Config;
use bracket_bot::engine::{store, PositionEngine};
use bracket_bot::parser::parse_bracket;
use bracket_bot::runner::CycleRunner;
use bracket_bot::scheduler::CycleScheduler;
use bracket_bot::settlement::{daily_summary, read_settlement_log, Settler};
use bracket_bot::strategy::CandidateRanker;
use bracket_bot::types::{Observation, ParsedBracket};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bracket-bot")]
#[command(about = "Decision engine for date-bound bracketed prediction markets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decision loop
    Run,
    /// Show the current bracket ladders
    Markets,
    /// Show stored positions
    Positions,
    /// Show realized P&L by resolution date
    Report,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run => run_bot(config).await,
        Commands::Markets => show_markets(config).await,
        Commands::Positions => show_positions(config).await,
        Commands::Report => show_report(config).await,
    }
}

async fn run_bot(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting bracket bot");

    let markets = GammaClient::new(&config.markets)?;
    let forecasts = ForecastClient::new(config.forecast.clone())?;
    let engine =
        PositionEngine::load(&config.storage, config.strategy.clone(), config.risk.clone())
            .await?;
    let settler = Settler::load(config.storage.settlement_log_path()).await?;

    let runner = CycleRunner::new(
        markets,
        forecasts,
        CandidateRanker::new(config.strategy.clone()),
        RetryPolicy::new(config.retry.clone()),
        engine,
        settler,
    );
    let runner = Arc::new(Mutex::new(runner));
    let scheduler = CycleScheduler::new(&config.schedule);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping after the current cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler
        .run(shutdown_rx, move || {
            let runner = runner.clone();
            async move { runner.lock().await.run_cycle().await.map(|_| ()) }
        })
        .await;

    tracing::info!("Bracket bot stopped");
    Ok(())
}

async fn show_markets(config: Config) -> anyhow::Result<()> {
    let client = GammaClient::new(&config.markets)?;
    let observations = client.fetch_observations().await?;

    let mut ladders: BTreeMap<String, Vec<(Observation, ParsedBracket)>> = BTreeMap::new();
    for observation in observations {
        if observation.closed {
            continue;
        }
        if let Some(bracket) = parse_bracket(&observation.question) {
            ladders
                .entry(observation.date_key())
                .or_default()
                .push((observation, bracket));
        }
    }

    for (date_key, mut ladder) in ladders {
        ladder.sort_by(|a, b| a.1.value.total_cmp(&b.1.value));

        println!("\n📅 {}\n", date_key);
        println!("{:<10} {:>8} {:>12} {:<}", "Bracket", "Yes", "Volume", "Question");
        println!("{}", "-".repeat(80));
        for (observation, bracket) in ladder {
            let yes = observation.yes_price().unwrap_or(Decimal::ZERO);
            let question = truncate(&observation.question, 45);
            println!(
                "{:<10} {:>7.0}% ${:>11.0} {:<}",
                bracket.to_string(),
                yes * Decimal::ONE_HUNDRED,
                observation.volume,
                question
            );
        }
    }

    Ok(())
}

/// Char-based truncation; questions carry multi-byte text like `°F`,
/// so byte slicing is not safe here.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

async fn show_positions(config: Config) -> anyhow::Result<()> {
    let positions_store = store::load_store(&config.storage.positions_path()).await?;

    println!("\n📒 Positions ({})\n", positions_store.positions.len());
    let mut positions: Vec<_> = positions_store.positions.values().collect();
    positions.sort_by(|a, b| (&a.date_key, &a.market_id).cmp(&(&b.date_key, &b.market_id)));

    for position in positions {
        let status = if position.open {
            "OPEN".to_string()
        } else {
            match position.close_reason {
                Some(reason) => reason.to_string(),
                None => "CLOSED".to_string(),
            }
        };
        let pnl = position
            .realized_pnl
            .map(|p| format!("{:+.2}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {:<12} {:<4} {} @ {:.2}  [{}]  pnl {}",
            position.date_key,
            position.market_id,
            position.side.to_string(),
            position.bracket,
            position.entry_price(),
            status,
            pnl
        );
    }

    let decided: Vec<&String> = positions_store
        .decided_dates
        .iter()
        .filter(|(_, info)| info.is_decided())
        .map(|(date, _)| date)
        .collect();
    if !decided.is_empty() {
        println!("\nDecided dates: {:?}", decided);
    }

    Ok(())
}

async fn show_report(config: Config) -> anyhow::Result<()> {
    let records = read_settlement_log(&config.storage.settlement_log_path()).await?;
    let summary = daily_summary(&records);

    println!("\n💰 Realized P&L by date\n");
    println!("{:<12} {:>7} {:>10}", "Date", "Trades", "P&L");
    println!("{}", "-".repeat(31));

    let mut total = Decimal::ZERO;
    let mut trades = 0u32;
    for day in &summary {
        println!(
            "{:<12} {:>7} {:>10}",
            day.date_key,
            day.trades,
            format!("{:+.2}", day.realized_pnl)
        );
        total += day.realized_pnl;
        trades += day.trades;
    }
    println!("{}", "-".repeat(31));
    println!("{:<12} {:>7} {:>10}", "Total", trades, format!("{:+.2}", total));

    Ok(())
}
