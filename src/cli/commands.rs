//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::Confirm;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::alerts::AlertLog;
use crate::config::Config;
use crate::process::{Process, TickSummary};
use crate::trade::TradeActions;
use crate::types::{asset_name, Symbol};

fn open(config: &Config) -> Result<Process> {
    Process::from_config(config).context("Failed to initialize trader")
}

fn actions(process: &Process) -> TradeActions {
    let config = process.effective_config(&AlertLog::new());
    TradeActions::new(process.trades(), config.stable_coin)
}

fn print_summary(summary: &TickSummary) {
    for result in &summary.results {
        println!("{}", result);
    }
    if let Some(market_move) = &summary.market_move {
        println!(
            "Market: {:.1}% up, {:.1}% down",
            market_move.up_percent, market_move.down_percent
        );
    }
    if summary.anomalies > 0 {
        println!("Price anomalies: {}", summary.anomalies);
    }
}

/// Run one tick per interval until interrupted
pub async fn run(config: &Config) -> Result<()> {
    let process = open(config)?;
    info!(
        "Starting trader: interval {}s, deadline {}s",
        config.scheduler.interval_secs, config.scheduler.tick_deadline_secs
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.scheduler.interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }

        let started = Instant::now();
        match process.tick().await {
            Ok(summary) => info!(
                trades = summary.results.len(),
                anomalies = summary.anomalies,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Tick complete"
            ),
            Err(e) => error!("Tick failed: {}", e),
        }
    }

    Ok(())
}

/// Run a single tick and print what happened
pub async fn tick(config: &Config) -> Result<()> {
    let process = open(config)?;
    let summary = process.tick().await?;
    print_summary(&summary);
    if let Some(digest) = &summary.digest {
        println!("\n{}", digest);
    }
    Ok(())
}

pub fn buy(config: &Config, coin: &str) -> Result<()> {
    let process = open(config)?;
    let memo = actions(&process).buy(coin)?;
    println!("{}: {} requested", memo.symbol(), memo.state);
    Ok(())
}

/// Request a sell of a held position
pub async fn sell(config: &Config, coin: &str, force: bool) -> Result<()> {
    let process = open(config)?;
    let coin = asset_name(coin)?;

    let memo = process
        .trades()
        .get(&coin)?
        .with_context(|| format!("{} is not tracked", coin))?;

    if !force {
        let price = process.prices().get_price(memo.symbol()).await.ok();
        let prompt = match price {
            Some(price) => format!(
                "Sell {} {} at about {}? This cannot be undone.",
                memo.trade_result.quantity, coin, price
            ),
            None => format!("Sell {} {}? This cannot be undone.", memo.trade_result.quantity, coin),
        };
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Sell cancelled by user");
            return Ok(());
        }
    }

    let memo = actions(&process).sell(&coin)?;
    println!("{}: {} requested, executes on the next tick", memo.symbol(), memo.state);
    Ok(())
}

pub fn hold(config: &Config, coin: &str, release: bool) -> Result<()> {
    let process = open(config)?;
    let memo = actions(&process).set_hold(coin, !release)?;
    println!("{}: hold = {}", memo.symbol(), memo.hold);
    Ok(())
}

pub fn cancel(config: &Config, coin: &str) -> Result<()> {
    let process = open(config)?;
    match actions(&process).cancel(coin)? {
        Some(memo) => println!("{}: back to {}", memo.symbol(), memo.state),
        None => println!("{}: request cancelled, no longer tracked", coin.to_uppercase()),
    }
    Ok(())
}

pub fn drop(config: &Config, coin: &str) -> Result<()> {
    let process = open(config)?;
    actions(&process).drop(coin)?;
    println!("{}: dropped", coin.to_uppercase());
    Ok(())
}

/// Show tracked positions
pub fn trades(config: &Config) -> Result<()> {
    let process = open(config)?;
    let memos = process.trades().list()?;

    println!("\n=== TRADES ===\n");
    if memos.is_empty() {
        println!("No tracked coins.");
        return Ok(());
    }

    println!(
        "{:<12} {:<7} {:>14} {:>14} {:>14} {:>10} {:>5}",
        "SYMBOL", "STATE", "QUANTITY", "PRICE", "STOP", "PROFIT %", "HOLD"
    );
    for memo in memos {
        println!(
            "{:<12} {:<7} {:>14.6} {:>14.6} {:>14.6} {:>10.2} {:>5}",
            memo.symbol().to_string(),
            memo.state.to_string(),
            memo.trade_result.quantity,
            memo.current_price(),
            memo.stop_limit_price,
            memo.profit_percent(),
            if memo.hold { "yes" } else { "" }
        );
    }
    Ok(())
}

/// Show the current survivor ranking
pub fn scores(config: &Config) -> Result<()> {
    let process = open(config)?;
    let stable_coin = process.effective_config(&AlertLog::new()).stable_coin;
    let scores = process.survivors().get_scores(&stable_coin)?;

    println!("\n=== SURVIVORS ===\n");
    if scores.is_empty() {
        println!("No scores yet.");
    }
    for (rank, score) in scores.iter().enumerate() {
        println!(
            "{:>2}. {:<12} {:>4}",
            rank + 1,
            Symbol::new(score.coin_name.as_str(), stable_coin.as_str()).to_string(),
            score.score
        );
    }
    Ok(())
}

pub fn reset_scores(config: &Config, force: bool) -> Result<()> {
    if !force {
        let confirmed = Confirm::new()
            .with_prompt("Reset all survivor scores?")
            .default(false)
            .interact()?;
        if !confirmed {
            return Ok(());
        }
    }

    open(config)?.survivors().reset_scores()?;
    println!("Scores reset.");
    Ok(())
}

/// Show realized profit
pub fn stats(config: &Config) -> Result<()> {
    let stats = open(config)?.stats().get()?;

    println!("\n=== STATISTICS ===\n");
    println!("Total profit: {:.2}", stats.total_profit);
    if stats.daily.is_empty() {
        return Ok(());
    }

    println!("\nDaily:");
    for (day, daily) in stats.daily.iter().rev() {
        println!(
            "  {}  trades={} wins={} losses={} win_rate={:.0}% net={:.2}",
            day,
            daily.total_trades,
            daily.winning_trades,
            daily.losing_trades,
            daily.win_rate(),
            daily.net_pnl
        );
    }
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check system health
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let process = open(config)?;
    let mut all_healthy = true;

    print!("Price feed ({})... ", process.prices().feed_name());
    let started = Instant::now();
    match process.prices().get_prices().await {
        Ok(prices) => println!(
            "OK ({} symbols, {}ms)",
            prices.len(),
            started.elapsed().as_millis()
        ),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Exchange account... ");
    if config.exchange.api_key.is_empty() {
        println!("SKIPPED (no API key)");
    } else {
        let stable_coin = &config.trading.stable_coin;
        match process.exchange().get_free_balance(stable_coin).await {
            Ok(balance) => println!("OK ({} {})", balance, stable_coin),
            Err(e) => {
                println!("FAILED: {}", e);
                all_healthy = false;
            }
        }
    }

    print!("Store... ");
    match process.trades().list() {
        Ok(memos) => println!("OK ({} tracked coins)", memos.len()),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    println!();
    if all_healthy {
        println!("All systems healthy!");
    } else {
        warn!("Some systems are unhealthy");
        println!("Some systems are unhealthy. Check the errors above.");
    }

    Ok(())
}
