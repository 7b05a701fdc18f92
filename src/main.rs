//! Crashpot interactive driver
//!
//! Wires the engine together and exposes the caller-facing operations as a
//! small stdin command loop, with a printer task consuming the notifier
//! channel. This stands in for whatever chat transport fronts the engine in
//! a real deployment.

use clap::Parser;
use crashpot::{
    BalanceLedger, ChannelNotifier, ConfigLoader, GameEngine, GameEvent, SessionRegistry,
    SnapshotStore, StatsTracker, UserId,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crashpot")]
#[command(about = "Crash-game session engine", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    let ledger = Arc::new(BalanceLedger::open(
        SnapshotStore::new(config.storage.balances_path()),
        config.game.starting_balance,
    ));
    let stats = Arc::new(StatsTracker::open(SnapshotStore::new(
        config.storage.stats_path(),
    )));
    let (notifier, mut events) = ChannelNotifier::new();
    let engine = GameEngine::new(
        config.game.clone(),
        Arc::clone(&ledger),
        Arc::new(SessionRegistry::new()),
        Arc::clone(&stats),
        Arc::new(notifier),
    );

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            render(event);
        }
    });

    info!("Engine ready. Commands: start <user> <stake> | cashout <user> | balance <user> | profile <user> | top | withdraw <user> <amount> | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["start", user, stake] => {
                if let (Some(user_id), Some(stake)) = (parse_id(user), parse_id(stake)) {
                    if let Err(e) = engine.start_session(user_id, stake).await {
                        error!(user_id, "{}", e);
                    }
                } else {
                    println!("usage: start <user> <stake>");
                }
            }
            ["cashout", user] => {
                if let Some(user_id) = parse_id(user) {
                    match engine.cash_out(user_id).await {
                        Ok(receipt) => println!(
                            "user {} cashed out: stake {} x{:.2} = {} (balance {})",
                            receipt.user_id,
                            receipt.stake,
                            receipt.multiplier,
                            receipt.payout,
                            receipt.balance
                        ),
                        Err(e) => error!(user_id, "{}", e),
                    }
                }
            }
            ["balance", user] => {
                if let Some(user_id) = parse_id(user) {
                    println!("user {} balance: {}", user_id, engine.balance(user_id));
                }
            }
            ["profile", user] => {
                if let Some(user_id) = parse_id(user) {
                    let profile = engine.profile(user_id);
                    println!(
                        "user {}: balance {}, games played {}",
                        profile.user_id, profile.balance, profile.games_played
                    );
                }
            }
            ["top"] => {
                for (rank, (user_id, balance)) in
                    engine.top_players(10).into_iter().enumerate()
                {
                    println!("{}. user {} - {}", rank + 1, user_id, balance);
                }
            }
            ["withdraw", user, amount] => {
                if let (Some(user_id), Some(amount)) = (parse_id(user), parse_id(amount)) {
                    match engine.withdraw(user_id, amount).await {
                        Ok(receipt) => println!(
                            "user {} withdrew {} (balance {})",
                            receipt.user_id, receipt.amount, receipt.balance
                        ),
                        Err(e) => error!(user_id, "{}", e),
                    }
                }
            }
            ["quit"] | ["exit"] => break,
            [] => {}
            _ => println!("unknown command: {}", line),
        }
    }

    info!("Shutting down, flushing snapshots");
    ledger.flush_now().await;
    stats.flush_now().await;
    Ok(())
}

fn render(event: GameEvent) {
    match event {
        GameEvent::Tick {
            user_id,
            multiplier,
        } => println!("user {} multiplier: x{:.2}", user_id, multiplier),
        GameEvent::Crash { user_id } => {
            println!("user {} crashed! Stake forfeited.", user_id)
        }
        GameEvent::CashOut {
            user_id,
            stake,
            multiplier,
            payout,
        } => println!(
            "user {} finished: stake {} x{:.2} = {}",
            user_id, stake, multiplier, payout
        ),
        GameEvent::Rejected { user_id, reason } => {
            println!("user {} rejected: {}", user_id, reason)
        }
    }
}

fn parse_id(raw: &str) -> Option<UserId> {
    raw.parse().ok()
}
