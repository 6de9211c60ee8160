mod bot;
mod config;
mod domain;
mod engine;
mod exchanges;
mod feed;

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use bot::{Bot, BotConfig};
use config::Config;
use domain::RunResult;
use engine::ArbitrageEngine;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// How observations are turned into trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Synchronous replay through the engine.
    Backtest,
    /// Async driver with paper leg executors.
    Paper,
}

struct Args {
    config_path: String,
    mode: Mode,
    json: bool,
    fetch: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        config_path: DEFAULT_CONFIG_PATH.to_string(),
        mode: Mode::Backtest,
        json: false,
        fetch: false,
    };

    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            args.config_path = path.to_string();
        } else if let Some(mode) = arg.strip_prefix("--mode=") {
            args.mode = match mode {
                "backtest" => Mode::Backtest,
                "paper" => Mode::Paper,
                other => return Err(format!("unknown mode: {}", other)),
            };
        } else if arg == "--json" {
            args.json = true;
        } else if arg == "--fetch" {
            args.fetch = true;
        } else {
            return Err(format!("unknown argument: {}", arg));
        }
    }

    Ok(args)
}

fn init_tracing(log_level: Option<&str>) {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    // Logs go to stderr so --json output on stdout stays clean.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: perp-spread-arb [--config=PATH] [--mode=backtest|paper] [--fetch] [--json]");
            return ExitCode::from(2);
        }
    };

    let config = match Config::load(&args.config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.app.log_level.as_deref());

    info!(
        config = %args.config_path,
        env = %config.app.env,
        mode = ?args.mode,
        symbol = %config.symbol,
        feed = %config.feed.path,
        "Configuration loaded"
    );

    if args.fetch {
        if let Err(e) = feed::history::download(&config).await {
            error!(error = %e, "Failed to download history");
            return ExitCode::FAILURE;
        }
    }

    let observations = match feed::load_observations(&config.feed.path) {
        Ok(observations) => observations,
        Err(e) => {
            error!(error = %e, "Failed to load feed");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.mode {
        Mode::Backtest => run_backtest(&config, observations),
        Mode::Paper => run_paper(config, observations).await,
    };

    let Some(result) = result else {
        return ExitCode::FAILURE;
    };

    let summary = result.summary();
    info!(
        trades = summary.trades,
        winning = summary.winning_trades,
        losing = summary.losing_trades,
        funding_events = summary.funding_events,
        funding_pnl = summary.funding_pnl,
        open_fees = summary.open_fees,
        forced_closes = summary.forced_closes,
        avg_hold_minutes = summary.avg_hold_minutes,
        total_pnl = summary.total_pnl,
        "Run summary"
    );

    if args.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!(error = %e, "Failed to encode run result");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn run_backtest(config: &Config, observations: Vec<domain::Observation>) -> Option<RunResult> {
    match ArbitrageEngine::run(config.strategy, observations) {
        Ok(result) => Some(result),
        Err(e) => {
            error!(error = %e, "Backtest aborted");
            None
        }
    }
}

async fn run_paper(config: Config, observations: Vec<domain::Observation>) -> Option<RunResult> {
    let bot = match Bot::paper(BotConfig {
        app_config: config,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }) {
        Ok(bot) => Arc::new(bot),
        Err(e) => {
            error!(error = %e, "Failed to create bot");
            return None;
        }
    };

    let signal_bot = Arc::clone(&bot);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received");
            let _ = signal_bot.stop().await;
        }
    });

    match bot.start(feed::stream(observations)).await {
        Ok(result) => {
            let stats = bot.stats().await;
            info!(
                observations = stats.observations,
                opens = stats.opens,
                closes = stats.closes,
                skipped_opens = stats.skipped_opens,
                skipped_closes = stats.skipped_closes,
                retries = stats.retries,
                unwinds = stats.unwinds,
                "Paper run stats"
            );
            Some(result)
        }
        Err(e) => {
            let partial = bot.snapshot().await;
            error!(
                error = %e,
                recorded_entries = partial.entries.len(),
                realized_pnl = partial.total_pnl(),
                "Bot error"
            );
            None
        }
    }
}
