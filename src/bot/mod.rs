//! Paired-leg arbitrage bot.
//!
//! Drives the engine from an observation channel and executes its decisions
//! on two leg executors. Ledger entries are recorded at the fill prices, and
//! only after both legs have filled.

mod config;
mod error;
pub mod retry;
mod stats;

pub use config::BotConfig;
pub use error::BotError;
pub use retry::RetryPolicy;
pub use stats::Stats;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::{Direction, Leg, Observation, RunResult};
use crate::engine::{ArbitrageEngine, Decision};
use crate::exchanges::{self, ExchangeError, Fill, LegExecutor, PaperExchange};

const DEFAULT_PLACEMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Main arbitrage bot that coordinates the engine and both legs.
pub struct Bot {
    cfg: Config,
    engine: Mutex<ArbitrageEngine>,
    leg_a: Arc<dyn LegExecutor>,
    leg_b: Arc<dyn LegExecutor>,

    // Placement
    retry: RetryPolicy,
    placement_timeout: Duration,

    // Runtime state
    version: String,
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    shutdown: watch::Sender<bool>,
    stats: Mutex<Stats>,
}

impl Bot {
    /// Creates a new Bot trading through the given leg executors.
    pub fn new(
        cfg: BotConfig,
        leg_a: Arc<dyn LegExecutor>,
        leg_b: Arc<dyn LegExecutor>,
    ) -> Result<Self, BotError> {
        if leg_a.leg() != Leg::A || leg_b.leg() != Leg::B {
            return Err(BotError::Config(format!(
                "executors wired to legs {}/{}, expected a/b",
                leg_a.leg(),
                leg_b.leg()
            )));
        }

        let execution = &cfg.app_config.execution;
        let placement_timeout = if execution.timeout.is_zero() {
            DEFAULT_PLACEMENT_TIMEOUT
        } else {
            execution.timeout
        };
        let retry = RetryPolicy::from_config(execution.retry.as_ref());

        let (shutdown, _) = watch::channel(false);

        Ok(Bot {
            engine: Mutex::new(ArbitrageEngine::new(cfg.app_config.strategy)),
            cfg: cfg.app_config,
            leg_a,
            leg_b,
            retry,
            placement_timeout,
            version: cfg.version,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            shutdown,
            stats: Mutex::new(Stats::default()),
        })
    }

    /// Creates a Bot whose legs fill on paper at the observed prices.
    pub fn paper(cfg: BotConfig) -> Result<Self, BotError> {
        let symbol = cfg.app_config.symbol.clone();
        let leg_a = PaperExchange::new(Leg::A, &cfg.app_config.legs.a.venue, &symbol);
        let leg_b = PaperExchange::new(Leg::B, &cfg.app_config.legs.b.venue, &symbol);
        Self::new(cfg, Arc::new(leg_a), Arc::new(leg_b))
    }

    /// Runs the bot until the feed is exhausted or [`Bot::stop`] is called.
    ///
    /// An open position is then closed on both legs and recorded as forced.
    /// Every call starts a fresh run with its own engine, ledger and stats.
    pub async fn start(
        &self,
        mut observations: mpsc::Receiver<Observation>,
    ) -> Result<RunResult, BotError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(BotError::AlreadyRunning);
            }
            *running = true;
        }

        self.shutdown.send_replace(false);
        *self.engine.lock().await = ArbitrageEngine::new(self.cfg.strategy);
        *self.stats.lock().await = Stats::default();

        {
            let mut started_at = self.started_at.lock().await;
            *started_at = Some(Instant::now());
        }

        info!(
            name = %self.cfg.app.name,
            version = %self.version,
            symbol = %self.cfg.symbol,
            leg_a = %format!("{}:{}", self.leg_a.venue(), self.leg_a.symbol()),
            leg_b = %format!("{}:{}", self.leg_b.venue(), self.leg_b.symbol()),
            upper_threshold = self.cfg.strategy.upper_threshold,
            lower_threshold = self.cfg.strategy.lower_threshold,
            placement_timeout = ?self.placement_timeout,
            "Starting arbitrage bot"
        );

        let outcome = match self.run_main_loop(&mut observations).await {
            Ok(()) => self.finish_run().await,
            Err(e) => Err(e),
        };

        *self.running.lock().await = false;

        match &outcome {
            Ok(result) => {
                let summary = result.summary();
                let uptime = self.uptime().await;
                info!(
                    uptime = ?uptime,
                    trades = result.trade_count(),
                    funding_events = result.funding_event_count(),
                    forced_closes = summary.forced_closes,
                    total_pnl = result.total_pnl(),
                    "Bot run finished"
                );
            }
            Err(e) => error!(error = %e, "Bot run aborted"),
        }

        outcome
    }

    /// Requests a graceful stop. The running loop closes any open position.
    pub async fn stop(&self) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping bot...");
        self.shutdown.send_replace(true);

        Ok(())
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> Stats {
        self.stats.lock().await.clone()
    }

    /// Returns true if the bot is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns how long the bot has been running.
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Entries recorded so far.
    pub async fn snapshot(&self) -> RunResult {
        self.engine.lock().await.log().clone().finish()
    }

    async fn run_main_loop(
        &self,
        observations: &mut mpsc::Receiver<Observation>,
    ) -> Result<(), BotError> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow_and_update() {
                info!("Shutdown requested");
                break;
            }

            tokio::select! {
                next = observations.recv() => match next {
                    Some(obs) => self.process(obs).await?,
                    None => {
                        info!("Observation feed exhausted");
                        break;
                    }
                },
                _ = shutdown.changed() => {}
            }
        }

        Ok(())
    }

    /// Handles one observation: funding, decision, execution.
    async fn process(&self, obs: Observation) -> Result<(), BotError> {
        let mut engine = self.engine.lock().await;
        let index = engine.observe(&obs)?;
        let funded = engine.accrue_funding(&obs).is_some();

        {
            let mut stats = self.stats.lock().await;
            stats.observations += 1;
            if funded {
                stats.funding_events += 1;
            }
        }

        match engine.decide(&obs) {
            Decision::Hold => {
                if let Some(unrealized) = engine.mark_to_market(&obs) {
                    debug!(
                        index,
                        time = %obs.timestamp,
                        diff_pct = obs.diff_pct(),
                        unrealized,
                        "Holding position"
                    );
                }
            }
            Decision::Open(direction) => {
                let notional = engine.strategy().init_capital;
                match self.open_pair(direction, notional, &obs).await? {
                    Some((fill_a, fill_b)) => {
                        engine.open(direction, fill_a.price, fill_b.price, obs.timestamp)?;
                        self.stats.lock().await.opens += 1;
                    }
                    None => {
                        warn!(index, direction = %direction, "Open skipped, staying flat");
                        self.stats.lock().await.skipped_opens += 1;
                    }
                }
            }
            Decision::Close => match self.close_pair(&obs, true).await? {
                Some((fill_a, fill_b)) => {
                    engine.close(fill_a.price, fill_b.price, obs.timestamp, false)?;
                    self.stats.lock().await.closes += 1;
                }
                None => {
                    warn!(index, "Close skipped, position kept");
                    self.stats.lock().await.skipped_closes += 1;
                }
            },
        }

        Ok(())
    }

    /// Closes an open position at the last observation and seals the run.
    async fn finish_run(&self) -> Result<RunResult, BotError> {
        let mut engine = self.engine.lock().await;

        let last = engine.last_observation().copied();
        let open = engine.position().copied();
        if let (Some(position), Some(last)) = (open, last) {
            warn!(
                time = %last.timestamp,
                direction = %position.direction,
                entry_time = %position.entry_time,
                "Run ended with an open position, forcing close"
            );

            let Some((fill_a, fill_b)) = self.close_pair(&last, false).await? else {
                return Err(BotError::ForcedCloseFailed(
                    "neither leg could be closed".to_string(),
                ));
            };
            engine.close(fill_a.price, fill_b.price, last.timestamp, true)?;
            self.stats.lock().await.forced_closes += 1;
        }

        debug!(
            observations = engine.observed(),
            entries = engine.entries().len(),
            "Run sealed"
        );
        Ok(engine.log().clone().finish())
    }

    /// Opens both legs. A leg that filled alone is unwound.
    ///
    /// Returns None when the pair did not open and both legs are flat.
    async fn open_pair(
        &self,
        direction: Direction,
        notional: f64,
        obs: &Observation,
    ) -> Result<Option<(Fill, Fill)>, BotError> {
        let side_a = direction.side(Leg::A);
        let side_b = direction.side(Leg::B);

        let (result_a, result_b) = tokio::join!(
            self.place(Leg::A, "open", true, || {
                self.leg_a.open_position(side_a, notional, obs.price_a)
            }),
            self.place(Leg::B, "open", true, || {
                self.leg_b.open_position(side_b, notional, obs.price_b)
            }),
        );

        match (result_a, result_b) {
            (Ok(fill_a), Ok(fill_b)) => Ok(Some((fill_a, fill_b))),
            (Err(err_a), Err(err_b)) => {
                warn!(error_a = %err_a, error_b = %err_b, "Both legs failed to open");
                Ok(None)
            }
            (Ok(_), Err(err)) => {
                warn!(leg = %Leg::B, error = %err, "Leg failed to open, unwinding leg a");
                self.unwind(&self.leg_a, obs.price_a).await?;
                Ok(None)
            }
            (Err(err), Ok(_)) => {
                warn!(leg = %Leg::A, error = %err, "Leg failed to open, unwinding leg b");
                self.unwind(&self.leg_b, obs.price_b).await?;
                Ok(None)
            }
        }
    }

    /// Closes both legs.
    ///
    /// Returns None when neither leg closed and the position is intact.
    /// A close that went through on one leg only is fatal.
    async fn close_pair(
        &self,
        obs: &Observation,
        cancellable: bool,
    ) -> Result<Option<(Fill, Fill)>, BotError> {
        let (result_a, result_b) = tokio::join!(
            self.place(Leg::A, "close", cancellable, || {
                self.leg_a.close_position(obs.price_a)
            }),
            self.place(Leg::B, "close", cancellable, || {
                self.leg_b.close_position(obs.price_b)
            }),
        );

        match (result_a, result_b) {
            (Ok(fill_a), Ok(fill_b)) => Ok(Some((fill_a, fill_b))),
            (Err(err_a), Err(err_b)) => {
                warn!(error_a = %err_a, error_b = %err_b, "Both legs failed to close");
                Ok(None)
            }
            (Ok(_), Err(err)) => Err(BotError::Unbalanced {
                leg: Leg::B,
                reason: format!("leg a closed but leg b did not: {}", err),
            }),
            (Err(err), Ok(_)) => Err(BotError::Unbalanced {
                leg: Leg::A,
                reason: format!("leg b closed but leg a did not: {}", err),
            }),
        }
    }

    async fn unwind(&self, executor: &Arc<dyn LegExecutor>, price: f64) -> Result<(), BotError> {
        let leg = executor.leg();
        match self
            .place(leg, "unwind", false, || executor.close_position(price))
            .await
        {
            Ok(fill) => {
                info!(leg = %leg, price = fill.price, "Leg unwound");
                self.stats.lock().await.unwinds += 1;
                Ok(())
            }
            Err(e) => Err(BotError::Unbalanced {
                leg,
                reason: format!("unwind failed: {}", e),
            }),
        }
    }

    /// Runs one placement under the timeout, retrying transport failures.
    ///
    /// Cancellable placements stop retrying once the bot is stopping.
    async fn place<F, Fut>(
        &self,
        leg: Leg,
        action: &'static str,
        cancellable: bool,
        mut op: F,
    ) -> exchanges::Result<Fill>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = exchanges::Result<Fill>>,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.placement_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ExchangeError::Timeout(self.placement_timeout)),
            };

            let err = match result {
                Ok(fill) => return Ok(fill),
                Err(e) => e,
            };

            let retry = attempt < self.retry.max_attempts
                && self.retry.is_retryable(&err)
                && (!cancellable || self.is_running().await);
            if !retry {
                return Err(err);
            }

            let delay = self.retry.delay(attempt);
            warn!(
                leg = %leg,
                action,
                attempt,
                error = %err,
                delay = ?delay,
                "Placement failed, retrying"
            );
            self.stats.lock().await.retries += 1;
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
