//! Bot runner: the per-cycle decision loop over the watchlist.
//!
//! Handles:
//! - Gating equities on the regular market session
//! - Gathering price history, quotes, sentiment and order flow per symbol
//! - Fusing signals and applying the entry gate
//! - Sizing and placing entries
//! - Forced exits (take profit, stop loss, trailing stop) and signal exits
//! - Adopting broker positions on startup

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::api::{
    AccountProfile, Bar, EconomicDataProvider, ExecutionGateway, GatewayError, NotificationSink,
    Quote,
};
use crate::cache::TtlCache;
use crate::models::{
    Decision, OrderFlowSnapshot, OrderIntent, OrderSide, Position, PriceSeries,
    SentimentSnapshot, SignalVote,
};
use crate::scheduler::{Scheduler, ShutdownToken};
use crate::sentiment::{OrderFlowAnalyzer, SentimentEngine};
use crate::signals::{Indicator, SignalEngine};
use crate::trading::{
    DailyPnlGuard, ExitReason, ExitSignal, GateInputs, MarketHours, PositionRiskManager,
    PositionSizer, Strategy, StrategyConfig, TradingConfig,
};

/// Bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Symbols evaluated every cycle, in order
    pub watchlist: Vec<String>,

    /// Pause between sweeps (seconds)
    pub check_interval_secs: u64,

    /// Watchlist symbols that trade around the clock
    pub crypto_symbols: Vec<String>,

    /// Session outside which equities are not evaluated
    pub market_hours: MarketHours,

    /// Simulate fills instead of trading the real account. Off by default,
    /// matching the CLI.
    pub dry_run: bool,

    /// Upper bound on gathering one symbol's inputs (seconds)
    pub symbol_timeout_secs: u64,

    /// Indicators that vote each cycle
    pub indicators: Vec<Indicator>,

    /// Trading configuration
    pub trading_config: TradingConfig,

    /// Strategy configuration
    pub strategy_config: StrategyConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            watchlist: ["TSLA", "META", "MSTR", "MSFT", "GOOGL", "BTC", "ETH"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            check_interval_secs: 5,
            crypto_symbols: vec!["BTC".to_string(), "ETH".to_string()],
            market_hours: MarketHours::default(),
            dry_run: false,
            symbol_timeout_secs: 30,
            indicators: Indicator::CORE.to_vec(),
            trading_config: TradingConfig::default(),
            strategy_config: StrategyConfig::default(),
        }
    }
}

impl BotConfig {
    pub fn is_crypto(&self, symbol: &str) -> bool {
        self.crypto_symbols
            .iter()
            .any(|s| s.eq_ignore_ascii_case(symbol))
    }
}

/// Why a symbol produced no decision this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MarketClosed,
    InsufficientHistory { points: usize, required: usize },
    NoPrice,
    Timeout,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MarketClosed => f.write_str("outside market hours"),
            SkipReason::InsufficientHistory { points, required } => {
                write!(f, "insufficient history: {} < {}", points, required)
            }
            SkipReason::NoPrice => f.write_str("no current price"),
            SkipReason::Timeout => f.write_str("timed out gathering inputs"),
        }
    }
}

/// What the bot did with a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleAction {
    /// Nothing to do
    None,
    /// Buy decision while a position is already open
    AlreadyOpen,
    Entered { quantity: Decimal, price: Decimal },
    EntryDenied(String),
    Exited { reason: ExitReason, quantity: Decimal, pnl: Decimal },
    OrderFailed(String),
}

/// Result of evaluating one symbol in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Skipped(SkipReason),
    Evaluated { decision: Decision, action: CycleAction },
}

/// Outcomes of one sweep over the watchlist.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub outcomes: Vec<(String, SymbolOutcome)>,
}

impl SweepReport {
    #[cfg(test)]
    pub fn get(&self, symbol: &str) -> Option<&SymbolOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(symbol))
            .map(|(_, o)| o)
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SymbolOutcome::Skipped(_)))
            .count()
    }
}

/// Everything computed for one symbol before acting on it.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub symbol: String,
    pub price: Decimal,
    pub history_points: usize,
    pub votes: BTreeMap<Indicator, SignalVote>,
    pub fused: SignalVote,
    pub sentiment: SentimentSnapshot,
    pub order_flow: OrderFlowSnapshot,
    pub decision: Decision,
    pub gate_reason: String,
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} @ ${} ===", self.symbol, self.price)?;
        writeln!(f, "History:      {} closes", self.history_points)?;
        for (indicator, vote) in &self.votes {
            writeln!(f, "  {:<12} {}", indicator.name(), vote)?;
        }
        writeln!(f, "Fused vote:   {}", self.fused)?;
        writeln!(
            f,
            "Sentiment:    {:.3} (risk {}, sector {} x{:.1})",
            self.sentiment.sentiment,
            self.sentiment.risk_level,
            self.sentiment.sector.as_deref().unwrap_or("unknown"),
            self.sentiment.sector_sensitivity
        )?;
        writeln!(f, "Volatility:   {:.4}", self.sentiment.volatility)?;
        writeln!(f, "Order flow:   {}", self.order_flow)?;
        writeln!(f, "Gate:         {}", self.gate_reason)?;
        writeln!(
            f,
            "Decision:     {} (size x{:.3})",
            self.decision.action, self.decision.size_multiplier
        )?;
        Ok(())
    }
}

/// Bot statistics.
#[derive(Debug, Clone)]
pub struct BotStats {
    pub started_at: DateTime<Utc>,
    pub sweeps: u64,
    pub evaluations: u64,
    pub skipped: u64,
    pub entries: u64,
    pub exits: HashMap<ExitReason, u64>,
    pub failed_orders: u64,
    pub realized_pnl: Decimal,
    pub open_positions: usize,
    pub dry_run: bool,
}

impl BotStats {
    fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            sweeps: 0,
            evaluations: 0,
            skipped: 0,
            entries: 0,
            exits: HashMap::new(),
            failed_orders: 0,
            realized_pnl: Decimal::ZERO,
            open_positions: 0,
            dry_run,
        }
    }

    pub fn total_exits(&self) -> u64 {
        self.exits.values().sum()
    }
}

impl fmt::Display for BotStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exits_by = |reason: ExitReason| self.exits.get(&reason).copied().unwrap_or(0);

        writeln!(f, "=== Bot Statistics ===")?;
        writeln!(f, "Running since:   {}", self.started_at.format("%Y-%m-%d %H:%M"))?;
        writeln!(f, "Sweeps:          {}", self.sweeps)?;
        writeln!(f, "Evaluations:     {} (Skipped: {})", self.evaluations, self.skipped)?;
        writeln!(f, "Entries:         {}", self.entries)?;
        writeln!(
            f,
            "Exits:           {} (TP: {}, SL: {}, Trail: {}, Signal: {})",
            self.total_exits(),
            exits_by(ExitReason::TakeProfit),
            exits_by(ExitReason::StopLoss),
            exits_by(ExitReason::TrailingStop),
            exits_by(ExitReason::SignalSell)
        )?;
        writeln!(f, "Failed Orders:   {}", self.failed_orders)?;
        writeln!(f, "Realized P&L:    ${:.2}", self.realized_pnl)?;
        writeln!(f, "Open Positions:  {}", self.open_positions)?;
        writeln!(f, "Mode:            {}", if self.dry_run { "Dry Run" } else { "Live" })?;
        Ok(())
    }
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    gateway: Arc<dyn ExecutionGateway>,
    notifier: Arc<dyn NotificationSink>,
    signals: SignalEngine,
    sentiment: SentimentEngine,
    order_flow: OrderFlowAnalyzer,
    strategy: Arc<Strategy>,
    sizer: PositionSizer,
    positions: RwLock<PositionRiskManager>,
    daily: Mutex<DailyPnlGuard>,
    account_cache: Arc<TtlCache<(), AccountProfile>>,
    stats: Mutex<BotStats>,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        gateway: Arc<dyn ExecutionGateway>,
        economic: Arc<dyn EconomicDataProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let trading = &config.trading_config;

        let strategy = Arc::new(Strategy::new(
            config.strategy_config.clone(),
            trading.order_flow_baseline,
            trading.base_position_multiplier,
        ));
        let sentiment = SentimentEngine::new(
            gateway.clone(),
            economic,
            Arc::new(TtlCache::new()),
            trading.economic_ttl(),
        );
        let order_flow = OrderFlowAnalyzer::new(
            gateway.clone(),
            Arc::new(TtlCache::new()),
            trading.order_flow_ttl(),
        );
        let daily = DailyPnlGuard::new(
            config.strategy_config.max_daily_loss,
            config.strategy_config.max_daily_profit,
        );

        Self {
            signals: SignalEngine::new(config.indicators.clone()),
            sentiment,
            order_flow,
            sizer: PositionSizer::new(trading.clone()),
            positions: RwLock::new(PositionRiskManager::new(strategy.clone())),
            strategy,
            daily: Mutex::new(daily),
            account_cache: Arc::new(TtlCache::new()),
            stats: Mutex::new(BotStats::new(config.dry_run)),
            gateway,
            notifier,
            config,
        }
    }

    fn in_watchlist(&self, symbol: &str) -> bool {
        self.config
            .watchlist
            .iter()
            .any(|s| s.eq_ignore_ascii_case(symbol))
    }

    /// Adopt broker positions in watchlist symbols so exits protect them.
    pub async fn initialize(&self) -> Result<()> {
        info!("Initializing bot...");

        let broker_positions = match self.gateway.open_positions().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Could not load broker positions, starting flat");
                return Ok(());
            }
        };

        let mut positions = self.positions.write().await;
        for held in broker_positions {
            if !self.in_watchlist(&held.symbol) {
                debug!(symbol = %held.symbol, "Ignoring position outside watchlist");
                continue;
            }

            let position = Position::new(held.symbol.clone(), held.average_buy_price, held.quantity);
            if let Err(e) = positions.adopt(position) {
                warn!(symbol = %held.symbol, error = %e, "Could not adopt broker position");
            }
        }

        info!(
            watchlist = self.config.watchlist.len(),
            positions = positions.len(),
            dry_run = self.config.dry_run,
            "Bot initialized"
        );
        Ok(())
    }

    /// Sweep the watchlist every interval until shutdown.
    ///
    /// A shutdown request lets the current sweep finish. Open positions are
    /// left as they are.
    pub async fn run(&self, shutdown: ShutdownToken) -> Result<()> {
        info!(
            dry_run = self.config.dry_run,
            interval = self.config.check_interval_secs,
            symbols = ?self.config.watchlist,
            "Starting bot run loop"
        );

        let mut scheduler = Scheduler::new(
            Duration::from_secs(self.config.check_interval_secs),
            shutdown,
        );

        while scheduler.next_tick().await.is_some() {
            let report = self.run_once().await;
            debug!(
                symbols = report.outcomes.len(),
                skipped = report.skipped(),
                "Sweep complete"
            );
        }

        let positions = self.positions.read().await;
        if !positions.is_empty() {
            info!(open = positions.len(), "Leaving open positions in place");
        }
        info!("Bot stopped");
        Ok(())
    }

    /// One sweep over the watchlist, symbols in order.
    pub async fn run_once(&self) -> SweepReport {
        self.run_once_at(Utc::now()).await
    }

    /// One sweep as of `now`. Outside the market session only crypto symbols
    /// are evaluated; equities and their open positions wait for the open.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let session_open = self.config.market_hours.is_open_at(now);
        if !session_open {
            debug!(session = %self.config.market_hours, "Market closed, evaluating crypto only");
        }

        let mut closed: u64 = 0;
        for symbol in &self.config.watchlist {
            let outcome = if session_open || self.config.is_crypto(symbol) {
                self.evaluate_symbol(symbol).await
            } else {
                closed += 1;
                SymbolOutcome::Skipped(SkipReason::MarketClosed)
            };
            report.outcomes.push((symbol.clone(), outcome));
        }

        let open = self.positions.read().await.len();
        let mut stats = self.stats.lock().await;
        stats.sweeps += 1;
        stats.skipped += closed;
        stats.open_positions = open;
        report
    }

    /// Evaluate one symbol and act on the decision.
    ///
    /// Never fails: every external failure is logged and reflected in the
    /// outcome so the rest of the sweep continues.
    pub async fn evaluate_symbol(&self, symbol: &str) -> SymbolOutcome {
        let timeout = Duration::from_secs(self.config.symbol_timeout_secs);
        let analysis = match tokio::time::timeout(timeout, self.analyze(symbol)).await {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(reason)) => return self.skip(symbol, reason).await,
            Err(_) => {
                warn!(symbol = %symbol, timeout_secs = timeout.as_secs(), "Symbol evaluation timed out");
                return self.skip(symbol, SkipReason::Timeout).await;
            }
        };

        self.stats.lock().await.evaluations += 1;

        let decision = analysis.decision;
        let exit = self.positions.write().await.evaluate(
            symbol,
            analysis.price,
            decision.action == SignalVote::Sell,
        );

        let action = if let Some(exit) = exit {
            self.execute_exit(symbol, exit).await
        } else if decision.action == SignalVote::Buy {
            self.try_enter(&analysis).await
        } else {
            CycleAction::None
        };

        debug!(
            symbol = %symbol,
            action = %decision.action,
            multiplier = decision.size_multiplier,
            outcome = ?action,
            "Symbol evaluated"
        );

        SymbolOutcome::Evaluated { decision, action }
    }

    async fn skip(&self, symbol: &str, reason: SkipReason) -> SymbolOutcome {
        info!(symbol = %symbol, reason = %reason, "Skipping symbol this cycle");
        self.stats.lock().await.skipped += 1;
        SymbolOutcome::Skipped(reason)
    }

    /// Evaluate one symbol without placing orders.
    pub async fn analyze_symbol(&self, symbol: &str) -> Result<Analysis> {
        match self.analyze(symbol).await {
            Ok(analysis) => Ok(analysis),
            Err(reason) => bail!("{}: {}", symbol, reason),
        }
    }

    /// Gather inputs and compute the decision.
    async fn analyze(&self, symbol: &str) -> std::result::Result<Analysis, SkipReason> {
        let bars: Vec<Bar> = match self.gateway.historicals(symbol).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Price history unavailable");
                Vec::new()
            }
        };

        let series = PriceSeries::new(bars.iter().map(|b| b.close).collect());
        let required = self.config.trading_config.min_history_points;
        if series.len() < required {
            return Err(SkipReason::InsufficientHistory {
                points: series.len(),
                required,
            });
        }

        let quote: Option<Quote> = match self.gateway.quote(symbol).await {
            Ok(q) => Some(q),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Quote unavailable, using last close");
                None
            }
        };

        let price = quote
            .as_ref()
            .map(|q| q.last_trade_price)
            .filter(|p| *p > Decimal::ZERO)
            .or_else(|| {
                series
                    .last()
                    .and_then(|c| Decimal::try_from(c).ok())
                    .map(|d| d.round_dp(8))
            })
            .filter(|p| *p > Decimal::ZERO)
            .ok_or(SkipReason::NoPrice)?;

        let votes = self.signals.vote(&series);
        let fused = SignalEngine::fuse(votes.values().copied());

        let sentiment = self.sentiment.market_sentiment(symbol, series.closes()).await;
        let order_flow = self.order_flow.analyze(symbol, quote.as_ref(), &bars).await;

        let (decision, gate) = self.strategy.decide(GateInputs {
            fused,
            sentiment: &sentiment,
            order_flow: &order_flow,
        });

        Ok(Analysis {
            symbol: symbol.to_uppercase(),
            price,
            history_points: series.len(),
            votes,
            fused,
            sentiment,
            order_flow,
            decision,
            gate_reason: gate.reason,
        })
    }

    /// Buying power, memoised briefly in the account cache.
    async fn buying_power(&self) -> Result<Decimal> {
        let ttl = self.config.trading_config.buying_power_ttl();
        if let Some(profile) = self.account_cache.get(&(), ttl).await {
            return Ok(profile.buying_power);
        }

        let profile = self.gateway.account_profile().await?;
        self.account_cache.set((), profile).await;
        Ok(profile.buying_power)
    }

    async fn try_enter(&self, analysis: &Analysis) -> CycleAction {
        let symbol = analysis.symbol.as_str();

        if self.positions.read().await.has_position(symbol) {
            debug!(symbol = %symbol, "Buy signal ignored, position already open");
            return CycleAction::AlreadyOpen;
        }

        let daily = self.daily.lock().await.check();
        if !daily.allowed {
            return CycleAction::EntryDenied(daily.reason);
        }

        let buying_power = match self.buying_power().await {
            Ok(bp) => bp,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Buying power unavailable");
                return CycleAction::EntryDenied(format!("buying power unavailable: {}", e));
            }
        };

        let multiplier = analysis.decision.size_multiplier;
        let sizing = if self.config.is_crypto(symbol) {
            self.sizer.fractional_quantity(buying_power, analysis.price, multiplier)
        } else {
            self.sizer.quantity(buying_power, analysis.price, multiplier)
        };
        let quantity = match sizing.adjusted_size {
            Some(q) if sizing.allowed => q,
            _ => {
                info!(symbol = %symbol, reason = %sizing.reason, "Entry skipped by sizing");
                return CycleAction::EntryDenied(sizing.reason);
            }
        };

        let intent = OrderIntent::new(symbol, OrderSide::Buy, quantity, analysis.price, "signal_buy");
        let confirmation = match self.gateway.place_order(&intent).await {
            Ok(c) => c,
            Err(e) => {
                match &e {
                    GatewayError::Rejected(reason) => {
                        warn!(symbol = %symbol, quantity = %quantity, reason = %reason, "Buy order rejected")
                    }
                    _ => error!(symbol = %symbol, quantity = %quantity, error = %e, "Buy order failed"),
                }
                self.stats.lock().await.failed_orders += 1;
                return CycleAction::OrderFailed(e.to_string());
            }
        };
        self.account_cache.invalidate(&()).await;

        let fill_price = confirmation.fill_price.unwrap_or(analysis.price);
        if let Err(e) = self.positions.write().await.open(symbol, fill_price, quantity) {
            warn!(symbol = %symbol, error = %e, "Filled buy could not be tracked");
        }
        self.stats.lock().await.entries += 1;

        info!(
            symbol = %symbol,
            quantity = %quantity,
            price = %fill_price,
            multiplier = analysis.decision.size_multiplier,
            order_id = %confirmation.order_id,
            "Entered position"
        );
        self.notify(
            format!("BUY {}", symbol),
            format!(
                "{} @ ${} (size x{:.2})",
                quantity, fill_price, analysis.decision.size_multiplier
            ),
        );

        CycleAction::Entered {
            quantity,
            price: fill_price,
        }
    }

    async fn execute_exit(&self, symbol: &str, exit: ExitSignal) -> CycleAction {
        let quantity = match self.gateway.holdings(symbol).await {
            Ok(held) if held > Decimal::ZERO => held,
            Ok(_) => exit.quantity,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Holdings unavailable, selling tracked quantity");
                exit.quantity
            }
        };

        let intent = OrderIntent::new(symbol, OrderSide::Sell, quantity, exit.price, exit.reason.as_str());
        let confirmation = match self.gateway.place_order(&intent).await {
            Ok(c) => c,
            Err(e) => {
                error!(
                    symbol = %symbol,
                    reason = %exit.reason,
                    quantity = %quantity,
                    error = %e,
                    "Sell order failed, position kept"
                );
                self.stats.lock().await.failed_orders += 1;
                return CycleAction::OrderFailed(e.to_string());
            }
        };
        self.account_cache.invalidate(&()).await;

        let position = match self.positions.write().await.close(symbol) {
            Ok(p) => p,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Sold position was not tracked");
                return CycleAction::Exited {
                    reason: exit.reason,
                    quantity,
                    pnl: Decimal::ZERO,
                };
            }
        };

        let fill_price = confirmation.fill_price.unwrap_or(exit.price);
        let pnl = (fill_price - position.entry_price) * quantity;
        self.daily.lock().await.record(pnl);
        {
            let mut stats = self.stats.lock().await;
            *stats.exits.entry(exit.reason).or_insert(0) += 1;
            stats.realized_pnl += pnl;
        }

        info!(
            symbol = %symbol,
            reason = %exit.reason,
            quantity = %quantity,
            entry = %position.entry_price,
            exit = %fill_price,
            pnl = %pnl.round_dp(2),
            "Exited position"
        );
        self.notify(
            format!("SELL {}", symbol),
            format!(
                "{} @ ${} ({}), P&L ${:.2} ({:.2}%)",
                quantity,
                fill_price,
                exit.reason,
                pnl,
                position.return_pct(fill_price).to_f64().unwrap_or(0.0) * 100.0
            ),
        );

        CycleAction::Exited {
            reason: exit.reason,
            quantity,
            pnl,
        }
    }

    /// Send a notification in the background; failures are only logged.
    fn notify(&self, title: String, message: String) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&title, &message).await {
                warn!(title = %title, error = %e, "Notification failed");
            }
        });
    }

    /// Copy of the open positions.
    pub async fn positions(&self) -> Vec<Position> {
        self.positions.read().await.snapshot()
    }

    pub async fn get_stats(&self) -> BotStats {
        let open = self.positions.read().await.len();
        let mut stats = self.stats.lock().await.clone();
        stats.open_positions = open;
        stats
    }
}
