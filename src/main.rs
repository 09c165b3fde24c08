//! SmartTrader
//!
//! Watchlist trading bot that fuses technical indicator votes with macro
//! sentiment and order flow, and protects every open position with take
//! profit, stop loss and trailing stop exits.

mod api;
mod bot;
mod cache;
mod models;
mod scheduler;
mod sentiment;
mod signals;
mod trading;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{
    BlsClient, BrokerClient, ExecutionGateway, LogNotifier, NotificationSink, PaperConfig,
    PaperGateway, WebhookNotifier,
};
use crate::bot::{Bot, BotConfig};
use crate::scheduler::shutdown_channel;
use crate::signals::Indicator;
use crate::trading::{
    parse_session_time, parse_timezone, MarketHours, StrategyConfig, TradingConfig,
};

/// SmartTrader CLI.
#[derive(Parser)]
#[command(name = "smarttrader")]
#[command(about = "Signal-fusion trading bot with position risk management", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "LOG_LEVEL", global = true)]
    log_level: String,

    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

/// Tunables shared by every command.
#[derive(Args, Debug, Clone)]
struct Settings {
    /// Symbols to trade, comma separated
    #[arg(
        long,
        env = "WATCHLIST",
        value_delimiter = ',',
        default_value = "TSLA,META,MSTR,MSFT,GOOGL,BTC,ETH",
        global = true
    )]
    watchlist: Vec<String>,

    /// Symbols that trade around the clock as crypto pairs
    #[arg(long, env = "CRYPTO_SYMBOLS", value_delimiter = ',', default_value = "BTC,ETH", global = true)]
    crypto_symbols: Vec<String>,

    /// Equity session open, exchange local time (HH:MM)
    #[arg(long, env = "MARKET_OPEN_TIME", default_value = "09:30", value_parser = parse_session_time, global = true)]
    market_open: NaiveTime,

    /// Equity session close, exchange local time (HH:MM)
    #[arg(long, env = "MARKET_CLOSE_TIME", default_value = "16:00", value_parser = parse_session_time, global = true)]
    market_close: NaiveTime,

    /// Exchange time zone
    #[arg(long, env = "MARKET_TIMEZONE", default_value = "America/New_York", value_parser = parse_timezone, global = true)]
    market_timezone: Tz,

    /// Indicators that vote (momentum, sma_cross, rsi, macd, bollinger, stochastic)
    #[arg(
        long,
        env = "INDICATORS",
        value_delimiter = ',',
        default_value = "momentum,sma_cross,rsi,macd",
        global = true
    )]
    indicators: Vec<String>,

    /// Seconds between sweeps
    #[arg(short, long, env = "CHECK_INTERVAL_SECS", default_value = "5", global = true)]
    interval: u64,

    /// Seconds allowed for gathering one symbol's inputs
    #[arg(long, env = "SYMBOL_TIMEOUT_SECS", default_value = "30", global = true)]
    symbol_timeout: u64,

    /// Stop loss below entry (0.02 = 2%)
    #[arg(long, env = "STOP_LOSS_PCT", default_value = "0.02", global = true)]
    stop_loss: Decimal,

    /// Take profit above entry (0.03 = 3%)
    #[arg(long, env = "TAKE_PROFIT_PCT", default_value = "0.03", global = true)]
    take_profit: Decimal,

    /// Trailing stop distance below the peak (0.015 = 1.5%)
    #[arg(long, env = "TRAILING_STOP_PCT", default_value = "0.015", global = true)]
    trailing_stop: Decimal,

    /// Disable the trailing stop
    #[arg(long, env = "NO_TRAILING_STOP", global = true)]
    no_trailing_stop: bool,

    /// Entries require volatility below this
    #[arg(long, env = "VOLATILITY_THRESHOLD", default_value = "0.02", global = true)]
    volatility_threshold: f64,

    /// Halt entries for the day after this realized loss (USD)
    #[arg(long, env = "MAX_DAILY_LOSS", default_value = "500", global = true)]
    max_daily_loss: Decimal,

    /// Halt entries for the day after this realized profit (USD)
    #[arg(long, env = "MAX_DAILY_PROFIT", default_value = "500", global = true)]
    max_daily_profit: Decimal,

    /// Base position multiplier before volatility and risk scaling
    #[arg(long, env = "BASE_POSITION_MULTIPLIER", default_value = "1.0", global = true)]
    base_multiplier: f64,

    /// Smallest quantity worth ordering
    #[arg(long, env = "MIN_ORDER_QUANTITY", default_value = "1", global = true)]
    min_order_quantity: Decimal,

    /// Allow fractional quantities
    #[arg(long, env = "ALLOW_FRACTIONAL", global = true)]
    fractional: bool,

    /// BLS API key (optional, raises the daily request quota)
    #[arg(long, env = "BLS_API_KEY", global = true)]
    bls_api_key: Option<String>,

    /// Webhook for trade notifications; log only when unset
    #[arg(long, env = "WEBHOOK_URL", global = true)]
    webhook_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading loop
    Run {
        /// Simulate fills instead of trading the real account (trades live
        /// when unset)
        #[arg(long, env = "DRY_RUN")]
        dry_run: bool,

        /// Starting cash for dry runs
        #[arg(long, env = "PAPER_CAPITAL", default_value = "10000")]
        paper_capital: Decimal,

        /// Simulated slippage for dry runs (0.003 = 0.3%)
        #[arg(long, env = "PAPER_SLIPPAGE", default_value = "0.003")]
        paper_slippage: Decimal,
    },

    /// Evaluate one symbol once without placing orders
    Analyze {
        /// Ticker symbol
        symbol: String,
    },

    /// Show the effective configuration
    Config,
}

impl Settings {
    fn indicators(&self) -> Result<Vec<Indicator>> {
        let mut indicators = Vec::new();
        for name in &self.indicators {
            match Indicator::from_str(name) {
                Some(indicator) if !indicators.contains(&indicator) => indicators.push(indicator),
                Some(_) => {}
                None => bail!("Unknown indicator: {}", name),
            }
        }
        if indicators.is_empty() {
            bail!("At least one indicator is required");
        }
        Ok(indicators)
    }

    fn bot_config(&self, dry_run: bool) -> Result<BotConfig> {
        let watchlist: Vec<String> = self
            .watchlist
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if watchlist.is_empty() {
            bail!("Watchlist is empty");
        }
        if self.market_open >= self.market_close {
            bail!(
                "Market open {} must be before close {}",
                self.market_open,
                self.market_close
            );
        }

        Ok(BotConfig {
            watchlist,
            check_interval_secs: self.interval.max(1),
            crypto_symbols: self
                .crypto_symbols
                .iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            market_hours: MarketHours::new(self.market_open, self.market_close, self.market_timezone),
            dry_run,
            symbol_timeout_secs: self.symbol_timeout.max(1),
            indicators: self.indicators()?,
            trading_config: TradingConfig {
                base_position_multiplier: self.base_multiplier,
                min_order_quantity: self.min_order_quantity,
                allow_fractional: self.fractional,
                ..Default::default()
            },
            strategy_config: StrategyConfig {
                stop_loss_pct: self.stop_loss,
                take_profit_pct: self.take_profit,
                trailing_stop_pct: self.trailing_stop,
                use_trailing_stop: !self.no_trailing_stop,
                volatility_threshold: self.volatility_threshold,
                max_daily_loss: self.max_daily_loss,
                max_daily_profit: self.max_daily_profit,
            },
        })
    }

    fn broker(&self) -> Result<Arc<BrokerClient>> {
        let client = BrokerClient::from_env()?.with_crypto_symbols(self.crypto_symbols.clone());
        Ok(Arc::new(client))
    }

    fn notifier(&self) -> Result<Arc<dyn NotificationSink>> {
        Ok(match &self.webhook_url {
            Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url.clone())?),
            _ => Arc::new(LogNotifier),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = cli.settings;

    match cli.command {
        Commands::Run {
            dry_run,
            paper_capital,
            paper_slippage,
        } => {
            let config = settings.bot_config(dry_run)?;
            let broker = settings.broker()?;
            let economic = Arc::new(BlsClient::new(settings.bls_api_key.clone())?);

            let paper = dry_run.then(|| {
                Arc::new(PaperGateway::new(
                    broker.clone(),
                    PaperConfig {
                        initial_capital: paper_capital,
                        slippage: paper_slippage,
                        ..Default::default()
                    },
                ))
            });
            let gateway: Arc<dyn ExecutionGateway> = match &paper {
                Some(p) => p.clone(),
                None => broker,
            };

            info!(
                symbols = config.watchlist.len(),
                interval = config.check_interval_secs,
                dry_run = dry_run,
                "Starting SmartTrader"
            );

            println!("\n=== SmartTrader ===");
            println!("Watchlist:  {}", config.watchlist.join(", "));
            println!("Interval:   {}s", config.check_interval_secs);
            println!("Session:    {} (crypto: {})", config.market_hours, config.crypto_symbols.join(", "));
            println!(
                "Indicators: {}",
                config
                    .indicators
                    .iter()
                    .map(|i| i.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("Mode:       {}", if dry_run { "DRY RUN (simulated fills)" } else { "LIVE TRADING" });
            println!("\nPress Ctrl+C to stop.\n");

            let bot = Bot::new(config, gateway, economic, settings.notifier()?);
            bot.initialize().await.context("Failed to initialize bot")?;

            let (handle, token) = shutdown_channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received shutdown signal, finishing current sweep");
                    handle.trigger();
                }
            });

            if let Err(e) = bot.run(token).await {
                error!(error = %e, "Bot error");
            }

            // Show final stats
            println!("\n{}", bot.get_stats().await);

            let positions = bot.positions().await;
            if !positions.is_empty() {
                println!("=== Open Positions (left open) ===");
                for pos in &positions {
                    println!(
                        "  {:<8} {} @ ${} (peak ${})",
                        pos.symbol, pos.quantity, pos.entry_price, pos.highest_price
                    );
                }
            }

            if let Some(paper) = paper {
                println!("\n{}", paper.stats().await);
            }
        }

        Commands::Analyze { symbol } => {
            let config = settings.bot_config(true)?;
            let broker = settings.broker()?;
            let economic = Arc::new(BlsClient::new(settings.bls_api_key.clone())?);

            let bot = Bot::new(config, broker, economic, Arc::new(LogNotifier));
            let analysis = bot.analyze_symbol(&symbol.to_uppercase()).await?;
            println!("\n{}", analysis);
        }

        Commands::Config => {
            let config = settings.bot_config(false)?;
            let trading = &config.trading_config;
            let strategy = &config.strategy_config;

            println!("\n=== Bot Configuration ===\n");
            println!("  Watchlist:            {}", config.watchlist.join(", "));
            println!("  Check Interval:       {}s", config.check_interval_secs);
            println!("  Symbol Timeout:       {}s", config.symbol_timeout_secs);
            println!("  Market Session:       {}", config.market_hours);
            println!("  Crypto Symbols:       {}", config.crypto_symbols.join(", "));
            println!(
                "  Indicators:           {}",
                config
                    .indicators
                    .iter()
                    .map(|i| i.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            println!("\n=== Trading Configuration ===\n");
            println!("Position Sizing:");
            println!("  Base Multiplier:      {}", trading.base_position_multiplier);
            println!("  Max Allocation:       {}%", trading.max_position_allocation * dec!(100));
            println!("  Min Order Quantity:   {}", trading.min_order_quantity);
            println!("  Min Order Notional:   ${}", trading.min_order_notional);
            println!("  Fractional:           {}", trading.allow_fractional);

            println!("\nData:");
            println!("  Min History Points:   {}", trading.min_history_points);
            println!("  Order Flow Baseline:  {}", trading.order_flow_baseline);
            println!("  Buying Power TTL:     {}s", trading.buying_power_ttl_secs);
            println!("  Order Flow TTL:       {}s", trading.order_flow_ttl_secs);
            println!("  Economic Risk TTL:    {}s", trading.economic_ttl_secs);

            println!("\n=== Strategy Configuration ===\n");
            println!("Entry Rules:");
            println!("  Volatility Threshold: {}", strategy.volatility_threshold);

            println!("\nExit Rules:");
            println!("  Take Profit:          {}%", strategy.take_profit_pct * dec!(100));
            println!("  Stop Loss:            {}%", strategy.stop_loss_pct * dec!(100));
            println!("  Trailing Stop:        {}%", strategy.trailing_stop_pct * dec!(100));
            println!("  Use Trailing Stop:    {}", strategy.use_trailing_stop);

            println!("\nDaily Limits:");
            println!("  Max Daily Loss:       ${}", strategy.max_daily_loss);
            println!("  Max Daily Profit:     ${}", strategy.max_daily_profit);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults_to_live_like_bot_config() {
        let cli = Cli::try_parse_from(["smarttrader", "run"]).unwrap();
        let Commands::Run { dry_run, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(dry_run, BotConfig::default().dry_run);

        let config = cli.settings.bot_config(dry_run).unwrap();
        assert_eq!(config.crypto_symbols, vec!["BTC", "ETH"]);
        assert_eq!(config.market_hours, MarketHours::default());
    }

    #[test]
    fn test_session_flags() {
        let cli = Cli::try_parse_from([
            "smarttrader",
            "--market-open",
            "04:00",
            "--market-close",
            "20:00",
            "config",
        ])
        .unwrap();
        let config = cli.settings.bot_config(false).unwrap();
        assert_eq!(config.market_hours.to_string(), "04:00-20:00 America/New_York");

        let inverted = Cli::try_parse_from([
            "smarttrader",
            "--market-open",
            "16:00",
            "--market-close",
            "09:30",
            "config",
        ])
        .unwrap();
        assert!(inverted.settings.bot_config(false).is_err());

        assert!(Cli::try_parse_from(["smarttrader", "--market-open", "9.30", "config"]).is_err());
    }
}
