//! Trading logic: entry gate, exit rules, sizing, position table, daily
//! limits and the equity session.

mod config;
mod daily_limits;
mod market_hours;
mod position_manager;
mod position_sizer;
mod strategy;

pub use config::TradingConfig;
pub use daily_limits::DailyPnlGuard;
pub use market_hours::{parse_session_time, parse_timezone, MarketHours};
pub use position_manager::PositionRiskManager;
pub use position_sizer::PositionSizer;
pub use strategy::{ExitReason, ExitSignal, GateInputs, Strategy, StrategyConfig};
