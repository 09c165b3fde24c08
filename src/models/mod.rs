//! Data models for price series, signals, sentiment, positions, and orders.

mod market;
mod order;
mod position;
mod signal;

pub use market::{
    EconomicRisk, IndicatorChange, MacroIndicator, OrderFlowSnapshot, RiskLevel,
    SentimentSnapshot,
};
pub use order::{OrderIntent, OrderSide};
pub use position::Position;
pub use signal::{Decision, PriceSeries, SignalVote};
