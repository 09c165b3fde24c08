//! Trading configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configuration for position sizing, order floors and data freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Base multiplier fed into the volatility/risk size adjustment
    pub base_position_multiplier: f64,

    /// Order-flow sentiment must exceed this to enter
    pub order_flow_baseline: f64,

    /// Share of buying power a single entry may use before the multiplier
    pub max_position_allocation: Decimal,

    /// Smallest whole-unit quantity worth ordering
    pub min_order_quantity: Decimal,

    /// Smallest notional worth ordering
    pub min_order_notional: Decimal,

    /// Allow fractional quantities for every symbol; crypto pairs always
    /// size in fractions
    pub allow_fractional: bool,

    /// Decimal places kept for fractional quantities
    pub fractional_precision: u32,

    /// Fewer closes than this skips the symbol for the cycle
    pub min_history_points: usize,

    /// Freshness of the cached account profile
    pub buying_power_ttl_secs: u64,

    /// Freshness of cached order-flow snapshots
    pub order_flow_ttl_secs: u64,

    /// Freshness of the cached economic-risk classification
    pub economic_ttl_secs: u64,
}

impl TradingConfig {
    pub fn buying_power_ttl(&self) -> Duration {
        Duration::from_secs(self.buying_power_ttl_secs)
    }

    pub fn order_flow_ttl(&self) -> Duration {
        Duration::from_secs(self.order_flow_ttl_secs)
    }

    pub fn economic_ttl(&self) -> Duration {
        Duration::from_secs(self.economic_ttl_secs)
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            base_position_multiplier: 1.0,
            order_flow_baseline: 0.5,
            max_position_allocation: dec!(1.0),   // All buying power, scaled by the multiplier
            min_order_quantity: dec!(1),
            min_order_notional: dec!(1.0),        // Min $1
            allow_fractional: false,
            fractional_precision: 6,
            min_history_points: 20,
            buying_power_ttl_secs: 1,
            order_flow_ttl_secs: 300,             // 5 minutes
            economic_ttl_secs: 3600,              // 1 hour
        }
    }
}
