//! Order intents emitted by the orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A market order the orchestrator wants placed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIntent {
    /// Client reference id, unique per intent
    pub ref_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Price the decision was made at
    pub reference_price: Decimal,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        reference_price: Decimal,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            ref_id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            quantity,
            reference_price,
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}
