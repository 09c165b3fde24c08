//! An open position tracked by the risk manager.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Open long position in one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,

    /// Fill price of the entry
    pub entry_price: Decimal,

    /// Units held, always > 0 while open
    pub quantity: Decimal,

    pub entry_time: DateTime<Utc>,

    /// Peak observed price since entry, never decreases
    pub highest_price: Decimal,
}

impl Position {
    /// Create a new position; the peak starts at the entry price.
    pub fn new(symbol: String, entry_price: Decimal, quantity: Decimal) -> Self {
        Self {
            symbol,
            entry_price,
            quantity,
            entry_time: Utc::now(),
            highest_price: entry_price,
        }
    }

    /// Record a price observation, raising the peak if needed.
    pub fn observe(&mut self, price: Decimal) {
        if price > self.highest_price {
            self.highest_price = price;
        }
    }

    /// Unrealized P&L at a given price.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.quantity
    }

    /// Return relative to entry at a given price.
    pub fn return_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.entry_price) / self.entry_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_pnl() {
        let pos = Position::new("TSLA".to_string(), dec!(200), dec!(5));

        assert_eq!(pos.pnl_at(dec!(210)), dec!(50));
        assert_eq!(pos.return_pct(dec!(210)), dec!(0.05));
    }

    #[test]
    fn test_peak_never_falls() {
        let mut pos = Position::new("ETH".to_string(), dec!(100), dec!(1));

        pos.observe(dec!(120));
        pos.observe(dec!(90));
        assert_eq!(pos.highest_price, dec!(120));
    }
}
