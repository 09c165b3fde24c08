//! Open-position table and forced-exit evaluation.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::Position;

use super::strategy::{ExitSignal, Strategy};

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("position already open in {0}")]
    AlreadyOpen(String),

    #[error("no open position in {0}")]
    NotOpen(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(Decimal),

    #[error("invalid price: {0}")]
    InvalidPrice(Decimal),
}

/// Owns every open position; at most one per symbol.
pub struct PositionRiskManager {
    strategy: Arc<Strategy>,
    positions: HashMap<String, Position>,
}

impl PositionRiskManager {
    pub fn new(strategy: Arc<Strategy>) -> Self {
        Self {
            strategy,
            positions: HashMap::new(),
        }
    }

    fn key(symbol: &str) -> String {
        symbol.to_uppercase()
    }

    /// Open a position after a confirmed buy.
    pub fn open(&mut self, symbol: &str, entry_price: Decimal, quantity: Decimal) -> Result<Position, PositionError> {
        self.adopt(Position::new(Self::key(symbol), entry_price, quantity))
    }

    /// Track an existing position, e.g. one found at the broker on startup.
    pub fn adopt(&mut self, mut position: Position) -> Result<Position, PositionError> {
        if position.entry_price <= Decimal::ZERO {
            return Err(PositionError::InvalidPrice(position.entry_price));
        }
        if position.quantity <= Decimal::ZERO {
            return Err(PositionError::InvalidQuantity(position.quantity));
        }

        position.symbol = Self::key(&position.symbol);
        if position.highest_price < position.entry_price {
            position.highest_price = position.entry_price;
        }
        if self.positions.contains_key(&position.symbol) {
            return Err(PositionError::AlreadyOpen(position.symbol));
        }

        info!(
            symbol = %position.symbol,
            entry = %position.entry_price,
            quantity = %position.quantity,
            "Position opened"
        );
        self.positions.insert(position.symbol.clone(), position.clone());
        Ok(position)
    }

    /// Record a price and check whether the position must exit.
    ///
    /// The peak is raised before any rule is checked. Returns `None` when
    /// flat or when nothing fires.
    pub fn evaluate(&mut self, symbol: &str, price: Decimal, sell_signal: bool) -> Option<ExitSignal> {
        let position = self.positions.get_mut(&Self::key(symbol))?;
        position.observe(price);

        debug!(
            symbol = %position.symbol,
            price = %price,
            peak = %position.highest_price,
            pnl = %position.pnl_at(price).round_dp(2),
            "Position checked"
        );

        self.strategy.check_exit(position, price, sell_signal)
    }

    /// Remove a position after a confirmed sell.
    pub fn close(&mut self, symbol: &str) -> Result<Position, PositionError> {
        let key = Self::key(symbol);
        self.positions
            .remove(&key)
            .ok_or(PositionError::NotOpen(key))
    }

    #[cfg(test)]
    pub fn get(&self, symbol: &str) -> Option<Position> {
        self.positions.get(&Self::key(symbol)).cloned()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(&Self::key(symbol))
    }

    /// Copy of every open position, ordered by symbol.
    pub fn snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::{ExitReason, StrategyConfig};
    use rust_decimal_macros::dec;

    fn manager() -> PositionRiskManager {
        let config = StrategyConfig {
            take_profit_pct: dec!(0.5),
            ..Default::default()
        };
        PositionRiskManager::new(Arc::new(Strategy::new(config, 0.5, 1.0)))
    }

    #[test]
    fn test_second_open_is_rejected() {
        let mut mgr = manager();
        mgr.open("tsla", dec!(200), dec!(5)).unwrap();

        assert_eq!(
            mgr.open("TSLA", dec!(210), dec!(3)),
            Err(PositionError::AlreadyOpen("TSLA".to_string()))
        );
        let pos = mgr.get("TSLA").unwrap();
        assert_eq!(pos.entry_price, dec!(200));
        assert_eq!(pos.quantity, dec!(5));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_invalid_open() {
        let mut mgr = manager();
        assert!(matches!(mgr.open("A", dec!(0), dec!(1)), Err(PositionError::InvalidPrice(_))));
        assert!(matches!(mgr.open("A", dec!(10), dec!(0)), Err(PositionError::InvalidQuantity(_))));
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_trailing_scenario() {
        let mut mgr = manager();
        mgr.open("ETH", dec!(50), dec!(2)).unwrap();

        for price in [dec!(52), dec!(55), dec!(54.5)] {
            assert!(mgr.evaluate("ETH", price, false).is_none());
        }
        assert_eq!(mgr.get("ETH").unwrap().highest_price, dec!(55));

        assert!(mgr.evaluate("ETH", dec!(54.20), false).is_none());
        let exit = mgr.evaluate("ETH", dec!(54.10), false).unwrap();
        assert_eq!(exit.reason, ExitReason::TrailingStop);
        assert_eq!(exit.quantity, dec!(2));

        // Evaluation alone does not close
        assert!(mgr.has_position("ETH"));
        mgr.close("ETH").unwrap();
        assert!(!mgr.has_position("ETH"));
    }

    #[test]
    fn test_peak_updated_before_rules() {
        let mut mgr = manager();
        mgr.open("MSFT", dec!(100), dec!(1)).unwrap();

        // A new high can never trip the trailing stop on the same tick
        assert!(mgr.evaluate("MSFT", dec!(120), false).is_none());
        assert_eq!(mgr.get("MSFT").unwrap().highest_price, dec!(120));
    }

    #[test]
    fn test_flat_symbol_and_close() {
        let mut mgr = manager();
        assert!(mgr.evaluate("GOOGL", dec!(100), true).is_none());
        assert_eq!(mgr.close("GOOGL"), Err(PositionError::NotOpen("GOOGL".to_string())));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut mgr = manager();
        mgr.open("b", dec!(10), dec!(1)).unwrap();
        mgr.open("a", dec!(10), dec!(1)).unwrap();

        let snapshot = mgr.snapshot();
        assert_eq!(snapshot[0].symbol, "A");
        mgr.evaluate("A", dec!(12), false);
        assert_eq!(snapshot[0].highest_price, dec!(10));
    }
}
