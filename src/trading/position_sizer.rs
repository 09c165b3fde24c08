//! Converts buying power and a size multiplier into an order quantity.

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use super::strategy::EntryValidation;
use super::TradingConfig;

/// Calculator for entry quantities.
pub struct PositionSizer {
    config: TradingConfig,
}

impl PositionSizer {
    pub fn new(config: TradingConfig) -> Self {
        Self { config }
    }

    /// Round a raw quantity down to what can be ordered.
    fn round_quantity(&self, raw: Decimal, fractional: bool) -> Decimal {
        if fractional {
            raw.round_dp_with_strategy(self.config.fractional_precision, RoundingStrategy::ToZero)
        } else {
            raw.floor()
        }
    }

    /// Quantity to buy at `price` with `multiplier` applied to the allocation.
    ///
    /// The quantity never costs more than the available buying power. Denied
    /// when the result falls below the minimum quantity or notional.
    pub fn quantity(&self, buying_power: Decimal, price: Decimal, multiplier: f64) -> EntryValidation {
        self.size(buying_power, price, multiplier, self.config.allow_fractional)
    }

    /// Sizing for instruments traded in fractions, such as crypto pairs.
    /// Only the notional floor applies.
    pub fn fractional_quantity(&self, buying_power: Decimal, price: Decimal, multiplier: f64) -> EntryValidation {
        self.size(buying_power, price, multiplier, true)
    }

    fn size(&self, buying_power: Decimal, price: Decimal, multiplier: f64, fractional: bool) -> EntryValidation {
        if price <= Decimal::ZERO {
            return EntryValidation::deny(format!("Invalid price: {}", price));
        }
        if buying_power <= Decimal::ZERO {
            return EntryValidation::deny("No buying power");
        }

        let multiplier = match Decimal::try_from(multiplier) {
            Ok(m) if m > Decimal::ZERO => m,
            _ => return EntryValidation::deny(format!("Invalid size multiplier: {}", multiplier)),
        };

        let budget = buying_power * self.config.max_position_allocation * multiplier;
        let affordable = self.round_quantity(buying_power / price, fractional);
        let quantity = self.round_quantity(budget / price, fractional).min(affordable);
        let notional = quantity * price;

        debug!(
            buying_power = %buying_power,
            price = %price,
            multiplier = %multiplier.round_dp(4),
            quantity = %quantity,
            "Sized entry"
        );

        if quantity <= Decimal::ZERO || (!fractional && quantity < self.config.min_order_quantity) {
            return EntryValidation::deny(format!(
                "Quantity too small: {} < {}",
                quantity, self.config.min_order_quantity
            ));
        }
        if notional < self.config.min_order_notional {
            return EntryValidation::deny(format!(
                "Notional too small: {:.2} < {}",
                notional, self.config.min_order_notional
            ));
        }

        EntryValidation::allow(quantity)
    }
}
