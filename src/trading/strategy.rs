//! Entry gate and exit rules.
//!
//! This module defines:
//! - When to enter a position (fused Buy passing the sentiment, volatility
//!   and order-flow gate)
//! - When to exit a position (take profit, stop loss, trailing stop, signal)
//! - Daily realized P&L limits

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{Decision, OrderFlowSnapshot, Position, SentimentSnapshot, SignalVote};
use crate::sentiment::size_multiplier;

/// Trading strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    // === Exit Rules ===
    /// Stop loss percentage (e.g., 0.02 = 2% below entry)
    pub stop_loss_pct: Decimal,

    /// Take profit percentage (e.g., 0.03 = 3% above entry)
    pub take_profit_pct: Decimal,

    /// Trailing stop distance from the peak (e.g., 0.015 = 1.5%)
    pub trailing_stop_pct: Decimal,

    /// Enable the trailing stop
    pub use_trailing_stop: bool,

    // === Entry Rules ===
    /// Entries require volatility strictly below this
    pub volatility_threshold: f64,

    // === Daily Limits ===
    /// Halt entries once realized loss for the day reaches this
    pub max_daily_loss: Decimal,

    /// Halt entries once realized profit for the day reaches this
    pub max_daily_profit: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: dec!(0.02),        // 2% stop loss
            take_profit_pct: dec!(0.03),      // 3% profit target
            trailing_stop_pct: dec!(0.015),   // 1.5% below peak
            use_trailing_stop: true,
            volatility_threshold: 0.02,
            max_daily_loss: dec!(500),
            max_daily_profit: dec!(500),
        }
    }
}

/// Result of entry validation.
#[derive(Debug, Clone)]
pub struct EntryValidation {
    pub allowed: bool,
    pub reason: String,
    pub adjusted_size: Option<Decimal>,
}

impl EntryValidation {
    pub fn allow(size: Decimal) -> Self {
        Self {
            allowed: true,
            reason: "Entry conditions met".to_string(),
            adjusted_size: Some(size),
        }
    }

    /// Allowed with no size attached yet.
    pub fn pass() -> Self {
        Self {
            allowed: true,
            reason: "Entry conditions met".to_string(),
            adjusted_size: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            adjusted_size: None,
        }
    }
}

/// Reason for exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    SignalSell,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::SignalSell => "signal_sell",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit signal with reason.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub reason: ExitReason,
    /// Full held quantity
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Inputs the entry gate looks at for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct GateInputs<'a> {
    pub fused: SignalVote,
    pub sentiment: &'a SentimentSnapshot,
    pub order_flow: &'a OrderFlowSnapshot,
}

/// Trading strategy engine.
pub struct Strategy {
    config: StrategyConfig,
    order_flow_baseline: f64,
    base_multiplier: f64,
}

impl Strategy {
    pub fn new(config: StrategyConfig, order_flow_baseline: f64, base_multiplier: f64) -> Self {
        Self {
            config,
            order_flow_baseline,
            base_multiplier,
        }
    }

    // ==================== Entry ====================

    /// Check the buy gate.
    ///
    /// Every condition must hold: fused vote is Buy, rescaled sentiment
    /// `(s + 2) / 4` is at least 0.5, volatility is below the threshold and
    /// order-flow sentiment is above the baseline.
    pub fn validate_entry(&self, inputs: GateInputs<'_>) -> EntryValidation {
        if inputs.fused != SignalVote::Buy {
            return EntryValidation::deny(format!("Fused signal is {}", inputs.fused));
        }

        let rescaled = (inputs.sentiment.sentiment + 2.0) / 4.0;
        if rescaled < 0.5 {
            return EntryValidation::deny(format!("Sentiment too weak: {:.3} < 0.5", rescaled));
        }

        if inputs.sentiment.volatility >= self.config.volatility_threshold {
            return EntryValidation::deny(format!(
                "Volatility too high: {:.4} >= {}",
                inputs.sentiment.volatility, self.config.volatility_threshold
            ));
        }

        if inputs.order_flow.sentiment <= self.order_flow_baseline {
            return EntryValidation::deny(format!(
                "Order flow not bullish: {:.2} <= {}",
                inputs.order_flow.sentiment, self.order_flow_baseline
            ));
        }

        EntryValidation::pass()
    }

    /// Position-size multiplier for this cycle's inputs.
    pub fn size_multiplier(&self, sentiment: &SentimentSnapshot, order_flow: &OrderFlowSnapshot) -> f64 {
        let base = size_multiplier(self.base_multiplier, sentiment.volatility, sentiment.risk_level);
        base * (0.5 + order_flow.strength)
    }

    /// Pure per-cycle decision.
    ///
    /// Buy when the gate passes, Sell when the fused vote is Sell, Hold
    /// otherwise. The multiplier is computed regardless of the action.
    pub fn decide(&self, inputs: GateInputs<'_>) -> (Decision, EntryValidation) {
        let multiplier = self.size_multiplier(inputs.sentiment, inputs.order_flow);
        let gate = self.validate_entry(inputs);

        let action = if gate.allowed {
            SignalVote::Buy
        } else if inputs.fused == SignalVote::Sell {
            SignalVote::Sell
        } else {
            SignalVote::Hold
        };

        let decision = Decision {
            action,
            size_multiplier: multiplier,
        };
        (decision, gate)
    }

    // ==================== Exit ====================

    /// Check whether a position must exit at `price`.
    ///
    /// The caller updates the peak first. Checks run in priority order:
    /// take profit, stop loss, trailing stop, then an external Sell.
    pub fn check_exit(&self, position: &Position, price: Decimal, sell_signal: bool) -> Option<ExitSignal> {
        let entry = position.entry_price;
        let exit = |reason| {
            Some(ExitSignal {
                reason,
                quantity: position.quantity,
                price,
            })
        };

        if price >= entry * (Decimal::ONE + self.config.take_profit_pct) {
            info!(
                symbol = %position.symbol,
                entry = %entry,
                price = %price,
                target = %self.config.take_profit_pct,
                "Take profit triggered"
            );
            return exit(ExitReason::TakeProfit);
        }

        if price <= entry * (Decimal::ONE - self.config.stop_loss_pct) {
            warn!(
                symbol = %position.symbol,
                entry = %entry,
                price = %price,
                stop = %self.config.stop_loss_pct,
                "Stop loss triggered"
            );
            return exit(ExitReason::StopLoss);
        }

        if self.config.use_trailing_stop
            && price <= position.highest_price * (Decimal::ONE - self.config.trailing_stop_pct)
        {
            info!(
                symbol = %position.symbol,
                peak = %position.highest_price,
                price = %price,
                trail = %self.config.trailing_stop_pct,
                "Trailing stop triggered"
            );
            return exit(ExitReason::TrailingStop);
        }

        if sell_signal {
            debug!(symbol = %position.symbol, price = %price, "Sell signal on open position");
            return exit(ExitReason::SignalSell);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;

    fn strategy() -> Strategy {
        Strategy::new(StrategyConfig::default(), 0.5, 1.0)
    }

    fn sentiment(value: f64, volatility: f64) -> SentimentSnapshot {
        SentimentSnapshot {
            sentiment: value,
            risk_level: RiskLevel::Low,
            volatility,
            sector: None,
            sector_sensitivity: 0.5,
        }
    }

    fn flow(value: f64) -> OrderFlowSnapshot {
        OrderFlowSnapshot {
            call_volume: 0.0,
            put_volume: 0.0,
            put_call_ratio: 1.0,
            buy_volume: 0.0,
            sell_volume: 0.0,
            buy_sell_ratio: 1.0,
            volume_trend: 0.0,
            sentiment: value,
            strength: (value - 0.5).abs() * 2.0,
        }
    }

    fn position(entry: Decimal) -> Position {
        Position::new("TSLA".to_string(), entry, dec!(10))
    }

    #[test]
    fn test_gate_passes() {
        let s = sentiment(0.6, 0.01);
        let f = flow(0.75);
        let (decision, gate) = strategy().decide(GateInputs {
            fused: SignalVote::Buy,
            sentiment: &s,
            order_flow: &f,
        });

        assert!(gate.allowed);
        assert_eq!(decision.action, SignalVote::Buy);
        // (1 - 0.02) * 1.0 * (0.5 + 0.5)
        assert!((decision.size_multiplier - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_gate_denials() {
        let strategy = strategy();
        let calm = sentiment(0.6, 0.01);
        let bullish = flow(0.75);

        let gate = |fused, s: &SentimentSnapshot, f: &OrderFlowSnapshot| {
            strategy.validate_entry(GateInputs {
                fused,
                sentiment: s,
                order_flow: f,
            })
        };

        assert!(!gate(SignalVote::Hold, &calm, &bullish).allowed);
        assert!(gate(SignalVote::Buy, &sentiment(0.6, 0.02), &bullish)
            .reason
            .contains("Volatility"));
        assert!(gate(SignalVote::Buy, &calm, &flow(0.5)).reason.contains("Order flow"));
        // Sentiment in [0, 1] always clears the rescaled threshold
        assert!(gate(SignalVote::Buy, &sentiment(0.0, 0.01), &bullish).allowed);
    }

    #[test]
    fn test_decide_sell_and_hold() {
        let s = sentiment(0.6, 0.5);
        let f = flow(0.25);
        let strategy = strategy();

        let (sell, _) = strategy.decide(GateInputs {
            fused: SignalVote::Sell,
            sentiment: &s,
            order_flow: &f,
        });
        assert_eq!(sell.action, SignalVote::Sell);
        assert!(sell.size_multiplier > 0.0);

        // Fused Buy blocked by the gate holds
        let (hold, gate) = strategy.decide(GateInputs {
            fused: SignalVote::Buy,
            sentiment: &s,
            order_flow: &f,
        });
        assert_eq!(hold.action, SignalVote::Hold);
        assert!(!gate.allowed);
    }

    #[test]
    fn test_decide_is_idempotent() {
        let s = sentiment(0.4, 0.01);
        let f = flow(0.75);
        let strategy = strategy();
        let inputs = GateInputs {
            fused: SignalVote::Buy,
            sentiment: &s,
            order_flow: &f,
        };

        assert_eq!(strategy.decide(inputs).0, strategy.decide(inputs).0);
    }

    #[test]
    fn test_take_profit() {
        let signal = strategy().check_exit(&position(dec!(100)), dec!(103), false).unwrap();
        assert_eq!(signal.reason, ExitReason::TakeProfit);
        assert_eq!(signal.quantity, dec!(10));
    }

    #[test]
    fn test_stop_loss() {
        let signal = strategy().check_exit(&position(dec!(100)), dec!(98), false).unwrap();
        assert_eq!(signal.reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_take_profit_wins_over_stop_loss() {
        // Inverted thresholds make both conditions true at once
        let strategy = Strategy::new(
            StrategyConfig {
                take_profit_pct: dec!(-0.10),
                stop_loss_pct: dec!(-0.10),
                ..Default::default()
            },
            0.5,
            1.0,
        );
        let signal = strategy.check_exit(&position(dec!(100)), dec!(100), true).unwrap();
        assert_eq!(signal.reason, ExitReason::TakeProfit);
    }

    #[test]
    fn test_trailing_stop_from_peak() {
        // Target far enough away that only the trail can fire
        let strategy = Strategy::new(
            StrategyConfig {
                take_profit_pct: dec!(0.5),
                ..Default::default()
            },
            0.5,
            1.0,
        );
        let mut pos = position(dec!(50));
        pos.observe(dec!(55));

        // 55 * 0.985 = 54.175
        assert_eq!(
            strategy.check_exit(&pos, dec!(54.10), false).map(|s| s.reason),
            Some(ExitReason::TrailingStop)
        );
        assert_eq!(strategy.check_exit(&pos, dec!(54.20), false), None);
    }

    #[test]
    fn test_trailing_stop_disabled() {
        let strategy = Strategy::new(
            StrategyConfig {
                use_trailing_stop: false,
                take_profit_pct: dec!(0.5),
                ..Default::default()
            },
            0.5,
            1.0,
        );
        let mut pos = position(dec!(50));
        pos.observe(dec!(55));
        assert_eq!(strategy.check_exit(&pos, dec!(54.10), false), None);
    }

    #[test]
    fn test_signal_sell_is_last() {
        let strategy = strategy();
        let pos = position(dec!(100));
        assert_eq!(
            strategy.check_exit(&pos, dec!(100.5), true).map(|s| s.reason),
            Some(ExitReason::SignalSell)
        );
        assert_eq!(strategy.check_exit(&pos, dec!(100.5), false), None);
    }
}
