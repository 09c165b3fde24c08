//! Technical indicators that each cast a Buy/Sell/Hold vote.
//!
//! Every indicator takes the chronological close sequence and returns Hold
//! until it has a full window of history.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::SignalVote;

pub const SMA_SHORT_WINDOW: usize = 10;
pub const SMA_LONG_WINDOW: usize = 50;
pub const RSI_PERIOD: usize = 14;
pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const MACD_SHORT: usize = 12;
pub const MACD_LONG: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_WIDTH: f64 = 2.0;
pub const STOCHASTIC_PERIOD: usize = 14;

/// Guards RSI against division by zero on a gain-only window.
const RSI_EPSILON: f64 = 1e-10;

/// Available technical indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    Momentum,
    SmaCross,
    Rsi,
    Macd,
    Bollinger,
    Stochastic,
}

impl Indicator {
    /// The default voting set.
    pub const CORE: [Indicator; 4] = [
        Indicator::Momentum,
        Indicator::SmaCross,
        Indicator::Rsi,
        Indicator::Macd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Indicator::Momentum => "momentum",
            Indicator::SmaCross => "sma_cross",
            Indicator::Rsi => "rsi",
            Indicator::Macd => "macd",
            Indicator::Bollinger => "bollinger",
            Indicator::Stochastic => "stochastic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "momentum" => Some(Self::Momentum),
            "sma" | "sma_cross" => Some(Self::SmaCross),
            "rsi" => Some(Self::Rsi),
            "macd" => Some(Self::Macd),
            "bollinger" | "bb" => Some(Self::Bollinger),
            "stochastic" | "stoch" => Some(Self::Stochastic),
            _ => None,
        }
    }

    /// Cast this indicator's vote on a close sequence.
    pub fn evaluate(&self, closes: &[f64]) -> SignalVote {
        match self {
            Indicator::Momentum => momentum(closes),
            Indicator::SmaCross => sma_cross(closes, SMA_SHORT_WINDOW, SMA_LONG_WINDOW),
            Indicator::Rsi => rsi(closes, RSI_PERIOD),
            Indicator::Macd => macd(closes),
            Indicator::Bollinger => bollinger(closes, BOLLINGER_PERIOD),
            Indicator::Stochastic => stochastic(closes, STOCHASTIC_PERIOD),
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn tail(closes: &[f64], n: usize) -> &[f64] {
    &closes[closes.len().saturating_sub(n)..]
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn compare(fast: f64, slow: f64) -> SignalVote {
    if fast > slow {
        SignalVote::Buy
    } else if fast < slow {
        SignalVote::Sell
    } else {
        SignalVote::Hold
    }
}

/// Three strictly rising closes buy, three strictly falling closes sell.
pub fn momentum(closes: &[f64]) -> SignalVote {
    let [a, b, c] = match tail(closes, 3) {
        [a, b, c] => [*a, *b, *c],
        _ => return SignalVote::Hold,
    };

    if c > b && b > a {
        SignalVote::Buy
    } else if c < b && b < a {
        SignalVote::Sell
    } else {
        SignalVote::Hold
    }
}

/// Short simple moving average against the long one.
pub fn sma_cross(closes: &[f64], short_window: usize, long_window: usize) -> SignalVote {
    if closes.is_empty() || closes.len() < long_window {
        return SignalVote::Hold;
    }
    let short = mean(tail(closes, short_window));
    let long = mean(tail(closes, long_window));
    compare(short, long)
}

/// Relative strength index over the last `period` deltas; `None` until
/// `period + 1` closes exist.
pub fn rsi_value(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }
    let window = tail(closes, period + 1);
    let deltas = period as f64;
    let (gain, loss) = window
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((0.0, 0.0), |(g, l), delta| {
            (g + delta.max(0.0), l + (-delta).max(0.0))
        });

    let avg_gain = gain / deltas;
    let avg_loss = loss / deltas;
    let rs = avg_gain / (avg_loss + RSI_EPSILON);
    Some(100.0 - 100.0 / (1.0 + rs))
}

pub fn rsi(closes: &[f64], period: usize) -> SignalVote {
    match rsi_value(closes, period) {
        Some(value) if value < RSI_OVERSOLD => SignalVote::Buy,
        Some(value) if value > RSI_OVERBOUGHT => SignalVote::Sell,
        _ => SignalVote::Hold,
    }
}

/// Mean-based MACD proxy: (mean12 - mean26) against mean9.
pub fn macd(closes: &[f64]) -> SignalVote {
    if closes.len() < MACD_LONG {
        return SignalVote::Hold;
    }
    let short = mean(tail(closes, MACD_SHORT));
    let long = mean(tail(closes, MACD_LONG));
    let signal = mean(tail(closes, MACD_SIGNAL));
    compare(short - long, signal)
}

/// Close at or beyond a 2-sigma band.
pub fn bollinger(closes: &[f64], period: usize) -> SignalVote {
    if closes.len() < period {
        return SignalVote::Hold;
    }
    let window = tail(closes, period);
    let sma = mean(window);
    let variance = window.iter().map(|p| (p - sma).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let lower = sma - BOLLINGER_WIDTH * std_dev;
    let upper = sma + BOLLINGER_WIDTH * std_dev;
    let last = window[window.len() - 1];

    if last <= lower {
        SignalVote::Buy
    } else if last >= upper {
        SignalVote::Sell
    } else {
        SignalVote::Hold
    }
}

/// Stochastic %K of the last close within the trailing range.
pub fn stochastic(closes: &[f64], period: usize) -> SignalVote {
    if closes.len() < period {
        return SignalVote::Hold;
    }
    let window = tail(closes, period);
    let high = window.iter().copied().fold(f64::MIN, f64::max);
    let low = window.iter().copied().fold(f64::MAX, f64::min);
    let last = window[window.len() - 1];

    let percent_k = if high != low {
        100.0 * (last - low) / (high - low)
    } else {
        50.0
    };

    if percent_k < 20.0 {
        SignalVote::Buy
    } else if percent_k > 80.0 {
        SignalVote::Sell
    } else {
        SignalVote::Hold
    }
}
