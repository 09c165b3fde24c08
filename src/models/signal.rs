//! Signal votes, price series and per-cycle decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single indicator's opinion, or the fused result of several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalVote {
    Buy,
    Sell,
    Hold,
}

impl SignalVote {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalVote::Buy => "buy",
            SignalVote::Sell => "sell",
            SignalVote::Hold => "hold",
        }
    }
}

impl fmt::Display for SignalVote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chronological closing prices for one symbol.
///
/// Rebuilt from the gateway every cycle; oldest observation first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    closes: Vec<f64>,
}

impl PriceSeries {
    pub fn new(closes: Vec<f64>) -> Self {
        Self { closes }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    /// Most recent close.
    pub fn last(&self) -> Option<f64> {
        self.closes.last().copied()
    }
}

impl From<Vec<f64>> for PriceSeries {
    fn from(closes: Vec<f64>) -> Self {
        Self::new(closes)
    }
}

/// Output of one evaluation cycle for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub action: SignalVote,
    /// Scales the buying-power allocation for a Buy; always >= 0.
    pub size_multiplier: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_keeps_chronological_order() {
        let series = PriceSeries::from(vec![1.0, 2.0, 3.0]);
        assert_eq!(series.len(), 3);
        assert_eq!(series.closes(), &[1.0, 2.0, 3.0]);
        assert_eq!(series.last(), Some(3.0));
        assert_eq!(PriceSeries::default().last(), None);
    }
}
