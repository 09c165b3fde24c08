//! Macro, sentiment and order-flow snapshots.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Macro risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Position-size factor applied on top of the volatility factor.
    pub fn size_factor(&self) -> f64 {
        match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Medium => 0.7,
            RiskLevel::High => 0.5,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// The macro series tracked for economic risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MacroIndicator {
    Cpi,
    Unemployment,
    Payrolls,
    Wages,
    JoblessClaims,
    Ppi,
    EmploymentCost,
}

impl MacroIndicator {
    pub const ALL: [MacroIndicator; 7] = [
        MacroIndicator::Cpi,
        MacroIndicator::Unemployment,
        MacroIndicator::Payrolls,
        MacroIndicator::Wages,
        MacroIndicator::JoblessClaims,
        MacroIndicator::Ppi,
        MacroIndicator::EmploymentCost,
    ];

    /// Provider series identifier.
    pub fn series_id(&self) -> &'static str {
        match self {
            MacroIndicator::Cpi => "CUSR0000SA0",
            MacroIndicator::Unemployment => "LNS14000000",
            MacroIndicator::Payrolls => "CES0000000001",
            MacroIndicator::Wages => "CES0500000003",
            MacroIndicator::JoblessClaims => "ICSA",
            MacroIndicator::Ppi => "WPUFD4",
            MacroIndicator::EmploymentCost => "CIU1010000000000A",
        }
    }

    /// Whether a percent change in this series counts as a risk factor.
    pub fn is_risk_factor(&self, change_pct: f64) -> bool {
        match self {
            MacroIndicator::Cpi => change_pct > 2.0,
            MacroIndicator::Unemployment => change_pct > 0.0,
            MacroIndicator::Payrolls => change_pct < 0.0,
            MacroIndicator::Wages => change_pct < 0.0,
            MacroIndicator::JoblessClaims => change_pct > 5.0,
            MacroIndicator::Ppi => change_pct > 2.0,
            MacroIndicator::EmploymentCost => false,
        }
    }
}

impl fmt::Display for MacroIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MacroIndicator::Cpi => "CPI",
            MacroIndicator::Unemployment => "UNEMPLOYMENT",
            MacroIndicator::Payrolls => "PAYROLLS",
            MacroIndicator::Wages => "WAGES",
            MacroIndicator::JoblessClaims => "JOBLESS_CLAIMS",
            MacroIndicator::Ppi => "PPI",
            MacroIndicator::EmploymentCost => "EMPLOYMENT_COST",
        };
        f.write_str(s)
    }
}

/// Latest vs. previous observation for one macro series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorChange {
    pub latest: f64,
    pub previous: f64,
    /// Percent change, e.g. 2.5 for +2.5%.
    pub change_pct: f64,
}

/// Economy-wide risk classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EconomicRisk {
    pub risk_level: RiskLevel,
    /// 1 - risk_factors / total, in [0, 1].
    pub sentiment: f64,
    pub risk_factors: usize,
    pub conditions: BTreeMap<MacroIndicator, IndicatorChange>,
}

impl EconomicRisk {
    /// Used when no macro data could be fetched at all.
    pub fn neutral() -> Self {
        Self {
            risk_level: RiskLevel::Medium,
            sentiment: 0.5,
            risk_factors: 0,
            conditions: BTreeMap::new(),
        }
    }
}

/// Per-symbol sentiment for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentSnapshot {
    /// Economic sentiment scaled by sector sensitivity, in [0, 1].
    pub sentiment: f64,
    pub risk_level: RiskLevel,
    pub volatility: f64,
    pub sector: Option<String>,
    pub sector_sensitivity: f64,
}

/// Estimated buy/sell pressure for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderFlowSnapshot {
    pub call_volume: f64,
    pub put_volume: f64,
    pub put_call_ratio: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub buy_sell_ratio: f64,
    pub volume_trend: f64,
    /// Share of bullish checks, in [0, 1].
    pub sentiment: f64,
    /// Distance from neutral, in [0, 1].
    pub strength: f64,
}

impl fmt::Display for OrderFlowSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "put/call {:.2} | buy/sell {:.2} | volume trend {:+.2} | sentiment {:.2} | strength {:.2}",
            self.put_call_ratio, self.buy_sell_ratio, self.volume_trend, self.sentiment, self.strength
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_factor_rules() {
        assert!(MacroIndicator::Cpi.is_risk_factor(2.1));
        assert!(!MacroIndicator::Cpi.is_risk_factor(2.0));
        assert!(MacroIndicator::Unemployment.is_risk_factor(0.1));
        assert!(MacroIndicator::Payrolls.is_risk_factor(-0.1));
        assert!(MacroIndicator::JoblessClaims.is_risk_factor(5.5));
        assert!(!MacroIndicator::JoblessClaims.is_risk_factor(4.0));
        assert!(!MacroIndicator::EmploymentCost.is_risk_factor(50.0));
    }
}
