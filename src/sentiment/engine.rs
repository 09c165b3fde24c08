//! Blends macro risk, sector sensitivity and price volatility.

use std::sync::Arc;
use std::time::Duration;

use statrs::statistics::Statistics;
use tracing::{debug, warn};

use super::economic;
use crate::api::{EconomicDataProvider, ExecutionGateway};
use crate::cache::TtlCache;
use crate::models::{EconomicRisk, RiskLevel, SentimentSnapshot};

/// Floor on the size multiplier relative to `base`.
const MIN_SIZE_FACTOR: f64 = 0.2;
const UNKNOWN_SECTOR_SENSITIVITY: f64 = 0.5;

/// How strongly a sector follows the macro picture.
pub fn sector_sensitivity(sector: Option<&str>) -> f64 {
    let Some(sector) = sector else {
        return UNKNOWN_SECTOR_SENSITIVITY;
    };
    let normalized = sector.trim().to_lowercase().replace([' ', '-'], "_");

    match normalized.as_str() {
        "technology" => 0.7,
        "healthcare" => 0.6,
        "consumer_staples" => 0.3,
        "utilities" => 0.2,
        "financials" => 0.9,
        "industrials" => 0.8,
        "consumer_discretionary" => 0.8,
        "materials" => 0.7,
        "energy" => 0.6,
        "real_estate" => 0.8,
        _ => UNKNOWN_SECTOR_SENSITIVITY,
    }
}

/// Population standard deviation of the closes; 0 for an empty series.
pub fn volatility(prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    prices.iter().population_std_dev()
}

/// Scale `base` down for volatility and macro risk, never below 20% of it.
pub fn size_multiplier(base: f64, volatility: f64, risk_level: RiskLevel) -> f64 {
    let volatility_factor = 1.0 - volatility * 2.0;
    base * (volatility_factor * risk_level.size_factor()).max(MIN_SIZE_FACTOR)
}

pub struct SentimentEngine {
    gateway: Arc<dyn ExecutionGateway>,
    economic: Arc<dyn EconomicDataProvider>,
    risk_cache: Arc<TtlCache<(), EconomicRisk>>,
    risk_ttl: Duration,
}

impl SentimentEngine {
    pub fn new(
        gateway: Arc<dyn ExecutionGateway>,
        economic: Arc<dyn EconomicDataProvider>,
        risk_cache: Arc<TtlCache<(), EconomicRisk>>,
        risk_ttl: Duration,
    ) -> Self {
        Self {
            gateway,
            economic,
            risk_cache,
            risk_ttl,
        }
    }

    /// Economy-wide risk, memoised for `risk_ttl`.
    pub async fn economic_risk(&self) -> EconomicRisk {
        if let Some(risk) = self.risk_cache.get(&(), self.risk_ttl).await {
            return risk;
        }

        let risk = economic::assess(self.economic.as_ref()).await;
        debug!(
            risk_level = %risk.risk_level,
            sentiment = risk.sentiment,
            risk_factors = risk.risk_factors,
            "Economic risk assessed"
        );
        self.risk_cache.set((), risk.clone()).await;
        risk
    }

    /// Sentiment snapshot for one symbol and its recent closes.
    pub async fn market_sentiment(&self, symbol: &str, closes: &[f64]) -> SentimentSnapshot {
        let risk = self.economic_risk().await;

        let sector = match self.gateway.fundamentals(symbol).await {
            Ok(f) => f.sector,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Fundamentals unavailable, using default sensitivity");
                None
            }
        };
        let sensitivity = sector_sensitivity(sector.as_deref());

        SentimentSnapshot {
            sentiment: risk.sentiment * sensitivity,
            risk_level: risk.risk_level,
            volatility: volatility(closes),
            sector,
            sector_sensitivity: sensitivity,
        }
    }
}
