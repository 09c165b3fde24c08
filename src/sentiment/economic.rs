//! Macro-economic risk classification.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::api::EconomicDataProvider;
use crate::models::{EconomicRisk, IndicatorChange, MacroIndicator, RiskLevel};

/// Months of history requested per series.
pub const LOOKBACK_MONTHS: u32 = 12;

/// Share of risk factors at or below which risk is Low.
const LOW_RISK_SHARE: f64 = 0.3;
/// Share of risk factors at or above which risk is High.
const HIGH_RISK_SHARE: f64 = 0.7;

/// Percent change from `previous` to `latest`; undefined when `previous` is 0.
pub fn percent_change(latest: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some((latest - previous) / previous * 100.0)
}

/// Classify a set of indicator changes.
///
/// The denominator is always the full indicator set, so missing series count
/// as "no risk factor" rather than shrinking the total.
pub fn classify(conditions: BTreeMap<MacroIndicator, IndicatorChange>) -> EconomicRisk {
    let total = MacroIndicator::ALL.len() as f64;
    let risk_factors = conditions
        .iter()
        .filter(|(indicator, change)| indicator.is_risk_factor(change.change_pct))
        .count();

    let rf = risk_factors as f64;
    let risk_level = if rf <= total * LOW_RISK_SHARE {
        RiskLevel::Low
    } else if rf >= total * HIGH_RISK_SHARE {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    };

    EconomicRisk {
        risk_level,
        sentiment: 1.0 - rf / total,
        risk_factors,
        conditions,
    }
}

/// Fetch every macro series and classify the result.
///
/// A series that fails, has fewer than two observations, or has a zero
/// previous value is left out. If nothing at all could be fetched the
/// neutral classification is returned.
pub async fn assess(provider: &dyn EconomicDataProvider) -> EconomicRisk {
    let mut conditions = BTreeMap::new();

    for indicator in MacroIndicator::ALL {
        let observations = match provider.series(indicator.series_id(), LOOKBACK_MONTHS).await {
            Ok(obs) => obs,
            Err(e) => {
                warn!(indicator = %indicator, error = %e, "Economic series unavailable");
                continue;
            }
        };

        let [previous, latest] = match observations.as_slice() {
            [.., previous, latest] => [previous.value, latest.value],
            _ => {
                debug!(indicator = %indicator, points = observations.len(), "Not enough observations");
                continue;
            }
        };

        if let Some(change_pct) = percent_change(latest, previous) {
            conditions.insert(
                indicator,
                IndicatorChange {
                    latest,
                    previous,
                    change_pct,
                },
            );
        }
    }

    if conditions.is_empty() {
        warn!("No economic data available, using neutral risk");
        return EconomicRisk::neutral();
    }

    classify(conditions)
}
