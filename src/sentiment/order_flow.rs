//! Order-flow estimate from option volume, price direction and intraday
//! volume.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, warn};

use crate::api::{Bar, ExecutionGateway, OptionsVolume, Quote};
use crate::cache::TtlCache;
use crate::models::OrderFlowSnapshot;

/// Share of volume attributed to the side the price moved toward.
const DOMINANT_SHARE: f64 = 0.6;
const MINORITY_SHARE: f64 = 0.4;
const CHECK_COUNT: f64 = 4.0;

/// Split session volume into estimated buy and sell volume.
pub fn estimate_pressure(volume: f64, price_change: f64) -> (f64, f64) {
    if price_change > 0.0 {
        (volume * DOMINANT_SHARE, volume * MINORITY_SHARE)
    } else if price_change < 0.0 {
        (volume * MINORITY_SHARE, volume * DOMINANT_SHARE)
    } else {
        (volume * 0.5, volume * 0.5)
    }
}

/// Last bar volume relative to the mean bar volume, minus one.
pub fn volume_trend(volumes: &[f64]) -> f64 {
    let Some(last) = volumes.last() else {
        return 0.0;
    };
    let mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
    if mean > 0.0 {
        last / mean - 1.0
    } else {
        0.0
    }
}

/// Combine the raw inputs into a snapshot.
pub fn score(options: OptionsVolume, buy_volume: f64, sell_volume: f64, trend: f64) -> OrderFlowSnapshot {
    let put_call_ratio = if options.call_volume > 0.0 {
        options.put_volume / options.call_volume
    } else {
        1.0
    };
    let buy_sell_ratio = if sell_volume > 0.0 {
        buy_volume / sell_volume
    } else {
        1.0
    };

    let bullish = [
        put_call_ratio < 1.0,
        buy_sell_ratio > 1.0,
        trend > 0.0,
        options.call_volume > options.put_volume,
    ]
    .iter()
    .filter(|check| **check)
    .count();

    let sentiment = bullish as f64 / CHECK_COUNT;

    OrderFlowSnapshot {
        call_volume: options.call_volume,
        put_volume: options.put_volume,
        put_call_ratio,
        buy_volume,
        sell_volume,
        buy_sell_ratio,
        volume_trend: trend,
        sentiment,
        strength: (sentiment - 0.5).abs() * 2.0,
    }
}

/// Per-symbol order-flow analysis, memoised in the shared cache.
pub struct OrderFlowAnalyzer {
    gateway: Arc<dyn ExecutionGateway>,
    cache: Arc<TtlCache<String, OrderFlowSnapshot>>,
    ttl: Duration,
}

impl OrderFlowAnalyzer {
    pub fn new(
        gateway: Arc<dyn ExecutionGateway>,
        cache: Arc<TtlCache<String, OrderFlowSnapshot>>,
        ttl: Duration,
    ) -> Self {
        Self {
            gateway,
            cache,
            ttl,
        }
    }

    /// Analyse `symbol` using the quote and bars already fetched this cycle.
    ///
    /// Option volume is fetched here; on failure it reads as zero calls and
    /// zero puts. A missing quote reads as no volume.
    pub async fn analyze(&self, symbol: &str, quote: Option<&Quote>, bars: &[Bar]) -> OrderFlowSnapshot {
        let key = symbol.to_uppercase();
        if let Some(cached) = self.cache.get(&key, self.ttl).await {
            debug!(symbol = %symbol, "Order flow from cache");
            return cached;
        }

        let options = match self.gateway.options_volume(symbol).await {
            Ok(v) => v,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Options volume unavailable, using zero volume");
                OptionsVolume::default()
            }
        };

        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let (buy_volume, sell_volume) = match quote {
            Some(q) => {
                let session_volume = if q.volume > 0.0 {
                    q.volume
                } else {
                    volumes.iter().sum()
                };
                let price_change = (q.last_trade_price - q.previous_close)
                    .to_f64()
                    .unwrap_or(0.0);
                estimate_pressure(session_volume, price_change)
            }
            None => (0.0, 0.0),
        };

        let snapshot = score(options, buy_volume, sell_volume, volume_trend(&volumes));

        debug!(symbol = %symbol, flow = %snapshot, "Order flow analysed");
        self.cache.set(key, snapshot.clone()).await;
        snapshot
    }
}
