//! Gateway data types and broker/BLS wire formats.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::OrderSide;

/// Latest quote for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    pub last_trade_price: Decimal,
    pub previous_close: Decimal,
    /// Session volume, 0 when the venue does not report it
    pub volume: f64,
}

/// One intraday bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub begins_at: Option<DateTime<Utc>>,
    pub close: f64,
    pub volume: f64,
}

/// Aggregate option volume across a symbol's nearest chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OptionsVolume {
    pub call_volume: f64,
    pub put_volume: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Fundamentals {
    pub sector: Option<String>,
}

/// Buying power and cash of the trading account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccountProfile {
    pub buying_power: Decimal,
    pub cash: Decimal,
}

/// A holding reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_buy_price: Decimal,
}

/// Broker acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub ref_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    /// Average fill price, if already filled
    pub fill_price: Option<Decimal>,
    pub state: String,
}

/// One observation of a macro series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EconomicObservation {
    /// Period label, e.g. `2024-M05`
    pub date: String,
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Broker wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponse {
    pub symbol: String,
    pub last_trade_price: Decimal,
    #[serde(default)]
    pub previous_close: Decimal,
    #[serde(default)]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalsResponse {
    /// `data_points` on the crypto endpoint
    #[serde(default, alias = "data_points")]
    pub historicals: Vec<HistoricalBar>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoricalBar {
    #[serde(default)]
    pub begins_at: Option<DateTime<Utc>>,
    pub close_price: Decimal,
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundamentalsResponse {
    #[serde(default)]
    pub sector: Option<String>,
}

/// Cursor-paginated list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub url: String,
    pub buying_power: Decimal,
    #[serde(default)]
    pub cash: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionEntry {
    pub instrument: String,
    #[serde(default)]
    pub symbol: Option<String>,
    pub quantity: Decimal,
    #[serde(default)]
    pub average_buy_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentResponse {
    pub id: String,
    pub url: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionChainResponse {
    pub id: String,
    #[serde(default)]
    pub expiration_dates: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionInstrumentResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub option_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionMarketDataResponse {
    #[serde(default)]
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub account: String,
    pub instrument: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: String,
    #[serde(rename = "type")]
    pub order_type: &'static str,
    pub time_in_force: &'static str,
    pub trigger: &'static str,
    pub ref_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub average_price: Option<Decimal>,
    #[serde(default)]
    pub reject_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Crypto wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyCode {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyPairResponse {
    pub id: String,
    pub asset_currency: CurrencyCode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoQuoteResponse {
    pub mark_price: Decimal,
    pub ask_price: Decimal,
    pub bid_price: Decimal,
    #[serde(default)]
    pub open_price: Decimal,
    #[serde(default)]
    pub volume: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoAccountResponse {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostBasis {
    #[serde(default)]
    pub direct_cost_basis: Decimal,
    #[serde(default)]
    pub direct_quantity: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoHoldingResponse {
    pub currency: CurrencyCode,
    #[serde(default)]
    pub quantity_available: Decimal,
    #[serde(default)]
    pub cost_bases: Vec<CostBasis>,
}

impl CryptoHoldingResponse {
    /// Average cost per unit, 0 when the broker reports no basis.
    pub fn average_cost(&self) -> Decimal {
        let (cost, quantity) = self
            .cost_bases
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(c, q), basis| {
                (c + basis.direct_cost_basis, q + basis.direct_quantity)
            });
        if quantity.is_zero() {
            Decimal::ZERO
        } else {
            cost / quantity
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CryptoOrderRequest {
    pub account_id: String,
    pub currency_pair_id: String,
    pub price: String,
    pub quantity: String,
    pub ref_id: Uuid,
    pub side: OrderSide,
    pub time_in_force: &'static str,
    #[serde(rename = "type")]
    pub order_type: &'static str,
}

// ---------------------------------------------------------------------------
// BLS wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BlsRequest {
    #[serde(rename = "seriesid")]
    pub series_id: Vec<String>,
    #[serde(rename = "startyear")]
    pub start_year: String,
    #[serde(rename = "endyear")]
    pub end_year: String,
    #[serde(rename = "registrationkey", skip_serializing_if = "Option::is_none")]
    pub registration_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlsResponse {
    pub status: String,
    #[serde(default)]
    pub message: Vec<String>,
    #[serde(rename = "Results", default)]
    pub results: Option<BlsResults>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlsResults {
    #[serde(default)]
    pub series: Vec<BlsSeries>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlsSeries {
    #[serde(rename = "seriesID")]
    pub series_id: String,
    #[serde(default)]
    pub data: Vec<BlsDataPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlsDataPoint {
    pub year: String,
    pub period: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_quote_with_string_decimals() {
        let json = r#"{"symbol":"TSLA","last_trade_price":"251.3400","previous_close":"248.10"}"#;
        let quote: QuoteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(quote.last_trade_price, dec!(251.34));
        assert_eq!(quote.previous_close, dec!(248.10));
        assert!(quote.volume.is_none());
    }

    #[test]
    fn test_parse_crypto_historicals_and_holdings() {
        let json = r#"{"data_points": [
            {"begins_at": "2024-06-05T13:30:00Z", "close_price": "67012.50", "volume": 0},
            {"begins_at": "2024-06-05T13:35:00Z", "close_price": "67020.00", "volume": 0}
        ]}"#;
        let resp: HistoricalsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.historicals.len(), 2);
        assert_eq!(resp.historicals[1].close_price, dec!(67020.00));

        let json = r#"{
            "currency": {"code": "BTC"},
            "quantity_available": "0.030000",
            "cost_bases": [
                {"direct_cost_basis": "1200.00", "direct_quantity": "0.020000"},
                {"direct_cost_basis": "700.00", "direct_quantity": "0.010000"}
            ]
        }"#;
        let holding: CryptoHoldingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(holding.quantity_available, dec!(0.03));
        // 1900 / 0.03
        assert_eq!(holding.average_cost().round_dp(2), dec!(63333.33));
    }

    #[test]
    fn test_parse_bls_response() {
        let json = r#"{
            "status": "REQUEST_SUCCEEDED",
            "message": [],
            "Results": {"series": [{"seriesID": "CUSR0000SA0", "data": [
                {"year": "2024", "period": "M05", "value": "313.2"},
                {"year": "2024", "period": "M04", "value": "313.0"}
            ]}]}
        }"#;
        let resp: BlsResponse = serde_json::from_str(json).unwrap();
        let series = &resp.results.unwrap().series[0];
        assert_eq!(series.series_id, "CUSR0000SA0");
        assert_eq!(series.data.len(), 2);
        assert_eq!(series.data[0].period, "M05");
    }
}
