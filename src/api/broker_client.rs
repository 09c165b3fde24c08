//! REST brokerage client for quotes, history, options data, account state and
//! order placement.
//!
//! Equities go through the brokerage API. Symbols registered as crypto are
//! routed to the crypto endpoints: currency pairs, forex quotes and
//! historicals on the brokerage API, and accounts, holdings and orders on
//! the crypto API.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::models::{OrderIntent, OrderSide};

use super::error::{GatewayError, GatewayResult};
use super::types::*;
use super::ExecutionGateway;

const BROKER_API_BASE: &str = "https://api.robinhood.com";
const CRYPTO_API_BASE: &str = "https://nummus.robinhood.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(10);
const OPTION_FETCH_CONCURRENCY: usize = 8;
const MAX_POSITION_PAGES: usize = 20;

/// Authenticated brokerage REST client.
pub struct BrokerClient {
    client: Client,
    base_url: String,
    crypto_base_url: String,
    token: String,
    crypto_symbols: HashSet<String>,
    instruments: RwLock<HashMap<String, InstrumentResponse>>,
    currency_pairs: RwLock<HashMap<String, CurrencyPairResponse>>,
    account_url: RwLock<Option<String>>,
    crypto_account_id: RwLock<Option<String>>,
}

impl BrokerClient {
    pub fn new(token: String) -> Result<Self> {
        Self::with_base_urls(BROKER_API_BASE.to_string(), CRYPTO_API_BASE.to_string(), token)
    }

    /// Create with custom base URLs (for testing).
    pub fn with_base_urls(base_url: String, crypto_base_url: String, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            crypto_base_url: crypto_base_url.trim_end_matches('/').to_string(),
            token,
            crypto_symbols: HashSet::new(),
            instruments: RwLock::new(HashMap::new()),
            currency_pairs: RwLock::new(HashMap::new()),
            account_url: RwLock::new(None),
            crypto_account_id: RwLock::new(None),
        })
    }

    /// Create from `BROKER_API_TOKEN` with optional `BROKER_API_URL` and
    /// `BROKER_CRYPTO_API_URL`.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("BROKER_API_TOKEN").context("BROKER_API_TOKEN not set")?;
        let base_url =
            std::env::var("BROKER_API_URL").unwrap_or_else(|_| BROKER_API_BASE.to_string());
        let crypto_base_url =
            std::env::var("BROKER_CRYPTO_API_URL").unwrap_or_else(|_| CRYPTO_API_BASE.to_string());
        Self::with_base_urls(base_url, crypto_base_url, token)
    }

    /// Symbols traded as crypto pairs.
    pub fn with_crypto_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.crypto_symbols = symbols
            .into_iter()
            .map(|s| s.into().trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    fn is_crypto(&self, symbol: &str) -> bool {
        self.crypto_symbols.contains(&symbol.to_uppercase())
    }

    async fn check(response: Response) -> GatewayResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(body));
        }
        Err(GatewayError::Http {
            status: status.as_u16(),
            body,
        })
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Malformed(e.to_string()))
    }

    /// Single GET attempt.
    async fn get_json<T: DeserializeOwned + Send>(&self, url: &str) -> GatewayResult<T> {
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let response = Self::check(response).await?;
        Self::parse(response).await
    }

    /// GET with bounded exponential backoff on transient failures.
    async fn get_with_retry<T: DeserializeOwned + Send>(&self, url: &str) -> GatewayResult<T> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(2),
            max_elapsed_time: Some(MAX_RETRY_ELAPSED),
            ..Default::default()
        };

        backoff::future::retry(policy, move || async move {
            self.get_json::<T>(url)
                .await
                .map_err(GatewayError::into_backoff)
        })
        .await
    }

    /// POST an order once and map the broker's answer.
    async fn submit_order<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
        intent: &OrderIntent,
    ) -> GatewayResult<OrderConfirmation> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(body));
        }
        let response = Self::check(response).await?;
        let order: OrderResponse = Self::parse(response).await?;

        if is_rejected_state(&order.state) {
            let reason = order.reject_reason.unwrap_or_else(|| order.state.clone());
            warn!(symbol = %intent.symbol, reason = %reason, "Order rejected by broker");
            return Err(GatewayError::Rejected(reason));
        }

        Ok(OrderConfirmation {
            order_id: order.id,
            ref_id: intent.ref_id,
            symbol: intent.symbol.to_uppercase(),
            side: intent.side,
            quantity: intent.quantity,
            fill_price: order.average_price,
            state: order.state,
        })
    }

    async fn instrument(&self, symbol: &str) -> GatewayResult<InstrumentResponse> {
        let symbol = symbol.to_uppercase();
        if let Some(found) = self.instruments.read().await.get(&symbol) {
            return Ok(found.clone());
        }

        let url = format!("{}/instruments/?symbol={}", self.base_url, symbol);
        let page: Page<InstrumentResponse> = self.get_with_retry(&url).await?;
        let instrument = page
            .results
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(format!("instrument {}", symbol)))?;

        self.instruments
            .write()
            .await
            .insert(symbol, instrument.clone());
        Ok(instrument)
    }

    async fn account(&self) -> GatewayResult<AccountResponse> {
        let url = format!("{}/accounts/", self.base_url);
        let page: Page<AccountResponse> = self.get_with_retry(&url).await?;
        let account = page
            .results
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound("no brokerage account".to_string()))?;

        *self.account_url.write().await = Some(account.url.clone());
        Ok(account)
    }

    async fn account_url(&self) -> GatewayResult<String> {
        if let Some(url) = self.account_url.read().await.clone() {
            return Ok(url);
        }
        Ok(self.account().await?.url)
    }

    /// Volume of one option contract; `None` when its market data is missing.
    async fn contract_volume(&self, contract: OptionInstrumentResponse) -> Option<(String, f64)> {
        let url = format!("{}/marketdata/options/{}/", self.base_url, contract.id);
        match self.get_with_retry::<OptionMarketDataResponse>(&url).await {
            Ok(data) => Some((contract.option_type, data.volume)),
            Err(e) => {
                debug!(contract = %contract.id, error = %e, "Option market data unavailable");
                None
            }
        }
    }

    async fn position_symbol(&self, entry: &PositionEntry) -> GatewayResult<String> {
        if let Some(symbol) = &entry.symbol {
            return Ok(symbol.to_uppercase());
        }
        let instrument: InstrumentResponse = self.get_with_retry(&entry.instrument).await?;
        Ok(instrument.symbol.to_uppercase())
    }

    // ==================== Crypto ====================

    /// Currency pair quoted in USD for an asset code. The pair list is
    /// fetched once and kept for the life of the client.
    async fn currency_pair(&self, symbol: &str) -> GatewayResult<CurrencyPairResponse> {
        let symbol = symbol.to_uppercase();
        if let Some(found) = self.currency_pairs.read().await.get(&symbol) {
            return Ok(found.clone());
        }

        let url = format!("{}/currency_pairs/", self.crypto_base_url);
        let page: Page<CurrencyPairResponse> = self.get_with_retry(&url).await?;

        let mut pairs = self.currency_pairs.write().await;
        for pair in page.results {
            pairs.insert(pair.asset_currency.code.to_uppercase(), pair);
        }
        pairs
            .get(&symbol)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("currency pair {}", symbol)))
    }

    async fn crypto_quote(&self, symbol: &str) -> GatewayResult<CryptoQuoteResponse> {
        let pair = self.currency_pair(symbol).await?;
        let url = format!("{}/marketdata/forex/quotes/?ids={}", self.base_url, pair.id);
        let page: Page<CryptoQuoteResponse> = self.get_with_retry(&url).await?;
        page.results
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(format!("crypto quote {}", symbol)))
    }

    async fn crypto_account_id(&self) -> GatewayResult<String> {
        if let Some(id) = self.crypto_account_id.read().await.clone() {
            return Ok(id);
        }

        let url = format!("{}/accounts/", self.crypto_base_url);
        let page: Page<CryptoAccountResponse> = self.get_with_retry(&url).await?;
        let account = page
            .results
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound("no crypto account".to_string()))?;

        *self.crypto_account_id.write().await = Some(account.id.clone());
        Ok(account.id)
    }

    async fn crypto_holdings(&self) -> GatewayResult<Vec<CryptoHoldingResponse>> {
        let url = format!("{}/holdings/", self.crypto_base_url);
        let page: Page<CryptoHoldingResponse> = self.get_with_retry(&url).await?;
        Ok(page.results)
    }

    async fn place_crypto_order(&self, intent: &OrderIntent) -> GatewayResult<OrderConfirmation> {
        let quote = self.crypto_quote(&intent.symbol).await?;
        let pair = self.currency_pair(&intent.symbol).await?;
        let account_id = self.crypto_account_id().await?;

        // Buys cross the ask, sells hit the bid
        let price = match intent.side {
            OrderSide::Buy => quote.ask_price,
            OrderSide::Sell => quote.bid_price,
        };

        let request = CryptoOrderRequest {
            account_id,
            currency_pair_id: pair.id,
            price: crypto_order_price(price).normalize().to_string(),
            quantity: intent.quantity.normalize().to_string(),
            ref_id: intent.ref_id,
            side: intent.side,
            time_in_force: "gtc",
            order_type: "market",
        };

        debug!(
            symbol = %intent.symbol,
            side = %intent.side,
            quantity = %intent.quantity,
            price = %request.price,
            ref_id = %intent.ref_id,
            "Placing crypto order"
        );

        let url = format!("{}/orders/", self.crypto_base_url);
        self.submit_order(&url, &request, intent).await
    }

    async fn crypto_positions(&self) -> GatewayResult<Vec<BrokerPosition>> {
        Ok(self
            .crypto_holdings()
            .await?
            .into_iter()
            .filter(|h| h.quantity_available > Decimal::ZERO)
            .filter(|h| self.is_crypto(&h.currency.code))
            .map(|h| BrokerPosition {
                symbol: h.currency.code.to_uppercase(),
                quantity: h.quantity_available,
                average_buy_price: h.average_cost(),
            })
            .collect())
    }
}

/// Round an order price to the precision the crypto venue accepts: 6 places
/// at or below one cent, 4 below one dollar, otherwise cents.
fn crypto_order_price(price: Decimal) -> Decimal {
    if price <= dec!(0.01) {
        price.round_dp(6)
    } else if price < Decimal::ONE {
        price.round_dp(4)
    } else {
        price.round_dp(2)
    }
}

fn to_bars(historicals: Vec<HistoricalBar>) -> GatewayResult<Vec<Bar>> {
    historicals
        .into_iter()
        .map(|bar| {
            let close = bar.close_price.to_f64().ok_or_else(|| {
                GatewayError::Malformed(format!("close price {}", bar.close_price))
            })?;
            Ok(Bar {
                begins_at: bar.begins_at,
                close,
                volume: bar.volume,
            })
        })
        .collect()
}

/// Sum per-contract volumes into call and put totals.
fn tally_option_volume<I>(contracts: I) -> OptionsVolume
where
    I: IntoIterator<Item = (String, f64)>,
{
    contracts
        .into_iter()
        .fold(OptionsVolume::default(), |mut acc, (option_type, volume)| {
            match option_type.as_str() {
                "call" => acc.call_volume += volume,
                "put" => acc.put_volume += volume,
                _ => {}
            }
            acc
        })
}

fn is_rejected_state(state: &str) -> bool {
    matches!(state, "rejected" | "failed" | "cancelled")
}

#[async_trait]
impl ExecutionGateway for BrokerClient {
    async fn quote(&self, symbol: &str) -> GatewayResult<Quote> {
        if self.is_crypto(symbol) {
            let resp = self.crypto_quote(symbol).await?;
            return Ok(Quote {
                symbol: symbol.to_uppercase(),
                last_trade_price: resp.mark_price,
                previous_close: resp.open_price,
                volume: resp.volume.and_then(|v| v.to_f64()).unwrap_or(0.0),
            });
        }

        let url = format!("{}/quotes/{}/", self.base_url, symbol.to_uppercase());
        let resp: QuoteResponse = self.get_with_retry(&url).await?;

        Ok(Quote {
            symbol: resp.symbol,
            last_trade_price: resp.last_trade_price,
            previous_close: resp.previous_close,
            volume: resp.volume.unwrap_or(0.0),
        })
    }

    async fn historicals(&self, symbol: &str) -> GatewayResult<Vec<Bar>> {
        let url = if self.is_crypto(symbol) {
            let pair = self.currency_pair(symbol).await?;
            format!(
                "{}/marketdata/forex/historicals/{}/?bounds=24_7&interval=5minute&span=day",
                self.base_url, pair.id
            )
        } else {
            format!(
                "{}/quotes/historicals/{}/?interval=5minute&span=day&bounds=regular",
                self.base_url,
                symbol.to_uppercase()
            )
        };
        let resp: HistoricalsResponse = self.get_with_retry(&url).await?;
        to_bars(resp.historicals)
    }

    async fn options_volume(&self, symbol: &str) -> GatewayResult<OptionsVolume> {
        if self.is_crypto(symbol) {
            debug!(symbol = %symbol, "No listed options for crypto pairs");
            return Ok(OptionsVolume::default());
        }

        let instrument = self.instrument(symbol).await?;

        let url = format!(
            "{}/options/chains/?equity_instrument_ids={}",
            self.base_url, instrument.id
        );
        let chains: Page<OptionChainResponse> = self.get_with_retry(&url).await?;
        let chain = chains
            .results
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(format!("option chain for {}", symbol)))?;

        let expiration = chain
            .expiration_dates
            .iter()
            .min()
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("expirations for {}", symbol)))?;

        let url = format!(
            "{}/options/instruments/?chain_id={}&expiration_dates={}&state=active",
            self.base_url, chain.id, expiration
        );
        let contracts: Page<OptionInstrumentResponse> = self.get_with_retry(&url).await?;

        debug!(
            symbol = %symbol,
            expiration = %expiration,
            contracts = contracts.results.len(),
            "Fetching option market data"
        );

        let requests = contracts
            .results
            .into_iter()
            .map(|contract| self.contract_volume(contract));
        let volumes: Vec<Option<(String, f64)>> = stream::iter(requests)
            .buffer_unordered(OPTION_FETCH_CONCURRENCY)
            .collect()
            .await;

        Ok(tally_option_volume(volumes.into_iter().flatten()))
    }

    async fn fundamentals(&self, symbol: &str) -> GatewayResult<Fundamentals> {
        if self.is_crypto(symbol) {
            return Ok(Fundamentals::default());
        }

        let url = format!("{}/fundamentals/{}/", self.base_url, symbol.to_uppercase());
        let resp: FundamentalsResponse = self.get_with_retry(&url).await?;
        Ok(Fundamentals {
            sector: resp.sector,
        })
    }

    async fn holdings(&self, symbol: &str) -> GatewayResult<Decimal> {
        let symbol = symbol.to_uppercase();
        if self.is_crypto(&symbol) {
            return Ok(self
                .crypto_holdings()
                .await?
                .into_iter()
                .find(|h| h.currency.code.eq_ignore_ascii_case(&symbol))
                .map(|h| h.quantity_available)
                .unwrap_or(Decimal::ZERO));
        }

        let positions = self.open_positions().await?;
        Ok(positions
            .into_iter()
            .find(|p| p.symbol == symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO))
    }

    async fn place_order(&self, intent: &OrderIntent) -> GatewayResult<OrderConfirmation> {
        if self.is_crypto(&intent.symbol) {
            return self.place_crypto_order(intent).await;
        }

        let account = self.account_url().await?;
        let instrument = self.instrument(&intent.symbol).await?;

        let request = OrderRequest {
            account,
            instrument: instrument.url,
            symbol: intent.symbol.to_uppercase(),
            side: intent.side,
            quantity: intent.quantity.normalize().to_string(),
            order_type: "market",
            time_in_force: "gfd",
            trigger: "immediate",
            ref_id: intent.ref_id,
        };

        debug!(
            symbol = %intent.symbol,
            side = %intent.side,
            quantity = %intent.quantity,
            ref_id = %intent.ref_id,
            "Placing order"
        );

        let url = format!("{}/orders/", self.base_url);
        self.submit_order(&url, &request, intent).await
    }

    async fn account_profile(&self) -> GatewayResult<AccountProfile> {
        let account = self.account().await?;
        Ok(AccountProfile {
            buying_power: account.buying_power,
            cash: account.cash,
        })
    }

    /// Equity positions, plus crypto holdings in registered crypto symbols.
    async fn open_positions(&self) -> GatewayResult<Vec<BrokerPosition>> {
        let mut url = Some(format!("{}/positions/?nonzero=true", self.base_url));
        let mut positions = Vec::new();
        let mut pages = 0;

        while let Some(next) = url.take() {
            let page: Page<PositionEntry> = self.get_with_retry(&next).await?;
            for entry in &page.results {
                if entry.quantity <= Decimal::ZERO {
                    continue;
                }
                let symbol = self.position_symbol(entry).await?;
                positions.push(BrokerPosition {
                    symbol,
                    quantity: entry.quantity,
                    average_buy_price: entry.average_buy_price,
                });
            }

            pages += 1;
            if pages >= MAX_POSITION_PAGES {
                warn!(pages, "Stopping position pagination early");
                break;
            }
            url = page.next;
        }

        if !self.crypto_symbols.is_empty() {
            match self.crypto_positions().await {
                Ok(crypto) => positions.extend(crypto),
                Err(e) => warn!(error = %e, "Crypto holdings unavailable"),
            }
        }

        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BrokerClient {
        BrokerClient::with_base_urls(
            format!("{}/api/", server.uri()),
            format!("{}/crypto", server.uri()),
            "token".into(),
        )
        .unwrap()
        .with_crypto_symbols(["btc", "ETH"])
    }

    async fn mount_btc_pair(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/crypto/currency_pairs/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"id": "pair-btc", "asset_currency": {"code": "BTC"}},
                    {"id": "pair-eth", "asset_currency": {"code": "ETH"}}
                ]
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_btc_quote(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/marketdata/forex/quotes/"))
            .and(query_param("ids", "pair-btc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "mark_price": "67010.10",
                    "ask_price": "67020.549",
                    "bid_price": "67000.004",
                    "open_price": "66500.00",
                    "volume": "0"
                }]
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_tally_option_volume() {
        let volume = tally_option_volume(vec![
            ("call".to_string(), 120.0),
            ("put".to_string(), 40.0),
            ("call".to_string(), 30.0),
            ("unknown".to_string(), 999.0),
        ]);
        assert_eq!(volume.call_volume, 150.0);
        assert_eq!(volume.put_volume, 40.0);
    }

    #[test]
    fn test_crypto_symbol_routing() {
        let client = BrokerClient::with_base_urls(
            "http://localhost/".into(),
            "http://crypto.localhost/".into(),
            "t".into(),
        )
        .unwrap()
        .with_crypto_symbols(["btc", " ETH ", ""]);

        assert!(client.is_crypto("BTC"));
        assert!(client.is_crypto("eth"));
        assert!(!client.is_crypto("TSLA"));
        assert_eq!(client.crypto_symbols.len(), 2);
        assert_eq!(client.base_url, "http://localhost");
        assert_eq!(client.crypto_base_url, "http://crypto.localhost");
    }

    #[test]
    fn test_crypto_order_price_precision() {
        assert_eq!(crypto_order_price(dec!(67020.549)), dec!(67020.55));
        assert_eq!(crypto_order_price(dec!(0.123456)), dec!(0.1235));
        assert_eq!(crypto_order_price(dec!(0.00123456)), dec!(0.001235));
    }

    #[test]
    fn test_rejected_states() {
        assert!(is_rejected_state("rejected"));
        assert!(is_rejected_state("cancelled"));
        assert!(!is_rejected_state("filled"));
        assert!(!is_rejected_state("queued"));
    }

    #[tokio::test]
    async fn test_crypto_quote_and_history_use_forex_routes() {
        let server = MockServer::start().await;
        mount_btc_pair(&server).await;
        mount_btc_quote(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/marketdata/forex/historicals/pair-btc/"))
            .and(query_param("bounds", "24_7"))
            .and(query_param("interval", "5minute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data_points": [
                    {"begins_at": "2024-06-08T15:00:00Z", "close_price": "67000.00", "volume": 0},
                    {"begins_at": "2024-06-08T15:05:00Z", "close_price": "67010.10", "volume": 0}
                ]
            })))
            .mount(&server)
            .await;

        let client = client(&server);

        let quote = client.quote("BTC").await.unwrap();
        assert_eq!(quote.symbol, "BTC");
        assert_eq!(quote.last_trade_price, dec!(67010.10));
        assert_eq!(quote.previous_close, dec!(66500.00));

        let bars = client.historicals("btc").await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 67010.10);

        // No options or fundamentals calls for crypto
        assert_eq!(client.options_volume("BTC").await.unwrap(), OptionsVolume::default());
        assert_eq!(client.fundamentals("BTC").await.unwrap().sector, None);
    }

    #[tokio::test]
    async fn test_crypto_order_posts_to_crypto_orders() {
        let server = MockServer::start().await;
        mount_btc_pair(&server).await;
        mount_btc_quote(&server).await;
        Mock::given(method("GET"))
            .and(path("/crypto/accounts/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"results": [{"id": "acct-1"}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/crypto/orders/"))
            .and(body_partial_json(json!({
                "account_id": "acct-1",
                "currency_pair_id": "pair-btc",
                "side": "buy",
                "price": "67020.55",
                "quantity": "0.015",
                "type": "market",
                "time_in_force": "gtc"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "order-1",
                "state": "filled",
                "average_price": "67018.00"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let intent = OrderIntent::new("BTC", OrderSide::Buy, dec!(0.015000), dec!(67010.10), "signal_buy");
        let confirmation = client.place_order(&intent).await.unwrap();

        assert_eq!(confirmation.order_id, "order-1");
        assert_eq!(confirmation.fill_price, Some(dec!(67018.00)));
        assert_eq!(confirmation.ref_id, intent.ref_id);
    }

    #[tokio::test]
    async fn test_positions_include_crypto_holdings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/positions/"))
            .and(query_param("nonzero", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "instrument": "https://broker/instruments/tsla/",
                    "symbol": "TSLA",
                    "quantity": "2.0000",
                    "average_buy_price": "250.00"
                }],
                "next": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/crypto/holdings/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {
                        "currency": {"code": "BTC"},
                        "quantity_available": "0.030000",
                        "cost_bases": [{"direct_cost_basis": "1800.00", "direct_quantity": "0.030000"}]
                    },
                    {"currency": {"code": "DOGE"}, "quantity_available": "100", "cost_bases": []},
                    {"currency": {"code": "ETH"}, "quantity_available": "0", "cost_bases": []}
                ]
            })))
            .mount(&server)
            .await;

        let client = client(&server);

        let positions = client.open_positions().await.unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].symbol, "TSLA");
        assert_eq!(positions[1].symbol, "BTC");
        assert_eq!(positions[1].average_buy_price, dec!(60000));

        assert_eq!(client.holdings("BTC").await.unwrap(), dec!(0.03));
        assert_eq!(client.holdings("ETH").await.unwrap(), Decimal::ZERO);
    }
}
