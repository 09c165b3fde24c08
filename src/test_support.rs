//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::api::{
    AccountProfile, Bar, BrokerPosition, EconomicDataProvider, EconomicObservation,
    ExecutionGateway, Fundamentals, GatewayError, GatewayResult, NotificationSink,
    OptionsVolume, OrderConfirmation, Quote,
};
use crate::models::{OrderIntent, OrderSide};

#[derive(Default)]
struct MockState {
    quotes: HashMap<String, Quote>,
    bars: HashMap<String, Vec<Bar>>,
    options: HashMap<String, OptionsVolume>,
    sectors: HashMap<String, String>,
    holdings: HashMap<String, Decimal>,
    broker_positions: Vec<BrokerPosition>,
    buying_power: Decimal,
    failing: HashSet<String>,
    history_delays: HashMap<String, Duration>,
    reject_orders: bool,
    orders: Vec<OrderIntent>,
    profile_calls: usize,
}

/// Scriptable brokerage. Fills every order at the current quote.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

fn key(symbol: &str) -> String {
    symbol.to_uppercase()
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.set_quote(symbol, price, price, 0.0);
    }

    pub fn set_quote(&self, symbol: &str, price: Decimal, previous_close: Decimal, volume: f64) {
        self.state().quotes.insert(
            key(symbol),
            Quote {
                symbol: key(symbol),
                last_trade_price: price,
                previous_close,
                volume,
            },
        );
    }

    /// Bars with flat volume except a heavier last bar.
    pub fn set_closes(&self, symbol: &str, closes: &[f64]) {
        let last = closes.len().saturating_sub(1);
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, close)| Bar {
                begins_at: None,
                close: *close,
                volume: if i == last { 200.0 } else { 100.0 },
            })
            .collect();
        self.state().bars.insert(key(symbol), bars);
    }

    pub fn set_options(&self, symbol: &str, call_volume: f64, put_volume: f64) {
        self.state().options.insert(
            key(symbol),
            OptionsVolume {
                call_volume,
                put_volume,
            },
        );
    }

    pub fn set_sector(&self, symbol: &str, sector: &str) {
        self.state().sectors.insert(key(symbol), sector.to_string());
    }

    pub fn set_buying_power(&self, buying_power: Decimal) {
        self.state().buying_power = buying_power;
    }

    pub fn add_broker_position(&self, symbol: &str, quantity: Decimal, average_buy_price: Decimal) {
        self.state().broker_positions.push(BrokerPosition {
            symbol: symbol.to_string(),
            quantity,
            average_buy_price,
        });
    }

    /// Every read for `symbol` fails with a 503.
    pub fn fail_symbol(&self, symbol: &str) {
        self.state().failing.insert(key(symbol));
    }

    pub fn delay_history(&self, symbol: &str, delay: Duration) {
        self.state().history_delays.insert(key(symbol), delay);
    }

    pub fn reject_orders(&self, reject: bool) {
        self.state().reject_orders = reject;
    }

    pub fn orders(&self) -> Vec<OrderIntent> {
        self.state().orders.clone()
    }

    pub fn profile_calls(&self) -> usize {
        self.state().profile_calls
    }

    fn check_symbol(&self, symbol: &str) -> GatewayResult<()> {
        if self.state().failing.contains(&key(symbol)) {
            return Err(GatewayError::Http {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionGateway for MockGateway {
    async fn quote(&self, symbol: &str) -> GatewayResult<Quote> {
        self.check_symbol(symbol)?;
        self.state()
            .quotes
            .get(&key(symbol))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(symbol.to_string()))
    }

    async fn historicals(&self, symbol: &str) -> GatewayResult<Vec<Bar>> {
        self.check_symbol(symbol)?;
        let delay = self.state().history_delays.get(&key(symbol)).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state().bars.get(&key(symbol)).cloned().unwrap_or_default())
    }

    async fn options_volume(&self, symbol: &str) -> GatewayResult<OptionsVolume> {
        self.check_symbol(symbol)?;
        self.state()
            .options
            .get(&key(symbol))
            .copied()
            .ok_or_else(|| GatewayError::NotFound(symbol.to_string()))
    }

    async fn fundamentals(&self, symbol: &str) -> GatewayResult<Fundamentals> {
        self.check_symbol(symbol)?;
        Ok(Fundamentals {
            sector: self.state().sectors.get(&key(symbol)).cloned(),
        })
    }

    async fn holdings(&self, symbol: &str) -> GatewayResult<Decimal> {
        Ok(self
            .state()
            .holdings
            .get(&key(symbol))
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn place_order(&self, intent: &OrderIntent) -> GatewayResult<OrderConfirmation> {
        let mut state = self.state();
        if state.reject_orders {
            return Err(GatewayError::Rejected("orders disabled".to_string()));
        }

        let symbol = key(&intent.symbol);
        let fill_price = state
            .quotes
            .get(&symbol)
            .map(|q| q.last_trade_price)
            .unwrap_or(intent.reference_price);

        let held = state.holdings.entry(symbol.clone()).or_insert(Decimal::ZERO);
        match intent.side {
            OrderSide::Buy => *held += intent.quantity,
            OrderSide::Sell => *held -= intent.quantity,
        }

        state.orders.push(intent.clone());
        Ok(OrderConfirmation {
            order_id: format!("mock-{}", state.orders.len()),
            ref_id: intent.ref_id,
            symbol,
            side: intent.side,
            quantity: intent.quantity,
            fill_price: Some(fill_price),
            state: "filled".to_string(),
        })
    }

    async fn account_profile(&self) -> GatewayResult<AccountProfile> {
        let mut state = self.state();
        state.profile_calls += 1;
        Ok(AccountProfile {
            buying_power: state.buying_power,
            cash: state.buying_power,
        })
    }

    async fn open_positions(&self) -> GatewayResult<Vec<BrokerPosition>> {
        Ok(self.state().broker_positions.clone())
    }
}

/// Fixed macro series keyed by series id.
#[derive(Default)]
pub struct StaticEconomicProvider {
    series: HashMap<String, Vec<f64>>,
    calls: AtomicUsize,
}

impl StaticEconomicProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series_id: &str, values: &[f64]) -> Self {
        self.series.insert(series_id.to_string(), values.to_vec());
        self
    }

    /// Number of `series` requests served, found or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EconomicDataProvider for StaticEconomicProvider {
    async fn series(&self, series_id: &str, months: u32) -> GatewayResult<Vec<EconomicObservation>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let values = self
            .series
            .get(series_id)
            .ok_or_else(|| GatewayError::NotFound(series_id.to_string()))?;

        let skip = values.len().saturating_sub(months as usize);
        Ok(values
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, value)| EconomicObservation {
                date: format!("M{:02}", i + 1),
                value: *value,
            })
            .collect())
    }
}

/// Keeps every notification it is sent.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send(&self, title: &str, message: &str) -> GatewayResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
        Ok(())
    }
}
