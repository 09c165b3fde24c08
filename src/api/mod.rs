//! External collaborators: brokerage gateway, macro data provider and
//! notification sink, plus their HTTP and in-memory implementations.

mod broker_client;
mod economic_client;
mod error;
mod notifier;
mod paper;
mod types;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::OrderIntent;

pub use broker_client::BrokerClient;
pub use economic_client::BlsClient;
pub use error::{GatewayError, GatewayResult};
pub use notifier::{LogNotifier, WebhookNotifier};
pub use paper::{PaperConfig, PaperGateway};
pub use types::{
    AccountProfile, Bar, BrokerPosition, EconomicObservation, Fundamentals, OptionsVolume,
    OrderConfirmation, Quote,
};

/// Brokerage: market data, account state and order placement.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn quote(&self, symbol: &str) -> GatewayResult<Quote>;

    /// Today's intraday bars, oldest first.
    async fn historicals(&self, symbol: &str) -> GatewayResult<Vec<Bar>>;

    async fn options_volume(&self, symbol: &str) -> GatewayResult<OptionsVolume>;

    async fn fundamentals(&self, symbol: &str) -> GatewayResult<Fundamentals>;

    /// Units of `symbol` currently held, 0 when none.
    async fn holdings(&self, symbol: &str) -> GatewayResult<Decimal>;

    /// Place a market order. Never retried by the caller.
    async fn place_order(&self, intent: &OrderIntent) -> GatewayResult<OrderConfirmation>;

    async fn account_profile(&self) -> GatewayResult<AccountProfile>;

    async fn open_positions(&self) -> GatewayResult<Vec<BrokerPosition>>;
}

/// Source of macro-economic time series.
#[async_trait]
pub trait EconomicDataProvider: Send + Sync {
    /// Observations for `series_id` over the last `months`, oldest first.
    async fn series(&self, series_id: &str, months: u32)
        -> GatewayResult<Vec<EconomicObservation>>;
}

/// Fire-and-forget message sink.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, title: &str, message: &str) -> GatewayResult<()>;
}
