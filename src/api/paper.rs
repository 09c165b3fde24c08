//! Simulated account for dry runs.
//!
//! Market data passes through to a live gateway; orders fill against the
//! latest quote with slippage and fees, and cash and holdings live in memory.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::models::{OrderIntent, OrderSide};

use super::error::{GatewayError, GatewayResult};
use super::types::*;
use super::ExecutionGateway;

/// Paper trading configuration.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    /// Starting cash
    pub initial_capital: Decimal,

    /// Simulated slippage (0.0 to 1.0)
    pub slippage: Decimal,

    /// Simulated fee rate (0.0 to 1.0)
    pub fee_rate: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(10000),
            slippage: dec!(0.003),
            fee_rate: dec!(0.001),
        }
    }
}

#[derive(Debug, Clone)]
struct PaperHolding {
    quantity: Decimal,
    average_price: Decimal,
}

#[derive(Debug)]
struct PaperAccount {
    cash: Decimal,
    holdings: HashMap<String, PaperHolding>,
    realized_pnl: Decimal,
    total_fees: Decimal,
    fills: usize,
}

/// Execution gateway that never touches the real account.
pub struct PaperGateway {
    market: Arc<dyn ExecutionGateway>,
    config: PaperConfig,
    account: Mutex<PaperAccount>,
    started_at: DateTime<Utc>,
}

impl PaperGateway {
    pub fn new(market: Arc<dyn ExecutionGateway>, config: PaperConfig) -> Self {
        let account = PaperAccount {
            cash: config.initial_capital,
            holdings: HashMap::new(),
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            fills: 0,
        };

        Self {
            market,
            config,
            account: Mutex::new(account),
            started_at: Utc::now(),
        }
    }

    fn apply_slippage(&self, price: Decimal, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => price * (Decimal::ONE + self.config.slippage),
            OrderSide::Sell => price * (Decimal::ONE - self.config.slippage),
        }
    }

    /// Cash a buy can commit once slippage and fees are added on top.
    fn spendable(&self, cash: Decimal) -> Decimal {
        let cost_factor =
            (Decimal::ONE + self.config.slippage) * (Decimal::ONE + self.config.fee_rate);
        (cash / cost_factor).round_dp_with_strategy(2, RoundingStrategy::ToZero)
    }

    pub async fn stats(&self) -> PaperStats {
        let account = self.account.lock().await;
        let invested: Decimal = account
            .holdings
            .values()
            .map(|h| h.quantity * h.average_price)
            .sum();

        PaperStats {
            initial_capital: self.config.initial_capital,
            cash_available: account.cash,
            invested_at_cost: invested,
            realized_pnl: account.realized_pnl,
            open_positions: account.holdings.len(),
            fills: account.fills,
            total_fees: account.total_fees,
            running_since: self.started_at,
        }
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn quote(&self, symbol: &str) -> GatewayResult<Quote> {
        self.market.quote(symbol).await
    }

    async fn historicals(&self, symbol: &str) -> GatewayResult<Vec<Bar>> {
        self.market.historicals(symbol).await
    }

    async fn options_volume(&self, symbol: &str) -> GatewayResult<OptionsVolume> {
        self.market.options_volume(symbol).await
    }

    async fn fundamentals(&self, symbol: &str) -> GatewayResult<Fundamentals> {
        self.market.fundamentals(symbol).await
    }

    async fn holdings(&self, symbol: &str) -> GatewayResult<Decimal> {
        let account = self.account.lock().await;
        Ok(account
            .holdings
            .get(&symbol.to_uppercase())
            .map(|h| h.quantity)
            .unwrap_or(Decimal::ZERO))
    }

    async fn place_order(&self, intent: &OrderIntent) -> GatewayResult<OrderConfirmation> {
        if intent.quantity <= Decimal::ZERO {
            return Err(GatewayError::Rejected("quantity must be positive".to_string()));
        }

        let quote = self.market.quote(&intent.symbol).await?;
        let fill_price = self.apply_slippage(quote.last_trade_price, intent.side);
        let notional = fill_price * intent.quantity;
        let fee = notional * self.config.fee_rate;
        let symbol = intent.symbol.to_uppercase();

        let mut account = self.account.lock().await;
        match intent.side {
            OrderSide::Buy => {
                if notional + fee > account.cash {
                    return Err(GatewayError::Rejected(format!(
                        "insufficient paper cash: need {:.2}, have {:.2}",
                        notional + fee,
                        account.cash
                    )));
                }
                account.cash -= notional + fee;

                let holding = account.holdings.entry(symbol.clone()).or_insert(PaperHolding {
                    quantity: Decimal::ZERO,
                    average_price: Decimal::ZERO,
                });
                let total_qty = holding.quantity + intent.quantity;
                holding.average_price =
                    (holding.average_price * holding.quantity + notional) / total_qty;
                holding.quantity = total_qty;
            }
            OrderSide::Sell => {
                let holding = account
                    .holdings
                    .get(&symbol)
                    .cloned()
                    .ok_or_else(|| GatewayError::Rejected(format!("no paper holding in {}", symbol)))?;
                if intent.quantity > holding.quantity {
                    return Err(GatewayError::Rejected(format!(
                        "cannot sell {} {}, holding {}",
                        intent.quantity, symbol, holding.quantity
                    )));
                }

                account.cash += notional - fee;
                account.realized_pnl += (fill_price - holding.average_price) * intent.quantity - fee;

                let remaining = holding.quantity - intent.quantity;
                if remaining.is_zero() {
                    account.holdings.remove(&symbol);
                } else if let Some(h) = account.holdings.get_mut(&symbol) {
                    h.quantity = remaining;
                }
            }
        }
        account.total_fees += fee;
        account.fills += 1;

        info!(
            symbol = %symbol,
            side = %intent.side,
            quantity = %intent.quantity,
            price = %fill_price.round_dp(4),
            cash = %account.cash.round_dp(2),
            "Paper fill"
        );

        Ok(OrderConfirmation {
            order_id: format!("paper-{}", Uuid::new_v4()),
            ref_id: intent.ref_id,
            symbol,
            side: intent.side,
            quantity: intent.quantity,
            fill_price: Some(fill_price),
            state: "filled".to_string(),
        })
    }

    async fn account_profile(&self) -> GatewayResult<AccountProfile> {
        let account = self.account.lock().await;
        Ok(AccountProfile {
            buying_power: self.spendable(account.cash),
            cash: account.cash,
        })
    }

    async fn open_positions(&self) -> GatewayResult<Vec<BrokerPosition>> {
        let account = self.account.lock().await;
        Ok(account
            .holdings
            .iter()
            .map(|(symbol, h)| BrokerPosition {
                symbol: symbol.clone(),
                quantity: h.quantity,
                average_buy_price: h.average_price,
            })
            .collect())
    }
}

/// Paper account summary.
#[derive(Debug, Clone)]
pub struct PaperStats {
    pub initial_capital: Decimal,
    pub cash_available: Decimal,
    pub invested_at_cost: Decimal,
    pub realized_pnl: Decimal,
    pub open_positions: usize,
    pub fills: usize,
    pub total_fees: Decimal,
    pub running_since: DateTime<Utc>,
}

impl fmt::Display for PaperStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n{:=^50}", " PAPER ACCOUNT ")?;
        writeln!(f, "Running since:    {}", self.running_since.format("%Y-%m-%d %H:%M"))?;
        writeln!(f, "Initial Capital:  ${:.2}", self.initial_capital)?;
        writeln!(f, "Cash Available:   ${:.2}", self.cash_available)?;
        writeln!(f, "Invested (cost):  ${:.2}", self.invested_at_cost)?;
        writeln!(f, "Realized P&L:     ${:.2}", self.realized_pnl)?;
        writeln!(f, "Open Positions:   {}", self.open_positions)?;
        writeln!(f, "Fills:            {}", self.fills)?;
        writeln!(f, "Total Fees:       ${:.2}", self.total_fees)?;
        writeln!(f, "{:=^50}", "")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockGateway;
    use crate::trading::{PositionSizer, TradingConfig};

    fn paper(price: Decimal) -> PaperGateway {
        let market = MockGateway::new();
        market.set_price("TSLA", price);
        PaperGateway::new(
            Arc::new(market),
            PaperConfig {
                initial_capital: dec!(1000),
                slippage: Decimal::ZERO,
                fee_rate: Decimal::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn test_buy_then_sell_updates_cash_and_holdings() {
        let gw = paper(dec!(100));

        let buy = OrderIntent::new("TSLA", OrderSide::Buy, dec!(3), dec!(100), "entry");
        let conf = gw.place_order(&buy).await.unwrap();
        assert_eq!(conf.fill_price, Some(dec!(100)));
        assert_eq!(gw.holdings("TSLA").await.unwrap(), dec!(3));
        assert_eq!(gw.account_profile().await.unwrap().buying_power, dec!(700));

        let sell = OrderIntent::new("TSLA", OrderSide::Sell, dec!(3), dec!(100), "exit");
        gw.place_order(&sell).await.unwrap();
        assert_eq!(gw.holdings("TSLA").await.unwrap(), Decimal::ZERO);
        assert!(gw.open_positions().await.unwrap().is_empty());

        let stats = gw.stats().await;
        assert_eq!(stats.cash_available, dec!(1000));
        assert_eq!(stats.fills, 2);
    }

    #[tokio::test]
    async fn test_rejects_overspend_and_oversell() {
        let gw = paper(dec!(100));

        let too_big = OrderIntent::new("TSLA", OrderSide::Buy, dec!(11), dec!(100), "entry");
        assert!(matches!(
            gw.place_order(&too_big).await,
            Err(GatewayError::Rejected(_))
        ));

        let naked = OrderIntent::new("TSLA", OrderSide::Sell, dec!(1), dec!(100), "exit");
        assert!(matches!(
            gw.place_order(&naked).await,
            Err(GatewayError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_slippage_and_fees() {
        let market = MockGateway::new();
        market.set_price("ETH", dec!(100));
        let gw = PaperGateway::new(Arc::new(market), PaperConfig::default());

        let buy = OrderIntent::new("ETH", OrderSide::Buy, dec!(1), dec!(100), "entry");
        let conf = gw.place_order(&buy).await.unwrap();
        assert_eq!(conf.fill_price, Some(dec!(100.3)));

        let stats = gw.stats().await;
        assert_eq!(stats.total_fees, dec!(0.1003));
    }

    #[tokio::test]
    async fn test_buying_power_leaves_room_for_costs() {
        let market = MockGateway::new();
        market.set_price("TSLA", dec!(100));
        let gw = PaperGateway::new(Arc::new(market), PaperConfig::default());

        let profile = gw.account_profile().await.unwrap();
        assert_eq!(profile.cash, dec!(10000));
        // 10000 / (1.003 * 1.001)
        assert_eq!(profile.buying_power, dec!(9960.12));
    }

    #[tokio::test]
    async fn test_full_size_entry_fills() {
        let market = MockGateway::new();
        market.set_price("TSLA", dec!(100));
        let gw = PaperGateway::new(Arc::new(market), PaperConfig::default());
        let sizer = PositionSizer::new(TradingConfig::default());

        let buying_power = gw.account_profile().await.unwrap().buying_power;
        let sizing = sizer.quantity(buying_power, dec!(100), 1.5);
        assert!(sizing.allowed);
        let quantity = sizing.adjusted_size.unwrap();
        assert_eq!(quantity, dec!(99));

        let buy = OrderIntent::new("TSLA", OrderSide::Buy, quantity, dec!(100), "entry");
        gw.place_order(&buy).await.unwrap();
        assert_eq!(gw.holdings("TSLA").await.unwrap(), dec!(99));

        // 10000 - 99 * 100.3 * 1.001
        let stats = gw.stats().await;
        assert_eq!(stats.cash_available, dec!(60.3703));
    }
}
