use crate::candle::{Candle, Timeframe};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of an order sent to the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Margin mode for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginType {
    Isolated,
    Cross,
}

/// Acknowledgement returned by the exchange for a filled market order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Supplier of historical or streaming candle sequences.
///
/// Implementations must return candles oldest first and gap-free within the
/// requested window.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> Result<Vec<Candle>>;
}

/// Minimal exchange capability surface the engine consumes.
///
/// Every call is assumed to fail occasionally and to be safe to retry: a
/// transient failure retries the same logical operation rather than
/// duplicating a position.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn balance(&self) -> Result<Decimal>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<OrderAck>;

    async fn validate_margin(&self, symbol: &str, required_margin: Decimal) -> Result<bool>;

    async fn set_leverage(&self, symbol: &str, leverage: u8) -> Result<()>;

    async fn set_margin_type(&self, symbol: &str, margin_type: MarginType) -> Result<()>;
}
