//! Order execution over the exchange capability interface.
//!
//! Every call is wrapped in exponential backoff: a transient failure retries
//! the same logical operation, and exhaustion surfaces as a hard failure for
//! the current cycle only.

use anyhow::Result;
use atlas_core::config::ExecutionConfig;
use atlas_core::{retry, ExchangeClient, MarginType, OrderAck, OrderSide, PositionSide};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    attempts: u32,
    base_delay: Duration,
}

impl OrderExecutor {
    #[must_use]
    pub fn new(client: Arc<dyn ExchangeClient>, config: &ExecutionConfig) -> Self {
        Self {
            client,
            attempts: config.retry_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Configures leverage and isolated margin for a symbol before trading.
    ///
    /// # Errors
    /// Returns the final error once retries are exhausted.
    pub async fn setup_symbol(&self, symbol: &str, leverage: u8) -> Result<()> {
        retry::with_backoff("set_leverage", self.attempts, self.base_delay, || {
            self.client.set_leverage(symbol, leverage)
        })
        .await?;
        retry::with_backoff("set_margin_type", self.attempts, self.base_delay, || {
            self.client.set_margin_type(symbol, MarginType::Isolated)
        })
        .await
    }

    /// Current wallet balance.
    ///
    /// # Errors
    /// Returns the final error once retries are exhausted.
    pub async fn balance(&self) -> Result<Decimal> {
        retry::with_backoff("get_balance", self.attempts, self.base_delay, || {
            self.client.balance()
        })
        .await
    }

    /// Whether the account can support `required_margin` for `symbol`.
    ///
    /// # Errors
    /// Returns the final error once retries are exhausted.
    pub async fn validate_margin(&self, symbol: &str, required_margin: Decimal) -> Result<bool> {
        retry::with_backoff("validate_margin", self.attempts, self.base_delay, || {
            self.client.validate_margin(symbol, required_margin)
        })
        .await
    }

    /// Places the entry order for a new position.
    ///
    /// # Errors
    /// Returns the final error once retries are exhausted.
    pub async fn open_market(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
    ) -> Result<OrderAck> {
        let order_side = match side {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        };
        retry::with_backoff("open_market", self.attempts, self.base_delay, || {
            self.client
                .place_market_order(symbol, order_side, quantity, false)
        })
        .await
    }

    /// Places a reduce-only order closing part or all of a position.
    ///
    /// # Errors
    /// Returns the final error once retries are exhausted.
    pub async fn close_market(
        &self,
        symbol: &str,
        side: PositionSide,
        quantity: Decimal,
    ) -> Result<OrderAck> {
        let order_side = match side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        };
        retry::with_backoff("close_market", self.attempts, self.base_delay, || {
            self.client
                .place_market_order(symbol, order_side, quantity, true)
        })
        .await
    }
}
