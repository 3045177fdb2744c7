//! Exchange seam consumed by the scanner.

use async_trait::async_trait;
use common::{Error, Instrument, InstrumentFilter, Order, Position, Side};

use crate::rest::KalshiRestClient;

/// The subset of exchange operations the trading loop needs.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Available balance in dollars.
    async fn get_balance(&self) -> Result<f64, Error>;

    async fn get_positions(&self) -> Result<Vec<Position>, Error>;

    /// Instruments matching `filter`; prices are probabilities in 0..1.
    async fn list_instruments(&self, filter: &InstrumentFilter) -> Result<Vec<Instrument>, Error>;

    /// Submit a buy limit order at `price` for `count` contracts.
    async fn place_order(
        &self,
        ticker: &str,
        side: Side,
        count: i64,
        price: f64,
    ) -> Result<Order, Error>;
}

#[async_trait]
impl ExchangeApi for KalshiRestClient {
    async fn get_balance(&self) -> Result<f64, Error> {
        KalshiRestClient::get_balance(self).await
    }

    async fn get_positions(&self) -> Result<Vec<Position>, Error> {
        KalshiRestClient::get_positions(self).await
    }

    async fn list_instruments(&self, filter: &InstrumentFilter) -> Result<Vec<Instrument>, Error> {
        self.get_markets(filter).await
    }

    async fn place_order(
        &self,
        ticker: &str,
        side: Side,
        count: i64,
        price: f64,
    ) -> Result<Order, Error> {
        KalshiRestClient::place_order(self, ticker, side, count, price).await
    }
}
