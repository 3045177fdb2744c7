//! In-memory fakes for scanner tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{
    Action, Error, GameStatus, Instrument, InstrumentFilter, Order, Position, Prediction, Side,
};
use kalshi_client::ExchangeApi;
use predictions_client::PredictionSource;

use crate::events::{EventSink, ScanEvent};

pub fn prediction(id: &str, home: &str, away: &str, p: Option<f64>) -> Prediction {
    Prediction {
        contest_id: id.into(),
        home_label: home.into(),
        away_label: away.into(),
        home_win_probability: p,
        status: GameStatus::Upcoming,
    }
}

pub fn instrument(ticker: &str, event: &str, yes_ask: f64) -> Instrument {
    Instrument {
        ticker: ticker.into(),
        event_ticker: event.into(),
        title: String::new(),
        status: "active".into(),
        yes_ask: Some(yes_ask),
        no_ask: Some(1.0 - yes_ask),
        yes_bid: None,
        no_bid: None,
        close_time: None,
    }
}

#[derive(Default)]
pub struct FakePredictions {
    pub predictions: Mutex<Vec<Prediction>>,
    pub error: Mutex<Option<String>>,
    pub calls: AtomicUsize,
}

impl FakePredictions {
    pub fn new(predictions: Vec<Prediction>) -> Self {
        Self {
            predictions: Mutex::new(predictions),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PredictionSource for FakePredictions {
    async fn predictions_for(&self, _date: NaiveDate) -> Result<Vec<Prediction>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.error.lock().unwrap().clone() {
            return Err(Error::Predictions(msg));
        }
        Ok(self.predictions.lock().unwrap().clone())
    }
}

/// Exchange fake: serves fixed instruments and records orders. Queued
/// failures are returned by the next `place_order` calls, in order.
#[derive(Default)]
pub struct FakeExchange {
    pub instruments: Mutex<Vec<Instrument>>,
    pub filters: Mutex<Vec<InstrumentFilter>>,
    pub orders: Mutex<Vec<(String, Side, i64, f64)>>,
    pub order_failures: Mutex<Vec<Error>>,
    pub listing_error: Mutex<Option<Error>>,
}

impl FakeExchange {
    pub fn new(instruments: Vec<Instrument>) -> Self {
        Self {
            instruments: Mutex::new(instruments),
            ..Default::default()
        }
    }

    pub fn fail_next_order(&self, err: Error) {
        self.order_failures.lock().unwrap().push(err);
    }

    pub fn orders(&self) -> Vec<(String, Side, i64, f64)> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeApi for FakeExchange {
    async fn get_balance(&self) -> Result<f64, Error> {
        Ok(100.0)
    }

    async fn get_positions(&self) -> Result<Vec<Position>, Error> {
        Ok(Vec::new())
    }

    async fn list_instruments(&self, filter: &InstrumentFilter) -> Result<Vec<Instrument>, Error> {
        self.filters.lock().unwrap().push(filter.clone());
        if let Some(err) = self.listing_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.instruments.lock().unwrap().clone())
    }

    async fn place_order(
        &self,
        ticker: &str,
        side: Side,
        count: i64,
        price: f64,
    ) -> Result<Order, Error> {
        {
            let mut failures = self.order_failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push((ticker.to_string(), side, count, price));
        Ok(Order {
            order_id: format!("ord-{}", orders.len()),
            client_order_id: format!("cli-{}", orders.len()),
            ticker: ticker.to_string(),
            side,
            action: Action::Buy,
            count,
            price,
            status: "resting".into(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ScanEvent>>,
}

impl RecordingSink {
    pub fn labels(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.label()).collect()
    }

    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, event: &ScanEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
