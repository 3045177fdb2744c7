//! Domain types shared across the scanner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Predictions ───────────────────────────────────────────────────────

/// Lifecycle of a contest as reported by the predictions pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Upcoming,
    Live,
    Final,
    Postponed,
}

impl GameStatus {
    /// Map the pipeline's numeric status column (1-4).
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Upcoming),
            2 => Some(Self::Live),
            3 => Some(Self::Final),
            4 => Some(Self::Postponed),
            _ => None,
        }
    }
}

/// A model prediction for one upcoming contest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub contest_id: String,
    pub home_label: String,
    pub away_label: String,
    /// Model probability that the home side wins, `None` until the model
    /// has scored the game.
    pub home_win_probability: Option<f64>,
    pub status: GameStatus,
}

/// Which sport's contracts the scanner trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum League {
    Mlb,
    Nba,
}

impl League {
    /// Kalshi series ticker for single-game winner markets.
    pub fn default_series_ticker(&self) -> &'static str {
        match self {
            Self::Mlb => "KXMLBGAME",
            Self::Nba => "KXNBAGAME",
        }
    }

    /// PostgREST table each league's pipeline writes game rows into.
    pub fn default_predictions_table(&self) -> &'static str {
        match self {
            Self::Mlb => "mlb_gamelogs",
            Self::Nba => "games",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mlb => "mlb",
            Self::Nba => "nba",
        }
    }
}

// ── Instruments & Opportunities ───────────────────────────────────────

/// A tradable binary market, with prices normalised to dollars (0-1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub ticker: String,
    pub event_ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    pub yes_ask: Option<f64>,
    pub no_ask: Option<f64>,
    pub yes_bid: Option<f64>,
    pub no_bid: Option<f64>,
    pub close_time: Option<DateTime<Utc>>,
}

/// Query parameters for instrument listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentFilter {
    pub series_ticker: Option<String>,
    pub status: Option<String>,
    pub limit: u32,
}

impl InstrumentFilter {
    /// Open markets of one series.
    pub fn open_series(series_ticker: &str) -> Self {
        Self {
            series_ticker: Some(series_ticker.to_string()),
            status: Some("open".to_string()),
            limit: 200,
        }
    }
}

/// A prediction paired with the winner's YES contract and its edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedOpportunity {
    pub contest_id: String,
    pub predicted_winner_label: String,
    /// Probability of the predicted winner (>= 0.5).
    pub model_probability: f64,
    /// Best ask of the YES side, read as an implied probability.
    pub market_implied_probability: f64,
    /// `(model - market) * 100`, in probability points.
    pub edge_percent: f64,
    pub instrument_ticker: String,
    pub side: Side,
}

// ── Orders & Portfolio ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
}

/// An order as acknowledged by the exchange. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub order_id: String,
    pub client_order_id: String,
    pub ticker: String,
    pub side: Side,
    pub action: Action,
    pub count: i64,
    /// Limit price in dollars.
    pub price: f64,
    pub status: String,
}

/// Exposure held in one market.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub ticker: String,
    /// Net contracts (positive = YES, negative = NO).
    pub position: i64,
    /// Cost basis in dollars.
    pub market_exposure: f64,
    pub realized_pnl: f64,
}

// ── Kalshi wire types ─────────────────────────────────────────────────

/// Price/amount fields arrive either as a decimal dollar string or as
/// integer cents. The decimal string wins when present and parseable.
pub fn price_from_fields(dollars: Option<&str>, cents: Option<i64>) -> Option<f64> {
    dollars
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .or_else(|| cents.map(|c| c as f64 / 100.0))
}

/// A market as returned by GET /trade-api/v2/markets.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketInfo {
    pub ticker: String,
    pub event_ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub yes_bid: Option<i64>,
    #[serde(default)]
    pub yes_bid_dollars: Option<String>,
    #[serde(default)]
    pub yes_ask: Option<i64>,
    #[serde(default)]
    pub yes_ask_dollars: Option<String>,
    #[serde(default)]
    pub no_bid: Option<i64>,
    #[serde(default)]
    pub no_bid_dollars: Option<String>,
    #[serde(default)]
    pub no_ask: Option<i64>,
    #[serde(default)]
    pub no_ask_dollars: Option<String>,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
}

impl From<MarketInfo> for Instrument {
    fn from(m: MarketInfo) -> Self {
        Instrument {
            yes_ask: price_from_fields(m.yes_ask_dollars.as_deref(), m.yes_ask),
            no_ask: price_from_fields(m.no_ask_dollars.as_deref(), m.no_ask),
            yes_bid: price_from_fields(m.yes_bid_dollars.as_deref(), m.yes_bid),
            no_bid: price_from_fields(m.no_bid_dollars.as_deref(), m.no_bid),
            ticker: m.ticker,
            event_ticker: m.event_ticker,
            title: m.title,
            status: m.status,
            close_time: m.close_time,
        }
    }
}

/// Paginated response from GET /trade-api/v2/markets.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsResponse {
    #[serde(default)]
    pub markets: Vec<MarketInfo>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Order request body for Kalshi API.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub ticker: String,
    pub side: Side,
    pub action: Action,
    pub client_order_id: String,
    pub count: i64,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yes_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_price: Option<i64>,
}

/// Response from POST /trade-api/v2/portfolio/orders.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponse {
    pub order: OrderInfo,
}

/// An order as returned by the Kalshi API.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderInfo {
    pub order_id: String,
    #[serde(default)]
    pub client_order_id: String,
    pub ticker: String,
    pub side: Side,
    pub action: Action,
    pub status: String,
    #[serde(default)]
    pub yes_price: Option<i64>,
    #[serde(default)]
    pub yes_price_dollars: Option<String>,
    #[serde(default)]
    pub no_price: Option<i64>,
    #[serde(default)]
    pub no_price_dollars: Option<String>,
    #[serde(default)]
    pub initial_count: Option<i64>,
    #[serde(default)]
    pub fill_count: i64,
    #[serde(default)]
    pub remaining_count: i64,
}

impl OrderInfo {
    /// Convert to the domain order, falling back to the requested count
    /// when the exchange omits `initial_count`.
    pub fn into_order(self, requested_count: i64) -> Order {
        let price = match self.side {
            Side::Yes => price_from_fields(self.yes_price_dollars.as_deref(), self.yes_price),
            Side::No => price_from_fields(self.no_price_dollars.as_deref(), self.no_price),
        };
        Order {
            count: self.initial_count.unwrap_or(requested_count),
            price: price.unwrap_or(0.0),
            order_id: self.order_id,
            client_order_id: self.client_order_id,
            ticker: self.ticker,
            side: self.side,
            action: self.action,
            status: self.status,
        }
    }
}

/// A position row from GET /trade-api/v2/portfolio/positions.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketPosition {
    pub ticker: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub market_exposure: Option<i64>,
    #[serde(default)]
    pub market_exposure_dollars: Option<String>,
    #[serde(default)]
    pub realized_pnl: Option<i64>,
    #[serde(default)]
    pub realized_pnl_dollars: Option<String>,
}

impl From<MarketPosition> for Position {
    fn from(p: MarketPosition) -> Self {
        Position {
            market_exposure: price_from_fields(
                p.market_exposure_dollars.as_deref(),
                p.market_exposure,
            )
            .unwrap_or(0.0),
            realized_pnl: price_from_fields(p.realized_pnl_dollars.as_deref(), p.realized_pnl)
                .unwrap_or(0.0),
            ticker: p.ticker,
            position: p.position,
        }
    }
}

/// Portfolio positions response.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionsResponse {
    #[serde(default)]
    pub market_positions: Vec<MarketPosition>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    #[serde(default)]
    pub balance: Option<i64>,
    #[serde(default)]
    pub balance_dollars: Option<String>,
}

impl BalanceResponse {
    /// Balance in dollars.
    pub fn dollars(&self) -> f64 {
        price_from_fields(self.balance_dollars.as_deref(), self.balance).unwrap_or(0.0)
    }
}
