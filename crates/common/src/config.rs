//! Scanner configuration types.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::League;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Kalshi API key ID.
    #[serde(default)]
    pub api_key: String,

    /// RSA private key PEM (with literal \n for newlines). Imported into
    /// the key store on start when set.
    #[serde(default, skip_serializing)]
    pub secret_key: String,

    /// Use demo environment (true) or production (false).
    #[serde(default = "default_true")]
    pub use_demo: bool,

    /// Overrides the exchange base URL (scheme + host, no path).
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Directory holding the imported signing key.
    #[serde(default)]
    pub key_store_dir: Option<PathBuf>,

    /// Sport whose winner markets are traded.
    #[serde(default = "default_league")]
    pub league: League,

    /// Series tickers to list instruments from. Empty = league default.
    #[serde(default)]
    pub series_tickers: Vec<String>,

    /// Team label → exchange abbreviation overrides.
    #[serde(default)]
    pub team_overrides: HashMap<String, String>,

    /// Where model predictions are read from.
    #[serde(default)]
    pub predictions: PredictionsConfig,

    /// Trading loop settings.
    #[serde(default)]
    pub scanner: ScannerConfig,
}

impl AppConfig {
    /// Series tickers to scan, falling back to the league default.
    pub fn effective_series(&self) -> Vec<String> {
        if self.series_tickers.is_empty() {
            vec![self.league.default_series_ticker().to_string()]
        } else {
            self.series_tickers.clone()
        }
    }

    /// Fill settings whose defaults depend on the league.
    pub fn apply_league_defaults(&mut self) {
        if self.predictions.table.trim().is_empty() {
            self.predictions.table = self.league.default_predictions_table().to_string();
        }
    }
}

/// Hosted predictions table (PostgREST).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionsConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    #[serde(default)]
    pub url: String,

    /// Service or anon key, sent as `apikey` and bearer token.
    #[serde(default, skip_serializing)]
    pub api_key: String,

    /// Table the model writes predictions into. Empty = league default.
    #[serde(default)]
    pub table: String,
}

/// How order size is derived from `amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    /// `amount` is a contract count.
    Contracts,
    /// `amount` is a dollar budget per order.
    Dollars,
}

impl SizingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contracts => "contracts",
            Self::Dollars => "dollars",
        }
    }
}

impl std::str::FromStr for SizingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contracts" => Ok(Self::Contracts),
            "dollars" => Ok(Self::Dollars),
            other => Err(format!("unknown sizing mode {other:?} (contracts|dollars)")),
        }
    }
}

/// User-adjustable scanner settings, read at the start of every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Orders are placed only when edge strictly exceeds this (percent points).
    #[serde(default = "default_edge_threshold")]
    pub edge_threshold_percent: f64,

    #[serde(default = "default_sizing_mode")]
    pub sizing_mode: SizingMode,

    /// Contracts or dollars per order, depending on `sizing_mode`.
    #[serde(default = "default_amount")]
    pub amount: f64,

    /// Wait between cycle completions.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ScannerConfig {
    /// Collect every invalid field into a list of issues.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !(self.edge_threshold_percent.is_finite() && self.edge_threshold_percent > 0.0) {
            issues.push("scanner.edge_threshold_percent must be > 0".into());
        }
        if !(self.amount.is_finite() && self.amount > 0.0) {
            issues.push("scanner.amount must be > 0".into());
        }
        if self.poll_interval_secs == 0 {
            issues.push("scanner.poll_interval_secs must be > 0".into());
        }
        issues
    }
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_league() -> League {
    League::Mlb
}
fn default_edge_threshold() -> f64 {
    10.0
}
fn default_sizing_mode() -> SizingMode {
    SizingMode::Contracts
}
fn default_amount() -> f64 {
    10.0
}
fn default_poll_interval() -> u64 {
    30
}

impl Default for PredictionsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: String::new(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            edge_threshold_percent: default_edge_threshold(),
            sizing_mode: default_sizing_mode(),
            amount: default_amount(),
            poll_interval_secs: default_poll_interval(),
            enabled: default_true(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            use_demo: true,
            api_base_url: None,
            key_store_dir: None,
            league: default_league(),
            series_tickers: Vec::new(),
            team_overrides: HashMap::new(),
            predictions: PredictionsConfig::default(),
            scanner: ScannerConfig::default(),
        }
    }
}
