//! Model predictions source.
//!
//! The prediction pipeline writes one row per game into a hosted Postgres
//! table exposed through PostgREST. This crate reads the rows for one
//! calendar date and converts them into [`Prediction`]s.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use common::config::PredictionsConfig;
use common::{Error, GameStatus, Prediction};
use serde::Deserialize;
use tracing::{debug, warn};

const DEFAULT_PAGE_SIZE: usize = 1000;
const SELECT_COLUMNS: &str = "GAME_ID,GAME_DATE,HOME_NAME,AWAY_NAME,PREDICTION_PCT,GAME_STATUS";

/// Anything that can supply the day's predictions.
#[async_trait]
pub trait PredictionSource: Send + Sync {
    async fn predictions_for(&self, date: NaiveDate) -> Result<Vec<Prediction>, Error>;
}

// ── Table rows ────────────────────────────────────────────────────────

/// One row of the gamelogs table. Numeric columns are loosely typed
/// because PostgREST returns `numeric` as either a number or a string.
#[derive(Debug, Deserialize)]
pub struct GameRow {
    #[serde(rename = "GAME_ID")]
    pub game_id: serde_json::Value,
    #[serde(rename = "GAME_DATE", default)]
    pub game_date: Option<String>,
    #[serde(rename = "HOME_NAME", default)]
    pub home_name: String,
    #[serde(rename = "AWAY_NAME", default)]
    pub away_name: String,
    #[serde(rename = "PREDICTION_PCT", default)]
    pub prediction_pct: Option<serde_json::Value>,
    #[serde(rename = "GAME_STATUS", default)]
    pub game_status: Option<serde_json::Value>,
}

fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl GameRow {
    /// `None` when the row cannot be read as a game (missing id or team
    /// names, unknown status code).
    pub fn into_prediction(self) -> Option<Prediction> {
        let contest_id = value_as_string(&self.game_id);
        if self.game_id.is_null() || self.home_name.is_empty() || self.away_name.is_empty() {
            debug!("Skipping incomplete row: {:?}", self);
            return None;
        }

        let status = match self.game_status.as_ref().and_then(value_as_f64) {
            None => GameStatus::Upcoming,
            Some(code) => match GameStatus::from_code(code as i64) {
                Some(status) => status,
                None => {
                    warn!("{}: unknown GAME_STATUS {}", contest_id, code);
                    return None;
                }
            },
        };

        let home_win_probability = self
            .prediction_pct
            .as_ref()
            .and_then(value_as_f64)
            .filter(|p| p.is_finite());

        Some(Prediction {
            contest_id,
            home_label: self.home_name,
            away_label: self.away_name,
            home_win_probability,
            status,
        })
    }
}

// ── PostgREST backend ─────────────────────────────────────────────────

/// Reads predictions from a PostgREST table such as `mlb_gamelogs`.
#[derive(Debug, Clone)]
pub struct TablePredictionSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
    page_size: usize,
}

impl TablePredictionSource {
    pub fn new(config: &PredictionsConfig) -> Result<Self, Error> {
        if config.url.trim().is_empty() {
            return Err(Error::Config("predictions.url is not set".into()));
        }

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(|e| Error::Predictions(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            table: config.table.clone(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    async fn fetch_page(
        &self,
        query: &[(&str, String)],
        offset: usize,
    ) -> Result<Vec<GameRow>, Error> {
        let range = format!("{}-{}", offset, offset + self.page_size - 1);

        let resp = self
            .client
            .get(self.table_url())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Range-Unit", "items")
            .header("Range", &range)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Predictions(format!("HTTP error for {}: {}", self.table, e)))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Predictions(format!(
                "{} returned {}: {}",
                self.table,
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::Predictions(format!("bad rows from {}: {}", self.table, e)))
    }
}

/// Filter for rows whose `GAME_DATE` falls on `date` (UTC day).
pub fn date_query(date: NaiveDate) -> Vec<(&'static str, String)> {
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    vec![
        ("select", SELECT_COLUMNS.to_string()),
        ("GAME_DATE", format!("gte.{date}")),
        ("GAME_DATE", format!("lt.{next}")),
        ("order", "GAME_ID.asc".to_string()),
    ]
}

#[async_trait]
impl PredictionSource for TablePredictionSource {
    async fn predictions_for(&self, date: NaiveDate) -> Result<Vec<Prediction>, Error> {
        let query = date_query(date);
        let mut predictions = Vec::new();
        let mut offset = 0;

        loop {
            let rows = self.fetch_page(&query, offset).await?;
            let count = rows.len();
            predictions.extend(rows.into_iter().filter_map(GameRow::into_prediction));

            if count < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        debug!(
            "Loaded {} predictions for {} from {}",
            predictions.len(),
            date,
            self.table
        );
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn row(json: &str) -> GameRow {
        serde_json::from_str(json).expect("row should parse")
    }

    #[test]
    fn test_row_with_prediction() {
        let p = row(r#"{"GAME_ID":777001,"GAME_DATE":"2025-06-01T23:05:00+00:00","HOME_NAME":"Boston Red Sox","AWAY_NAME":"New York Yankees","PREDICTION_PCT":0.612,"GAME_STATUS":1}"#)
            .into_prediction()
            .unwrap();
        assert_eq!(p.contest_id, "777001");
        assert_eq!(p.home_label, "Boston Red Sox");
        assert_eq!(p.away_label, "New York Yankees");
        assert_eq!(p.home_win_probability, Some(0.612));
        assert_eq!(p.status, GameStatus::Upcoming);
    }

    #[test]
    fn test_row_without_prediction_keeps_null() {
        let p = row(r#"{"GAME_ID":"778","HOME_NAME":"Chicago Cubs","AWAY_NAME":"Miami Marlins","PREDICTION_PCT":null,"GAME_STATUS":2}"#)
            .into_prediction()
            .unwrap();
        assert_eq!(p.contest_id, "778");
        assert_eq!(p.home_win_probability, None);
        assert_eq!(p.status, GameStatus::Live);
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let p = row(r#"{"GAME_ID":1,"HOME_NAME":"A","AWAY_NAME":"B","PREDICTION_PCT":"0.45","GAME_STATUS":"3"}"#)
            .into_prediction()
            .unwrap();
        assert_eq!(p.home_win_probability, Some(0.45));
        assert_eq!(p.status, GameStatus::Final);
    }

    #[test]
    fn test_unusable_rows_skipped() {
        assert!(row(r#"{"GAME_ID":1,"HOME_NAME":"A","AWAY_NAME":"B","GAME_STATUS":9}"#)
            .into_prediction()
            .is_none());
        assert!(row(r#"{"GAME_ID":null,"HOME_NAME":"A","AWAY_NAME":"B"}"#)
            .into_prediction()
            .is_none());
        assert!(row(r#"{"GAME_ID":2,"HOME_NAME":"","AWAY_NAME":"B"}"#)
            .into_prediction()
            .is_none());
    }

    #[test]
    fn test_date_query_bounds_one_day() {
        let q = date_query(NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        assert!(q.contains(&("GAME_DATE", "gte.2025-06-30".to_string())));
        assert!(q.contains(&("GAME_DATE", "lt.2025-07-01".to_string())));
    }

    #[test]
    fn test_missing_url_is_config_error() {
        let err = TablePredictionSource::new(&PredictionsConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    /// Serves each body on its own connection and returns the raw requests.
    async fn serve(bodies: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for body in bodies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 2048];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                seen.push(String::from_utf8_lossy(&buf).to_string());
                let reply = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
            seen
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let page1 = r#"[{"GAME_ID":1,"HOME_NAME":"Boston Red Sox","AWAY_NAME":"New York Yankees","PREDICTION_PCT":0.7,"GAME_STATUS":1},{"GAME_ID":2,"HOME_NAME":"Chicago Cubs","AWAY_NAME":"Miami Marlins","PREDICTION_PCT":null,"GAME_STATUS":1}]"#;
        let page2 = r#"[{"GAME_ID":3,"HOME_NAME":"Texas Rangers","AWAY_NAME":"Houston Astros","PREDICTION_PCT":0.4,"GAME_STATUS":1}]"#;
        let (url, server) = serve(vec![page1, page2]).await;

        let config = PredictionsConfig {
            url,
            api_key: "anon-key".into(),
            table: "mlb_gamelogs".into(),
        };
        let source = TablePredictionSource::new(&config).unwrap().with_page_size(2);
        let predictions = source
            .predictions_for(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
            .await
            .unwrap();

        let ids: Vec<&str> = predictions.iter().map(|p| p.contest_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
        let first = requests[0].to_lowercase();
        assert!(first.starts_with("get /rest/v1/mlb_gamelogs?"));
        assert!(first.contains("apikey: anon-key"));
        assert!(first.contains("authorization: bearer anon-key"));
        assert!(first.contains("range: 0-1"));
        assert!(requests[1].to_lowercase().contains("range: 2-3"));
    }
}
