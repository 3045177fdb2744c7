//! REST client for the Kalshi trade API.
//!
//! Covers: balance, positions, market listing and order placement.
//! Every request is rate-limited and signed via RSA-PSS.

use std::error::Error as StdError;
use std::time::Duration;

use common::{
    Action, BalanceResponse, CreateOrderRequest, CreateOrderResponse, Error, Instrument,
    InstrumentFilter, MarketsResponse, Order, OrderType, Position, PositionsResponse, Side,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::KalshiAuth;
use crate::rate_limit::RateLimiter;

pub const DEMO_BASE_URL: &str = "https://demo-api.kalshi.co";
pub const PROD_BASE_URL: &str = "https://api.elections.kalshi.com";

const API_PREFIX: &str = "/trade-api/v2";
const POSITIONS_PAGE_LIMIT: &str = "200";

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Pick the base URL: a non-empty override wins, else demo or production.
pub fn resolve_rest_base_url(use_demo: bool, override_url: Option<&str>) -> String {
    if let Some(raw) = override_url {
        let normalized = normalize_base_url(raw);
        if !normalized.is_empty() {
            info!("Using exchange base URL override: {}", normalized);
            return normalized;
        }
        warn!("Ignoring empty exchange base URL override");
    }

    if use_demo {
        DEMO_BASE_URL.to_string()
    } else {
        PROD_BASE_URL.to_string()
    }
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so DNS/TLS/socket failures are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 800;
    let compact = raw.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_CHARS {
        let cut: String = compact.chars().take(MAX_CHARS).collect();
        format!("{cut}…")
    } else {
        compact
    }
}

/// Probability price → integer cents in the tradable 1..=99 range.
fn price_to_cents(price: f64) -> i64 {
    ((price * 100.0).round() as i64).clamp(1, 99)
}

/// Async REST client for the Kalshi trade API.
#[derive(Debug, Clone)]
pub struct KalshiRestClient {
    client: reqwest::Client,
    auth: KalshiAuth,
    base_url: String,
    limiter: RateLimiter,
}

impl KalshiRestClient {
    /// * `use_demo` selects the demo host unless `base_url_override` is set.
    pub fn new(
        auth: KalshiAuth,
        use_demo: bool,
        base_url_override: Option<&str>,
    ) -> Result<Self, Error> {
        let base_url = resolve_rest_base_url(use_demo, base_url_override);

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        Ok(Self {
            client,
            auth,
            base_url,
            limiter: RateLimiter::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Signed GET; `path` is signed without the query string.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        self.limiter.wait_read().await;

        let path = format!("{API_PREFIX}{endpoint}");
        let headers = self.auth.headers("GET", &path)?;

        let resp = self
            .client
            .get(self.url(&path))
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        let status_code = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::KalshiApi {
                status: status_code,
                message: summarize_response_body(&body),
            });
        }

        resp.json()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))
    }

    // ── Read endpoints ────────────────────────────────────────────────

    /// Available balance in dollars.
    pub async fn get_balance(&self) -> Result<f64, Error> {
        let bal: BalanceResponse = self.get_json("/portfolio/balance", &[]).await?;
        Ok(bal.dollars())
    }

    /// All market positions, following the pagination cursor.
    pub async fn get_positions(&self) -> Result<Vec<Position>, Error> {
        let mut all_positions = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("limit", POSITIONS_PAGE_LIMIT.to_string())];
            if let Some(c) = cursor.take() {
                query.push(("cursor", c));
            }

            let page: PositionsResponse = self.get_json("/portfolio/positions", &query).await?;
            let count = page.market_positions.len();
            all_positions.extend(page.market_positions.into_iter().map(Position::from));

            debug!(
                "Fetched {} positions (total: {})",
                count,
                all_positions.len()
            );

            match page.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(all_positions)
    }

    /// Markets matching `filter`, with prices already normalized to 0..1.
    pub async fn get_markets(&self, filter: &InstrumentFilter) -> Result<Vec<Instrument>, Error> {
        let mut instruments = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("limit", filter.limit.to_string())];
            if let Some(ref series) = filter.series_ticker {
                query.push(("series_ticker", series.clone()));
            }
            if let Some(ref status) = filter.status {
                query.push(("status", status.clone()));
            }
            if let Some(c) = cursor.take() {
                query.push(("cursor", c));
            }

            let page: MarketsResponse = self.get_json("/markets", &query).await?;
            let count = page.markets.len();
            instruments.extend(page.markets.into_iter().map(Instrument::from));

            debug!("Fetched {} markets (total: {})", count, instruments.len());

            match page.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(instruments)
    }

    // ── Write endpoints ───────────────────────────────────────────────

    /// Buy `count` contracts of `side` with a limit at `price` (0..1).
    pub async fn place_order(
        &self,
        ticker: &str,
        side: Side,
        count: i64,
        price: f64,
    ) -> Result<Order, Error> {
        self.limiter.wait_write().await;

        let path = format!("{API_PREFIX}/portfolio/orders");
        let headers = self.auth.headers("POST", &path)?;

        let price_cents = price_to_cents(price);
        let (yes_price, no_price) = match side {
            Side::Yes => (Some(price_cents), None),
            Side::No => (None, Some(price_cents)),
        };

        let body = CreateOrderRequest {
            ticker: ticker.to_string(),
            side,
            action: Action::Buy,
            client_order_id: Uuid::new_v4().to_string(),
            count,
            order_type: OrderType::Limit,
            yes_price,
            no_price,
        };

        debug!(
            "Creating order: BUY {} {} @ {}¢ x{}",
            side.as_str().to_uppercase(),
            ticker,
            price_cents,
            count,
        );

        let resp = self
            .client
            .post(self.url(&path))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;

        let status_code = resp.status().as_u16();
        if status_code == 429 {
            warn!("Rate limited on order creation");
            return Err(Error::RateLimited {
                retry_after_ms: 1000,
            });
        }
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::KalshiApi {
                status: status_code,
                message: summarize_response_body(&body),
            });
        }

        let raw_body = resp
            .text()
            .await
            .map_err(|e| Error::Http(format_reqwest_error(&e)))?;
        let order_resp: CreateOrderResponse = serde_json::from_str(&raw_body).map_err(|e| {
            Error::Http(format!(
                "Error decoding create_order response: {}; body={}",
                e,
                summarize_response_body(&raw_body)
            ))
        })?;

        debug!(
            "Order placed: id={} status={} fill={}",
            order_resp.order.order_id, order_resp.order.status, order_resp.order.fill_count,
        );

        Ok(order_resp.order.into_order(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{HEADER_KEY, HEADER_SIGNATURE, HEADER_TIMESTAMP};
    use crate::keystore::test_support::pkcs8_pem;
    use crate::keystore::Credential;
    use base64::Engine;
    use rsa::pss::Signature;
    use rsa::signature::Verifier;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// One request as seen by the mock server.
    #[derive(Debug)]
    struct Captured {
        method: String,
        target: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Captured {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap().split_whitespace();
        let method = request_line.next().unwrap().to_string();
        let target = request_line.next().unwrap().to_string();
        let headers: Vec<(String, String)> = lines
            .filter(|l| !l.is_empty())
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.parse::<usize>().unwrap())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string();

        Captured {
            method,
            target,
            headers,
            body,
        }
    }

    /// Serves the canned `(status, body)` responses in order, one per
    /// connection, and forwards each captured request.
    async fn mock_server(
        responses: Vec<(u16, &'static str)>,
    ) -> (String, mpsc::UnboundedReceiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let captured = read_request(&mut stream).await;
                let _ = tx.send(captured);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });

        (format!("http://{addr}"), rx)
    }

    fn client_for(base_url: &str) -> (KalshiRestClient, Credential) {
        let credential = Credential::from_pem("key-123", &pkcs8_pem()).unwrap();
        let auth = KalshiAuth::from_credential(credential.clone());
        let client = KalshiRestClient::new(auth, true, Some(base_url)).unwrap();
        (client, credential)
    }

    fn assert_signed(req: &Captured, credential: &Credential, path: &str) {
        assert_eq!(req.header(HEADER_KEY), Some("key-123"));
        let ts = req.header(HEADER_TIMESTAMP).expect("timestamp header");
        let sig_b64 = req.header(HEADER_SIGNATURE).expect("signature header");
        let sig_bytes = base64::engine::general_purpose::STANDARD
            .decode(sig_b64)
            .unwrap();
        let signature = Signature::try_from(sig_bytes.as_slice()).unwrap();
        let message = format!("{ts}{}{path}", req.method);
        credential
            .verifying_key()
            .verify(message.as_bytes(), &signature)
            .expect("signature should verify over path without query");
    }

    #[test]
    fn test_resolve_base_url() {
        assert_eq!(resolve_rest_base_url(true, None), DEMO_BASE_URL);
        assert_eq!(resolve_rest_base_url(false, None), PROD_BASE_URL);
        assert_eq!(resolve_rest_base_url(false, Some("  ")), PROD_BASE_URL);
        assert_eq!(
            resolve_rest_base_url(true, Some("http://localhost:9000/")),
            "http://localhost:9000"
        );
    }

    #[test]
    fn test_price_to_cents() {
        assert_eq!(price_to_cents(0.60), 60);
        assert_eq!(price_to_cents(0.555), 56);
        assert_eq!(price_to_cents(0.001), 1);
        assert_eq!(price_to_cents(1.0), 99);
    }

    #[test]
    fn test_summarize_response_body_truncates() {
        let long = "x".repeat(2000);
        let summary = summarize_response_body(&long);
        assert!(summary.ends_with('…'));
        assert_eq!(summary.chars().count(), 801);
        assert_eq!(summarize_response_body("a\nb"), "a b");
    }

    #[tokio::test]
    async fn test_get_balance_signed_and_converted() {
        let (base, mut rx) = mock_server(vec![(200, r#"{"balance": 12345}"#)]).await;
        let (client, credential) = client_for(&base);

        let balance = client.get_balance().await.unwrap();
        assert!((balance - 123.45).abs() < 1e-9);

        let req = rx.recv().await.unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.target, "/trade-api/v2/portfolio/balance");
        assert_signed(&req, &credential, "/trade-api/v2/portfolio/balance");
    }

    #[tokio::test]
    async fn test_get_markets_follows_cursor_and_normalizes_prices() {
        let page1 = r#"{"markets":[{"ticker":"KXMLBGAME-25JUN01NYYBOS-NYY","event_ticker":"KXMLBGAME-25JUN01NYYBOS","status":"active","yes_ask":60}],"cursor":"abc"}"#;
        let page2 = r#"{"markets":[{"ticker":"KXMLBGAME-25JUN01NYYBOS-BOS","event_ticker":"KXMLBGAME-25JUN01NYYBOS","status":"active","yes_ask_dollars":"0.4100"}],"cursor":""}"#;
        let (base, mut rx) = mock_server(vec![(200, page1), (200, page2)]).await;
        let (client, credential) = client_for(&base);

        let markets = client
            .get_markets(&InstrumentFilter::open_series("KXMLBGAME"))
            .await
            .unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0].yes_ask, Some(0.60));
        assert_eq!(markets[1].yes_ask, Some(0.41));

        let first = rx.recv().await.unwrap();
        assert!(first.target.starts_with("/trade-api/v2/markets?"));
        assert!(first.target.contains("series_ticker=KXMLBGAME"));
        assert!(first.target.contains("status=open"));
        assert!(!first.target.contains("cursor="));
        assert_signed(&first, &credential, "/trade-api/v2/markets");

        let second = rx.recv().await.unwrap();
        assert!(second.target.contains("cursor=abc"));
    }

    #[tokio::test]
    async fn test_get_positions_paginates() {
        let page1 = r#"{"market_positions":[{"ticker":"A","position":3,"market_exposure":180}],"cursor":"next"}"#;
        let page2 = r#"{"market_positions":[{"ticker":"B","position":-2}]}"#;
        let (base, mut rx) = mock_server(vec![(200, page1), (200, page2)]).await;
        let (client, _) = client_for(&base);

        let positions = client.get_positions().await.unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].ticker, "A");
        assert_eq!(positions[0].position, 3);
        assert!((positions[0].market_exposure - 1.80).abs() < 1e-9);
        assert_eq!(positions[1].position, -2);

        let first = rx.recv().await.unwrap();
        assert!(first.target.contains("limit=200"));
        let second = rx.recv().await.unwrap();
        assert!(second.target.contains("cursor=next"));
    }

    #[tokio::test]
    async fn test_place_order_sends_limit_buy() {
        let reply = r#"{"order":{"order_id":"ord-1","client_order_id":"c-1","ticker":"KXMLBGAME-25JUN01NYYBOS-NYY","side":"yes","action":"buy","status":"resting","yes_price":60,"fill_count":0,"remaining_count":10}}"#;
        let (base, mut rx) = mock_server(vec![(201, reply)]).await;
        let (client, credential) = client_for(&base);

        let order = client
            .place_order("KXMLBGAME-25JUN01NYYBOS-NYY", Side::Yes, 10, 0.60)
            .await
            .unwrap();
        assert_eq!(order.order_id, "ord-1");
        assert_eq!(order.count, 10);
        assert!((order.price - 0.60).abs() < 1e-9);

        let req = rx.recv().await.unwrap();
        assert_eq!(req.method, "POST");
        assert_signed(&req, &credential, "/trade-api/v2/portfolio/orders");

        let sent: serde_json::Value = serde_json::from_str(&req.body).unwrap();
        assert_eq!(sent["ticker"], "KXMLBGAME-25JUN01NYYBOS-NYY");
        assert_eq!(sent["side"], "yes");
        assert_eq!(sent["action"], "buy");
        assert_eq!(sent["type"], "limit");
        assert_eq!(sent["count"], 10);
        assert_eq!(sent["yes_price"], 60);
        assert!(sent.get("no_price").is_none());
        assert!(!sent["client_order_id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_success_maps_to_exchange_error() {
        let (base, _rx) = mock_server(vec![(400, r#"{"error":"bad ticker"}"#)]).await;
        let (client, _) = client_for(&base);

        let err = client
            .place_order("NOPE", Side::Yes, 1, 0.5)
            .await
            .unwrap_err();
        match err {
            Error::KalshiApi { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("bad ticker"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_order_rate_limited() {
        let (base, _rx) = mock_server(vec![(429, "{}")]).await;
        let (client, _) = client_for(&base);

        let err = client.place_order("T", Side::No, 1, 0.5).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
        assert_eq!(err.status_code(), Some(429));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_http_error() {
        // Bind then drop to get a port nobody is listening on.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };
        let (client, _) = client_for(&format!("http://{addr}"));
        let err = client.get_balance().await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(!err.is_credential());
    }
}
