//! Structured scanner events and the sinks that consume them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use common::Side;
use serde::Serialize;
use tracing::{error, info};

/// One timestamped record emitted by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanEvent {
    #[serde(serialize_with = "serialize_ts")]
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

fn serialize_ts<S: serde::Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Started {
        dry_run: bool,
        series: Vec<String>,
    },
    /// Emitted once per completed poll, even when nothing matched.
    Scan {
        cycle_id: u64,
        predictions: usize,
        instruments: usize,
        opportunities: usize,
    },
    Placed {
        cycle_id: u64,
        contest_id: String,
        ticker: String,
        side: Side,
        count: i64,
        price: f64,
        edge_percent: f64,
        order_id: Option<String>,
        status: Option<String>,
        dry_run: bool,
    },
    Error {
        cycle_id: Option<u64>,
        ticker: Option<String>,
        message: String,
    },
    Stopped {
        reason: String,
    },
}

impl ScanEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            ts: Utc::now(),
            kind,
        }
    }

    /// The `kind` tag as serialized.
    pub fn label(&self) -> &'static str {
        match self.kind {
            EventKind::Started { .. } => "started",
            EventKind::Scan { .. } => "scan",
            EventKind::Placed { .. } => "placed",
            EventKind::Error { .. } => "error",
            EventKind::Stopped { .. } => "stopped",
        }
    }
}

/// Consumer of scanner events (display, journal, logs).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: &ScanEvent);
}

/// Writes every event to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn emit(&self, event: &ScanEvent) {
        match &event.kind {
            EventKind::Started { dry_run, series } => {
                info!("Scanner started (dry_run={}, series={:?})", dry_run, series);
            }
            EventKind::Scan {
                cycle_id,
                predictions,
                instruments,
                opportunities,
            } => {
                info!(
                    "SCAN #{}: predictions={} instruments={} opportunities={}",
                    cycle_id, predictions, instruments, opportunities
                );
            }
            EventKind::Placed {
                ticker,
                count,
                price,
                edge_percent,
                order_id,
                dry_run,
                ..
            } => {
                let tag = if *dry_run { "DRY-RUN" } else { "PLACED" };
                info!(
                    "{}: BUY YES {} x{} @ {:.2} (edge={:+.1}, id={})",
                    tag,
                    ticker,
                    count,
                    price,
                    edge_percent,
                    order_id.as_deref().unwrap_or("-")
                );
            }
            EventKind::Error {
                ticker, message, ..
            } => match ticker {
                Some(t) => error!("Order failed for {}: {}", t, message),
                None => error!("Scan cycle failed: {}", message),
            },
            EventKind::Stopped { reason } => info!("Scanner stopped ({})", reason),
        }
    }
}

/// Fans each event out to several sinks in order.
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl EventSink for MultiSink {
    async fn emit(&self, event: &ScanEvent) {
        for sink in &self.sinks {
            sink.emit(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use chrono::TimeZone;

    #[test]
    fn test_scan_event_json_shape() {
        let event = ScanEvent {
            ts: Utc.with_ymd_and_hms(2025, 6, 1, 18, 30, 0).unwrap(),
            kind: EventKind::Scan {
                cycle_id: 3,
                predictions: 15,
                instruments: 30,
                opportunities: 2,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["ts"], "2025-06-01T18:30:00.000Z");
        assert_eq!(value["kind"], "scan");
        assert_eq!(value["cycle_id"], 3);
        assert_eq!(value["opportunities"], 2);
        assert_eq!(event.label(), "scan");
    }

    #[test]
    fn test_placed_event_carries_dry_run_flag() {
        let event = ScanEvent::now(EventKind::Placed {
            cycle_id: 1,
            contest_id: "777001".into(),
            ticker: "KXMLBGAME-25JUN01NYYBOS-BOS".into(),
            side: Side::Yes,
            count: 10,
            price: 0.6,
            edge_percent: 12.0,
            order_id: None,
            status: None,
            dry_run: true,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "placed");
        assert_eq!(value["side"], "yes");
        assert_eq!(value["dry_run"], true);
        assert!(value["order_id"].is_null());
    }

    #[tokio::test]
    async fn test_multi_sink_fans_out() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let mut multi = MultiSink::new(vec![a.clone()]);
        multi.push(b.clone());
        multi.push(Arc::new(TracingSink));

        multi
            .emit(&ScanEvent::now(EventKind::Stopped {
                reason: "test".into(),
            }))
            .await;

        assert_eq!(a.labels(), vec!["stopped"]);
        assert_eq!(b.labels(), vec!["stopped"]);
    }
}
