//! The polling loop: predictions + instruments → matcher → orders.
//!
//! One background task per session owns the runtime state (dedup set,
//! phase, counters). Callers only see snapshots published over a `watch`
//! channel and talk to the task through [`ScannerHandle`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::America::New_York;
use common::{Error, InstrumentFilter, MatchedOpportunity, ScannerConfig};
use kalshi_client::ExchangeApi;
use predictions_client::PredictionSource;
use serde::Serialize;
use strategy::{order_count, Matcher};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{EventKind, EventSink, ScanEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerPhase {
    Idle,
    Polling,
    Evaluating,
    Placing,
    Disabled,
    Stopped,
}

/// Session state, owned by the loop. Reset on every start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannerRuntimeState {
    pub phase: ScannerPhase,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub deduped_tickers: BTreeSet<String>,
    pub cycles: u64,
    pub orders_placed: u64,
    pub last_error: Option<String>,
}

impl Default for ScannerRuntimeState {
    fn default() -> Self {
        Self {
            phase: ScannerPhase::Idle,
            last_poll_at: None,
            deduped_tickers: BTreeSet::new(),
            cycles: 0,
            orders_placed: 0,
            last_error: None,
        }
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    pub predictions: usize,
    pub instruments: usize,
    pub opportunities: usize,
    pub placed: usize,
    pub failed: usize,
}

/// Wires the exchange, the predictions source and the matcher together.
pub struct Scanner {
    exchange: Arc<dyn ExchangeApi>,
    predictions: Arc<dyn PredictionSource>,
    matcher: Matcher,
    sink: Arc<dyn EventSink>,
    series: Vec<String>,
    dry_run: bool,
}

impl Scanner {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        predictions: Arc<dyn PredictionSource>,
        matcher: Matcher,
        sink: Arc<dyn EventSink>,
        series: Vec<String>,
    ) -> Self {
        Self {
            exchange,
            predictions,
            matcher,
            sink,
            series,
            dry_run: false,
        }
    }

    /// Log and record opportunities instead of sending orders.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    async fn emit(&self, kind: EventKind) {
        self.sink.emit(&ScanEvent::now(kind)).await;
    }

    /// Run one full cycle against `state`.
    ///
    /// Fetch failures end the cycle with `Err`. Order failures are reported
    /// as `error` events and leave the ticker out of the dedup set, except
    /// credential failures, which abort the cycle.
    pub async fn scan_once(
        &self,
        config: &ScannerConfig,
        state: &mut ScannerRuntimeState,
        publish: &(dyn Fn(&ScannerRuntimeState) + Sync),
    ) -> Result<CycleSummary, Error> {
        state.cycles += 1;
        let cycle_id = state.cycles;

        state.phase = ScannerPhase::Polling;
        publish(state);

        let today = slate_date(Utc::now());
        let predictions = self.predictions.predictions_for(today).await?;

        let mut instruments = Vec::new();
        for series in &self.series {
            let filter = InstrumentFilter::open_series(series);
            instruments.extend(self.exchange.list_instruments(&filter).await?);
        }
        state.last_poll_at = Some(Utc::now());

        state.phase = ScannerPhase::Evaluating;
        publish(state);

        let opportunities = self.matcher.match_opportunities(&predictions, &instruments);
        let mut summary = CycleSummary {
            predictions: predictions.len(),
            instruments: instruments.len(),
            opportunities: opportunities.len(),
            ..CycleSummary::default()
        };
        self.emit(EventKind::Scan {
            cycle_id,
            predictions: summary.predictions,
            instruments: summary.instruments,
            opportunities: summary.opportunities,
        })
        .await;

        let actionable: Vec<&MatchedOpportunity> = opportunities
            .iter()
            .filter(|opp| {
                let above = opp.edge_percent > config.edge_threshold_percent;
                if !above {
                    debug!(
                        "{}: edge {:+.1} not above threshold {:.1}",
                        opp.instrument_ticker, opp.edge_percent, config.edge_threshold_percent
                    );
                }
                above && !state.deduped_tickers.contains(&opp.instrument_ticker)
            })
            .collect();

        if actionable.is_empty() {
            return Ok(summary);
        }

        state.phase = ScannerPhase::Placing;
        publish(state);

        let mut attempted: BTreeSet<&str> = BTreeSet::new();
        for opp in actionable {
            // Doubleheaders and duplicate rows can map two contests to one ticker.
            if !attempted.insert(opp.instrument_ticker.as_str())
                || state.deduped_tickers.contains(&opp.instrument_ticker)
            {
                debug!(
                    "{}: already handled this session, skipping {}",
                    opp.instrument_ticker, opp.contest_id
                );
                continue;
            }

            let price = opp.market_implied_probability;
            let count = order_count(config.sizing_mode, config.amount, price);

            if self.dry_run {
                info!(
                    "DRY-RUN: would BUY YES {} x{} @ {:.2} (edge={:+.1})",
                    opp.instrument_ticker, count, price, opp.edge_percent
                );
                state.deduped_tickers.insert(opp.instrument_ticker.clone());
                summary.placed += 1;
                self.emit(placed_event(cycle_id, opp, count, None, true)).await;
                continue;
            }

            match self
                .exchange
                .place_order(&opp.instrument_ticker, opp.side, count, price)
                .await
            {
                Ok(order) => {
                    state.deduped_tickers.insert(opp.instrument_ticker.clone());
                    state.orders_placed += 1;
                    summary.placed += 1;
                    self.emit(placed_event(cycle_id, opp, count, Some(&order), false))
                        .await;
                }
                Err(e) if e.is_credential() => return Err(e),
                Err(e) => {
                    summary.failed += 1;
                    self.emit(EventKind::Error {
                        cycle_id: Some(cycle_id),
                        ticker: Some(opp.instrument_ticker.clone()),
                        message: e.to_string(),
                    })
                    .await;
                }
            }
        }

        Ok(summary)
    }

    /// Spawn the loop. Each spawn starts a fresh session (empty dedup set).
    pub fn spawn(self, config: ScannerConfig) -> Result<ScannerHandle, Error> {
        let issues = config.issues();
        if !issues.is_empty() {
            return Err(Error::Config(issues.join("; ")));
        }

        let cancel = CancellationToken::new();
        let (config_tx, config_rx) = watch::channel(config);
        let (state_tx, state_rx) = watch::channel(ScannerRuntimeState::default());

        let task = tokio::spawn(self.run(config_rx, state_tx, cancel.clone()));

        Ok(ScannerHandle {
            cancel,
            config_tx,
            state_rx,
            task,
        })
    }

    async fn run(
        self,
        mut config_rx: watch::Receiver<ScannerConfig>,
        state_tx: watch::Sender<ScannerRuntimeState>,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        let mut state = ScannerRuntimeState::default();
        let publish = |s: &ScannerRuntimeState| {
            state_tx.send_replace(s.clone());
        };

        self.emit(EventKind::Started {
            dry_run: self.dry_run,
            series: self.series.clone(),
        })
        .await;

        let outcome = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }

            let config = config_rx.borrow_and_update().clone();
            let interval = Duration::from_secs(config.poll_interval_secs.max(1));

            if !config.enabled {
                state.phase = ScannerPhase::Disabled;
                publish(&state);
                tokio::select! {
                    _ = cancel.cancelled() => break Ok(()),
                    Ok(()) = config_rx.changed() => {}
                    _ = tokio::time::sleep(interval) => {}
                }
                continue;
            }

            match self.scan_once(&config, &mut state, &publish).await {
                Ok(summary) => {
                    state.last_error = None;
                    debug!("Cycle {} done: {:?}", state.cycles, summary);
                }
                Err(e) if e.is_credential() => {
                    state.last_error = Some(e.to_string());
                    self.emit(EventKind::Error {
                        cycle_id: Some(state.cycles),
                        ticker: None,
                        message: e.to_string(),
                    })
                    .await;
                    break Err(e);
                }
                Err(e) => {
                    warn!("Scan cycle {} failed: {}", state.cycles, e);
                    state.last_error = Some(e.to_string());
                    self.emit(EventKind::Error {
                        cycle_id: Some(state.cycles),
                        ticker: None,
                        message: e.to_string(),
                    })
                    .await;
                }
            }

            state.phase = ScannerPhase::Idle;
            publish(&state);

            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = tokio::time::sleep(interval) => {}
            }
        };

        state.phase = ScannerPhase::Stopped;
        publish(&state);

        let reason = match &outcome {
            Ok(()) => "stopped".to_string(),
            Err(e) => format!("credential error: {e}"),
        };
        self.emit(EventKind::Stopped { reason }).await;
        outcome
    }
}

/// Game-slate date: schedules are published in US/Eastern, so a UTC host
/// past 8pm ET still asks for tonight's games.
pub fn slate_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&New_York).date_naive()
}

fn placed_event(
    cycle_id: u64,
    opp: &MatchedOpportunity,
    count: i64,
    order: Option<&common::Order>,
    dry_run: bool,
) -> EventKind {
    EventKind::Placed {
        cycle_id,
        contest_id: opp.contest_id.clone(),
        ticker: opp.instrument_ticker.clone(),
        side: opp.side,
        count,
        price: opp.market_implied_probability,
        edge_percent: opp.edge_percent,
        order_id: order.map(|o| o.order_id.clone()),
        status: order.map(|o| o.status.clone()),
        dry_run,
    }
}

/// Control surface for a running scanner task.
pub struct ScannerHandle {
    cancel: CancellationToken,
    config_tx: watch::Sender<ScannerConfig>,
    state_rx: watch::Receiver<ScannerRuntimeState>,
    task: JoinHandle<Result<(), Error>>,
}

impl ScannerHandle {
    /// Request a stop. Takes effect at the next cycle boundary; an order
    /// already sent is allowed to finish.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the loop to exit. `Err` only for credential failures.
    pub async fn join(self) -> Result<(), Error> {
        self.task
            .await
            .map_err(|e| Error::Other(format!("scanner task failed: {e}")))?
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Latest runtime-state snapshot.
    pub fn state(&self) -> ScannerRuntimeState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScannerRuntimeState> {
        self.state_rx.clone()
    }

    pub fn config(&self) -> ScannerConfig {
        self.config_tx.borrow().clone()
    }

    /// Replace the settings; the loop picks them up at its next cycle
    /// (immediately when disabled).
    pub fn update_config(&self, config: ScannerConfig) -> Result<(), Error> {
        let issues = config.issues();
        if !issues.is_empty() {
            return Err(Error::Config(issues.join("; ")));
        }
        self.config_tx.send_replace(config);
        Ok(())
    }
}
