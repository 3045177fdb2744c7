//! Prediction → instrument matching and edge computation.
//!
//! Pure: no I/O, no clock. The same inputs always give the same ranked
//! output, so the scanner can re-run it every cycle.

use std::cmp::Ordering;

use common::{Instrument, MatchedOpportunity, Prediction, Side};
use tracing::debug;

use crate::teams::TeamTable;

/// Ask prices must sit strictly inside (0, 1) to be read as a probability.
fn valid_ask(ask: Option<f64>) -> Option<f64> {
    ask.filter(|p| p.is_finite() && *p > 0.0 && *p < 1.0)
}

/// Edge in percentage points, rounded to 1e-6 so decimal prices compare
/// exactly against a threshold (0.80 - 0.70 is 10, not 10.000000000000009).
fn edge_points(model_probability: f64, ask: f64) -> f64 {
    ((model_probability - ask) * 100.0 * 1e6).round() / 1e6
}

/// Suffix after the last `-`, e.g. `NYY` in `KXMLBGAME-25JUN01NYYBOS-NYY`.
fn ticker_suffix(ticker: &str) -> &str {
    ticker.rsplit('-').next().unwrap_or(ticker)
}

/// Matches model predictions to the predicted winner's YES contract.
#[derive(Debug, Clone)]
pub struct Matcher {
    teams: TeamTable,
}

impl Matcher {
    pub fn new(teams: TeamTable) -> Self {
        Self { teams }
    }

    /// Ranked opportunities, highest edge first. Ties keep prediction order.
    pub fn match_opportunities(
        &self,
        predictions: &[Prediction],
        instruments: &[Instrument],
    ) -> Vec<MatchedOpportunity> {
        let mut opportunities: Vec<MatchedOpportunity> = predictions
            .iter()
            .filter_map(|p| self.match_one(p, instruments))
            .collect();

        // Stable sort keeps the result deterministic for equal edges.
        opportunities.sort_by(|a, b| {
            b.edge_percent
                .partial_cmp(&a.edge_percent)
                .unwrap_or(Ordering::Equal)
        });
        opportunities
    }

    fn match_one(
        &self,
        prediction: &Prediction,
        instruments: &[Instrument],
    ) -> Option<MatchedOpportunity> {
        let home_probability = match prediction.home_win_probability {
            Some(p) if (0.0..=1.0).contains(&p) => p,
            _ => {
                debug!("{}: no usable prediction", prediction.contest_id);
                return None;
            }
        };

        let (Some(home_abbr), Some(away_abbr)) = (
            self.teams.abbreviation(&prediction.home_label),
            self.teams.abbreviation(&prediction.away_label),
        ) else {
            debug!(
                "{}: unmapped team label ({} vs {})",
                prediction.contest_id, prediction.away_label, prediction.home_label
            );
            return None;
        };

        let (winner_label, winner_abbr, model_probability) = if home_probability >= 0.5 {
            (&prediction.home_label, home_abbr, home_probability)
        } else {
            (&prediction.away_label, away_abbr, 1.0 - home_probability)
        };

        let instrument = instruments.iter().find(|inst| {
            inst.event_ticker.contains(home_abbr)
                && inst.event_ticker.contains(away_abbr)
                && ticker_suffix(&inst.ticker) == winner_abbr
        })?;

        let Some(ask) = valid_ask(instrument.yes_ask) else {
            debug!(
                "{}: {} has no valid yes ask ({:?})",
                prediction.contest_id, instrument.ticker, instrument.yes_ask
            );
            return None;
        };

        let edge_percent = edge_points(model_probability, ask);
        debug!(
            "{}: {} model={:.3} ask={:.2} edge={:+.1}",
            prediction.contest_id, instrument.ticker, model_probability, ask, edge_percent
        );

        Some(MatchedOpportunity {
            contest_id: prediction.contest_id.clone(),
            predicted_winner_label: winner_label.clone(),
            model_probability,
            market_implied_probability: ask,
            edge_percent,
            instrument_ticker: instrument.ticker.clone(),
            side: Side::Yes,
        })
    }
}
