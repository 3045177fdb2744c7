//! Scanner crate.
//!
//! Runs the trading loop and reports what it does through event sinks.

pub mod events;
pub mod journal;
pub mod scanner;

#[cfg(test)]
mod testing;

pub use events::{EventKind, EventSink, MultiSink, ScanEvent, TracingSink};
pub use journal::{resolve_trades_dir, JournalSink, TradeJournal};
pub use scanner::{CycleSummary, Scanner, ScannerHandle, ScannerPhase, ScannerRuntimeState};
