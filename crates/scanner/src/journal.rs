//! Append-only JSONL trade journal, one file per UTC day.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::events::{EventSink, ScanEvent};

const JOURNAL_SUBDIR: &str = "edge-scanner";

fn resolve_repo_root() -> Option<PathBuf> {
    let mut cursor = std::env::current_dir().ok()?;
    loop {
        if cursor.join(".git").is_dir() {
            return Some(cursor);
        }
        if !cursor.pop() {
            return None;
        }
    }
}

/// `$TRADES_DIR/edge-scanner`, else `<repo>/TRADES/edge-scanner`, else
/// `./TRADES/edge-scanner`.
pub fn resolve_trades_dir() -> PathBuf {
    if let Ok(raw) = std::env::var("TRADES_DIR") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed).join(JOURNAL_SUBDIR);
        }
    }

    if let Some(root) = resolve_repo_root() {
        return root.join("TRADES").join(JOURNAL_SUBDIR);
    }

    PathBuf::from("TRADES").join(JOURNAL_SUBDIR)
}

fn day_key() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

pub struct TradeJournal {
    dir: PathBuf,
    day_key: String,
    file: File,
}

impl TradeJournal {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        let day_key = day_key();
        let file = Self::open_day_file(&dir, &day_key)?;
        Ok(Self { dir, day_key, file })
    }

    fn open_day_file(dir: &Path, day_key: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(format!("trades-{}.jsonl", day_key)))
    }

    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        let today = day_key();
        if today != self.day_key {
            self.file = Self::open_day_file(&self.dir, &today)?;
            self.day_key = today;
        }
        Ok(())
    }

    /// Append one event. Write failures are logged, never propagated.
    pub fn write_event(&mut self, event: &ScanEvent) {
        let write_result = (|| -> std::io::Result<()> {
            self.rotate_if_needed()?;
            let line = serde_json::to_string(event)?;
            writeln!(self.file, "{}", line)?;
            self.file.flush()
        })();

        if let Err(e) = write_result {
            warn!("Trade journal write failed: {}", e);
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file currently being appended to.
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(format!("trades-{}.jsonl", self.day_key))
    }
}

/// [`EventSink`] that appends to a shared [`TradeJournal`].
#[derive(Clone)]
pub struct JournalSink {
    journal: Arc<Mutex<TradeJournal>>,
}

impl JournalSink {
    pub fn new(journal: TradeJournal) -> Self {
        Self {
            journal: Arc::new(Mutex::new(journal)),
        }
    }

    pub async fn dir(&self) -> PathBuf {
        self.journal.lock().await.dir().to_path_buf()
    }
}

#[async_trait]
impl EventSink for JournalSink {
    async fn emit(&self, event: &ScanEvent) {
        let mut guard = self.journal.lock().await;
        guard.write_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_journal_appends_jsonl_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let journal = TradeJournal::open(tmp.path().join("journal")).unwrap();
        let path = journal.current_path();
        let sink = JournalSink::new(journal);

        sink.emit(&ScanEvent::now(EventKind::Started {
            dry_run: false,
            series: vec!["KXMLBGAME".into()],
        }))
        .await;
        sink.emit(&ScanEvent::now(EventKind::Scan {
            cycle_id: 1,
            predictions: 4,
            instruments: 8,
            opportunities: 1,
        }))
        .await;

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "started");
        assert_eq!(lines[1]["kind"], "scan");
        assert_eq!(lines[1]["instruments"], 8);
        assert!(lines[1]["ts"].as_str().unwrap().ends_with('Z'));
        assert_eq!(sink.dir().await, tmp.path().join("journal"));
    }

    #[test]
    fn test_reopen_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let event = ScanEvent::now(EventKind::Stopped {
            reason: "ctrl_c".into(),
        });

        let mut first = TradeJournal::open(tmp.path().to_path_buf()).unwrap();
        first.write_event(&event);
        drop(first);
        let mut second = TradeJournal::open(tmp.path().to_path_buf()).unwrap();
        second.write_event(&event);

        let raw = std::fs::read_to_string(second.current_path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
