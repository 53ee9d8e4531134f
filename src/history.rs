//! Action history ledger.
//!
//! Append-only record of user actions (uploads, text summaries, generated
//! audio) stored in the `history` table of the application SQLite database.
//! There is no update or delete path.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Voice entries keep only this many characters of the spoken text.
pub const VOICE_EXCERPT_CHARS: usize = 150;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("history entry {0} not found")]
    NotFound(i64),
    #[error("unknown action label: {0}")]
    UnknownAction(String),
    #[error("history store error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("history store lock poisoned")]
    Poisoned,
}

/// The fixed set of actions the ledger accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionLabel {
    #[serde(rename = "Upload & Summarize")]
    UploadSummarize,
    #[serde(rename = "Text Summarize")]
    TextSummarize,
    #[serde(rename = "Voice Generated")]
    VoiceGenerated,
    #[serde(rename = "Plan Created")]
    PlanCreated,
}

impl ActionLabel {
    pub const ALL: [ActionLabel; 4] = [
        Self::UploadSummarize,
        Self::TextSummarize,
        Self::VoiceGenerated,
        Self::PlanCreated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UploadSummarize => "Upload & Summarize",
            Self::TextSummarize => "Text Summarize",
            Self::VoiceGenerated => "Voice Generated",
            Self::PlanCreated => "Plan Created",
        }
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionLabel {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| LedgerError::UnknownAction(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub action: ActionLabel,
    pub source_name: String,
    pub summary_excerpt: String,
    pub created_at: String,
}

/// Per-action counts shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub notes: i64,
    pub summaries: i64,
    pub voices: i64,
    pub plans: i64,
}

/// SQLite-backed ledger. A single connection behind a mutex serializes
/// writers, which keeps id assignment and timestamps in the same order.
pub struct HistoryLedger {
    conn: Mutex<Connection>,
}

impl HistoryLedger {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Failed to create database dir {}: {e}", parent.display());
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        init_history_table(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Append one entry. Voice entries are truncated to
    /// [`VOICE_EXCERPT_CHARS`] characters before storage.
    pub fn record(
        &self,
        action: ActionLabel,
        source_name: &str,
        excerpt: &str,
    ) -> Result<HistoryEntry, LedgerError> {
        let excerpt = match action {
            ActionLabel::VoiceGenerated => excerpt.chars().take(VOICE_EXCERPT_CHARS).collect(),
            _ => excerpt.to_string(),
        };

        let conn = self.lock()?;
        // Timestamp is taken under the lock and never behind the latest
        // stored one, so id order == time order even if the clock steps back.
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let latest: Option<String> =
            conn.query_row("SELECT MAX(timestamp) FROM history", [], |r| r.get(0))?;
        let created_at = match latest {
            Some(latest) if latest > now => latest,
            _ => now,
        };
        conn.execute(
            "INSERT INTO history (action, filename, summary, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![action.as_str(), source_name, excerpt, created_at],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Recorded history #{id}: {action} ({source_name})");

        Ok(HistoryEntry {
            id,
            action,
            source_name: source_name.to_string(),
            summary_excerpt: excerpt,
            created_at,
        })
    }

    /// All entries, newest first.
    pub fn list_all(&self) -> Result<Vec<HistoryEntry>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, action, filename, summary, timestamp
             FROM history
             ORDER BY timestamp DESC, id DESC",
        )?;
        let rows = stmt.query_map([], row_to_raw)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    pub fn get(&self, id: i64) -> Result<HistoryEntry, LedgerError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT id, action, filename, summary, timestamp FROM history WHERE id = ?1",
                params![id],
                row_to_raw,
            )
            .optional()?;
        raw.ok_or(LedgerError::NotFound(id))?.into_entry()
    }

    pub fn count_by_action(&self, action: ActionLabel) -> Result<i64, LedgerError> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM history WHERE action = ?1",
            params![action.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    pub fn stats(&self) -> Result<UsageStats, LedgerError> {
        Ok(UsageStats {
            notes: self.count_by_action(ActionLabel::UploadSummarize)?,
            summaries: self.count_by_action(ActionLabel::TextSummarize)?,
            voices: self.count_by_action(ActionLabel::VoiceGenerated)?,
            plans: self.count_by_action(ActionLabel::PlanCreated)?,
        })
    }
}

fn init_history_table(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS history (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            action    TEXT NOT NULL,
            filename  TEXT NOT NULL,
            summary   TEXT NOT NULL DEFAULT '',
            timestamp TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp DESC);",
    )
}

struct RawEntry {
    id: i64,
    action: String,
    source_name: String,
    summary_excerpt: String,
    created_at: String,
}

impl RawEntry {
    fn into_entry(self) -> Result<HistoryEntry, LedgerError> {
        Ok(HistoryEntry {
            id: self.id,
            action: self.action.parse()?,
            source_name: self.source_name,
            summary_excerpt: self.summary_excerpt,
            created_at: self.created_at,
        })
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        action: row.get(1)?,
        source_name: row.get(2)?,
        summary_excerpt: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn ledger() -> HistoryLedger {
        HistoryLedger::open_in_memory().expect("in-memory ledger")
    }

    #[test]
    fn record_then_list_shows_newest_first() {
        let ledger = ledger();
        let first = ledger
            .record(ActionLabel::TextSummarize, "Text Input", "first summary")
            .unwrap();
        let second = ledger
            .record(ActionLabel::UploadSummarize, "notes.txt", "second summary")
            .unwrap();

        let all = ledger.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], second);
        assert_eq!(all[1], first);
        assert!(second.id > first.id);
        assert!(second.created_at >= first.created_at);
    }

    #[test]
    fn get_returns_recorded_entry() {
        let ledger = ledger();
        let entry = ledger
            .record(ActionLabel::UploadSummarize, "lecture.pdf", "a summary")
            .unwrap();
        assert_eq!(ledger.get(entry.id).unwrap(), entry);
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let ledger = ledger();
        let entry = ledger.record(ActionLabel::TextSummarize, "Text Input", "x").unwrap();
        match ledger.get(entry.id + 1) {
            Err(LedgerError::NotFound(id)) => assert_eq!(id, entry.id + 1),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(matches!(ledger.get(-7), Err(LedgerError::NotFound(-7))));
    }

    #[test]
    fn voice_excerpt_truncated_at_record_time() {
        let ledger = ledger();
        let long: String = "é".repeat(400);
        let entry = ledger
            .record(ActionLabel::VoiceGenerated, "a.mp3", &long)
            .unwrap();
        assert_eq!(entry.summary_excerpt.chars().count(), VOICE_EXCERPT_CHARS);

        let listed = ledger.list_all().unwrap();
        assert_eq!(listed[0].summary_excerpt.chars().count(), VOICE_EXCERPT_CHARS);
        assert_eq!(ledger.get(entry.id).unwrap().summary_excerpt, entry.summary_excerpt);
    }

    #[test]
    fn non_voice_excerpt_kept_whole() {
        let ledger = ledger();
        let long = "word ".repeat(100);
        let entry = ledger
            .record(ActionLabel::TextSummarize, "Text Input", &long)
            .unwrap();
        assert_eq!(entry.summary_excerpt, long);
    }

    #[test]
    fn default_empty_excerpt_is_stored() {
        let ledger = ledger();
        let entry = ledger.record(ActionLabel::PlanCreated, "week 1", "").unwrap();
        assert_eq!(ledger.get(entry.id).unwrap().summary_excerpt, "");
    }

    #[test]
    fn concurrent_records_get_distinct_gapless_ids() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(HistoryLedger::open(&dir.path().join("history.db")).unwrap());
        let before = ledger.list_all().unwrap().len();

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger
                        .record(ActionLabel::TextSummarize, "Text Input", &format!("summary {i}"))
                        .unwrap()
                        .id
                })
            })
            .collect();
        let mut ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();

        let unique: HashSet<i64> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 50);
        assert_eq!(ids[49] - ids[0], 49, "ids must be contiguous");

        let all = ledger.list_all().unwrap();
        assert_eq!(all.len() - before, 50);
        // Listing is newest first, which must also be descending id order.
        assert!(all.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[test]
    fn stats_count_each_action() {
        let ledger = ledger();
        ledger.record(ActionLabel::UploadSummarize, "a.txt", "s").unwrap();
        ledger.record(ActionLabel::UploadSummarize, "b.pdf", "s").unwrap();
        ledger.record(ActionLabel::TextSummarize, "Text Input", "s").unwrap();
        ledger.record(ActionLabel::VoiceGenerated, "c.mp3", "hello").unwrap();

        let stats = ledger.stats().unwrap();
        assert_eq!(
            stats,
            UsageStats {
                notes: 2,
                summaries: 1,
                voices: 1,
                plans: 0,
            }
        );
    }

    #[test]
    fn reopening_database_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let id = {
            let ledger = HistoryLedger::open(&path).unwrap();
            ledger.record(ActionLabel::TextSummarize, "Text Input", "kept").unwrap().id
        };
        let ledger = HistoryLedger::open(&path).unwrap();
        assert_eq!(ledger.get(id).unwrap().summary_excerpt, "kept");
    }

    #[test]
    fn action_labels_round_trip_through_text() {
        for action in ActionLabel::ALL {
            assert_eq!(action.as_str().parse::<ActionLabel>().unwrap(), action);
        }
        assert!("Deleted".parse::<ActionLabel>().is_err());
    }
}
