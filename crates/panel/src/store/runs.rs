//! Run ledger — one row per interval of a server being live.
//!
//! The open run (`stopped_at IS NULL`) is the authoritative "is running"
//! signal for history and billing; at most one exists table-wide.

use super::Store;
use rusqlite::{params, OptionalExtension, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    User,
    Crash,
    Replaced,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::User => "user",
            StopReason::Crash => "crash",
            StopReason::Replaced => "replaced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Run {
    pub id: i64,
    pub server_id: String,
    pub started_at: i64,
    pub stopped_at: Option<i64>,
    pub stop_reason: Option<String>,
}

fn row_to_run(row: &Row) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get("id")?,
        server_id: row.get("server_id")?,
        started_at: row.get("started_at")?,
        stopped_at: row.get("stopped_at")?,
        stop_reason: row.get("stop_reason")?,
    })
}

impl Store {
    /// Open a new run. The scheduler guarantees any previous open run was
    /// closed first.
    pub fn run_start(&self, server_id: &str, started_at: i64) -> rusqlite::Result<i64> {
        self.with(|conn| {
            conn.execute(
                "INSERT INTO server_sessions (server_id, started_at) VALUES (?1, ?2)",
                params![server_id, started_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Close the open run for `server_id`, if any. Returns whether a row
    /// was closed.
    pub fn run_stop(
        &self,
        server_id: &str,
        reason: StopReason,
        stopped_at: i64,
    ) -> rusqlite::Result<bool> {
        self.with(|conn| {
            let changed = conn.execute(
                "UPDATE server_sessions
                 SET stopped_at = ?2, stop_reason = ?3
                 WHERE server_id = ?1 AND stopped_at IS NULL",
                params![server_id, stopped_at, reason.as_str()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn run_open(&self, server_id: &str) -> rusqlite::Result<Option<Run>> {
        self.with(|conn| {
            conn.query_row(
                "SELECT id, server_id, started_at, stopped_at, stop_reason
                 FROM server_sessions
                 WHERE server_id = ?1 AND stopped_at IS NULL",
                params![server_id],
                row_to_run,
            )
            .optional()
        })
    }

    /// Count of open runs across the whole table (the exclusivity invariant
    /// keeps this at 0 or 1).
    pub fn runs_open_count(&self) -> rusqlite::Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM server_sessions WHERE stopped_at IS NULL",
                [],
                |row| row.get(0),
            )
        })
    }

    pub fn run_history(&self, server_id: &str) -> rusqlite::Result<Vec<Run>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, server_id, started_at, stopped_at, stop_reason
                 FROM server_sessions
                 WHERE server_id = ?1
                 ORDER BY started_at DESC, id DESC",
            )?;
            let rows = stmt.query_map(params![server_id], row_to_run)?;
            rows.collect()
        })
    }

    pub fn runs_delete_for_server(&self, server_id: &str) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute(
                "DELETE FROM server_sessions WHERE server_id = ?1",
                params![server_id],
            )?;
            Ok(())
        })
    }
}
