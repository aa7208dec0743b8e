//! Backup rows. The DB row is authoritative; orphan files on disk are
//! tolerated.

use super::Store;
use rusqlite::{params, OptionalExtension, Row};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Backup {
    pub id: i64,
    pub server_id: String,
    pub filename: String,
    pub size_bytes: i64,
    pub created_at: i64,
}

fn row_to_backup(row: &Row) -> rusqlite::Result<Backup> {
    Ok(Backup {
        id: row.get("id")?,
        server_id: row.get("server_id")?,
        filename: row.get("filename")?,
        size_bytes: row.get("size_bytes")?,
        created_at: row.get("created_at")?,
    })
}

const COLUMNS: &str = "id, server_id, filename, size_bytes, created_at";

impl Store {
    pub fn backup_insert(
        &self,
        server_id: &str,
        filename: &str,
        size_bytes: i64,
        created_at: i64,
    ) -> rusqlite::Result<i64> {
        self.with(|conn| {
            conn.execute(
                "INSERT INTO backups (server_id, filename, size_bytes, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![server_id, filename, size_bytes, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn backups_for_server(&self, server_id: &str) -> rusqlite::Result<Vec<Backup>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM backups WHERE server_id = ?1 ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt.query_map(params![server_id], row_to_backup)?;
            rows.collect()
        })
    }

    pub fn backups_all(&self) -> rusqlite::Result<Vec<Backup>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM backups ORDER BY created_at DESC, id DESC"
            ))?;
            let rows = stmt.query_map([], row_to_backup)?;
            rows.collect()
        })
    }

    pub fn backup_count(&self, server_id: &str) -> rusqlite::Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM backups WHERE server_id = ?1",
                params![server_id],
                |row| row.get(0),
            )
        })
    }

    pub fn backup_oldest(&self, server_id: &str) -> rusqlite::Result<Option<Backup>> {
        self.with(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM backups WHERE server_id = ?1
                     ORDER BY created_at ASC, id ASC LIMIT 1"
                ),
                params![server_id],
                row_to_backup,
            )
            .optional()
        })
    }

    pub fn backup_by_id(&self, id: i64) -> rusqlite::Result<Option<Backup>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM backups WHERE id = ?1"),
                params![id],
                row_to_backup,
            )
            .optional()
        })
    }

    pub fn backup_delete(&self, id: i64) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute("DELETE FROM backups WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    /// `created_at` of the newest backup for a server, if any. Drives the
    /// auto-backup interval check.
    pub fn backup_latest_created_at(&self, server_id: &str) -> rusqlite::Result<Option<i64>> {
        self.with(|conn| {
            conn.query_row(
                "SELECT MAX(created_at) FROM backups WHERE server_id = ?1",
                params![server_id],
                |row| row.get::<_, Option<i64>>(0),
            )
        })
    }
}
