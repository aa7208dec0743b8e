//! Durable state — single-writer SQLite store.
//!
//! Domain operations live in sibling modules (`servers`, `runs`, `backups`,
//! `settings`, `sessions`) which add `impl Store` blocks. All access goes
//! through one connection behind a mutex; contention is negligible on a
//! single-host control plane. Write failures surface to the caller — the
//! store retries nothing.

pub mod backups;
pub mod runs;
pub mod servers;
pub mod sessions;
pub mod settings;

use parking_lot::Mutex;
use rusqlite::Connection;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> rusqlite::Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        // journal_mode returns a row, so pragma_update is unsuitable
        let _: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS servers (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                game_type    TEXT NOT NULL DEFAULT 'custom',
                docker_image TEXT NOT NULL,
                port         INTEGER NOT NULL,
                env_vars     TEXT NOT NULL DEFAULT '{}',
                volumes      TEXT NOT NULL DEFAULT '{}',
                created_at   INTEGER NOT NULL,
                banner_path  TEXT,
                accent_color TEXT
            );
            CREATE TABLE IF NOT EXISTS sessions (
                token        TEXT PRIMARY KEY,
                principal_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                avatar_ref   TEXT,
                expires_at   INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS server_sessions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id   TEXT NOT NULL,
                started_at  INTEGER NOT NULL,
                stopped_at  INTEGER,
                stop_reason TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_server_sessions_server
                ON server_sessions(server_id, started_at DESC);
            CREATE TABLE IF NOT EXISTS backups (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id  TEXT NOT NULL,
                filename   TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_backups_server
                ON backups(server_id, created_at);
            CREATE TABLE IF NOT EXISTS panel_settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS bot_settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
    }

    /// Run one operation against the connection.
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
