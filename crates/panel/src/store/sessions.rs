//! Auth sessions. The identity exchange lives at the edge; the core only
//! resolves opaque tokens to principals and expires stale rows.

use super::Store;
use rusqlite::{params, OptionalExtension, Row};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AuthSession {
    pub token: String,
    pub principal_id: String,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub expires_at: i64,
}

fn row_to_session(row: &Row) -> rusqlite::Result<AuthSession> {
    Ok(AuthSession {
        token: row.get("token")?,
        principal_id: row.get("principal_id")?,
        display_name: row.get("display_name")?,
        avatar_ref: row.get("avatar_ref")?,
        expires_at: row.get("expires_at")?,
    })
}

impl Store {
    pub fn session_insert(&self, session: &AuthSession) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, principal_id, display_name, avatar_ref, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(token) DO UPDATE SET
                    principal_id = excluded.principal_id,
                    display_name = excluded.display_name,
                    avatar_ref   = excluded.avatar_ref,
                    expires_at   = excluded.expires_at",
                params![
                    session.token,
                    session.principal_id,
                    session.display_name,
                    session.avatar_ref,
                    session.expires_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Resolve a token to its session if it has not expired at `now`.
    pub fn session_get(&self, token: &str, now: i64) -> rusqlite::Result<Option<AuthSession>> {
        self.with(|conn| {
            conn.query_row(
                "SELECT token, principal_id, display_name, avatar_ref, expires_at
                 FROM sessions WHERE token = ?1 AND expires_at > ?2",
                params![token, now],
                row_to_session,
            )
            .optional()
        })
    }

    pub fn session_delete(&self, token: &str) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
            Ok(())
        })
    }

    /// Drop every session past its expiry. Returns how many were removed.
    pub fn sessions_expire(&self, now: i64) -> rusqlite::Result<usize> {
        self.with(|conn| {
            conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])
        })
    }
}
