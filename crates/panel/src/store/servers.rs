//! Server rows — the pool of configured game servers.

use super::Store;
use rusqlite::{params, OptionalExtension, Row};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub game_type: String,
    pub docker_image: String,
    pub port: u16,
    pub env_vars: HashMap<String, String>,
    pub volumes: HashMap<String, String>,
    pub created_at: i64,
    pub banner_path: Option<String>,
    pub accent_color: Option<String>,
}

fn row_to_server(row: &Row) -> rusqlite::Result<Server> {
    let env_json: String = row.get("env_vars")?;
    let volumes_json: String = row.get("volumes")?;
    Ok(Server {
        id: row.get("id")?,
        name: row.get("name")?,
        game_type: row.get("game_type")?,
        docker_image: row.get("docker_image")?,
        port: row.get::<_, i64>("port")? as u16,
        env_vars: serde_json::from_str(&env_json).unwrap_or_default(),
        volumes: serde_json::from_str(&volumes_json).unwrap_or_default(),
        created_at: row.get("created_at")?,
        banner_path: row.get("banner_path")?,
        accent_color: row.get("accent_color")?,
    })
}

const COLUMNS: &str =
    "id, name, game_type, docker_image, port, env_vars, volumes, created_at, banner_path, accent_color";

impl Store {
    pub fn servers_all(&self) -> rusqlite::Result<Vec<Server>> {
        self.with(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM servers ORDER BY created_at"))?;
            let rows = stmt.query_map([], row_to_server)?;
            rows.collect()
        })
    }

    pub fn server_by_id(&self, id: &str) -> rusqlite::Result<Option<Server>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM servers WHERE id = ?1"),
                params![id],
                row_to_server,
            )
            .optional()
        })
    }

    pub fn server_insert(&self, server: &Server) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute(
                "INSERT INTO servers
                    (id, name, game_type, docker_image, port, env_vars, volumes, created_at, banner_path, accent_color)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    server.id,
                    server.name,
                    server.game_type,
                    server.docker_image,
                    server.port as i64,
                    serde_json::to_string(&server.env_vars).unwrap_or_else(|_| "{}".into()),
                    serde_json::to_string(&server.volumes).unwrap_or_else(|_| "{}".into()),
                    server.created_at,
                    server.banner_path,
                    server.accent_color,
                ],
            )?;
            Ok(())
        })
    }

    /// Mutable config surface: image and env vars (the parts editable while
    /// the server is stopped).
    pub fn server_update_config(
        &self,
        id: &str,
        docker_image: &str,
        env_vars: &HashMap<String, String>,
    ) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute(
                "UPDATE servers SET docker_image = ?2, env_vars = ?3 WHERE id = ?1",
                params![
                    id,
                    docker_image,
                    serde_json::to_string(env_vars).unwrap_or_else(|_| "{}".into()),
                ],
            )?;
            Ok(())
        })
    }

    /// Theme surface: banner path and accent color; `None` leaves a field
    /// untouched.
    pub fn server_update_theme(
        &self,
        id: &str,
        banner_path: Option<&str>,
        accent_color: Option<&str>,
    ) -> rusqlite::Result<()> {
        self.with(|conn| {
            if let Some(path) = banner_path {
                conn.execute(
                    "UPDATE servers SET banner_path = ?2 WHERE id = ?1",
                    params![id, path],
                )?;
            }
            if let Some(color) = accent_color {
                conn.execute(
                    "UPDATE servers SET accent_color = ?2 WHERE id = ?1",
                    params![id, color],
                )?;
            }
            Ok(())
        })
    }

    pub fn server_clear_banner(&self, id: &str) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute(
                "UPDATE servers SET banner_path = NULL WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
    }

    pub fn server_delete(&self, id: &str) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute("DELETE FROM servers WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    /// Name of the server already holding `port`, excluding `exclude_id`.
    pub fn server_port_conflict(
        &self,
        port: u16,
        exclude_id: &str,
    ) -> rusqlite::Result<Option<String>> {
        self.with(|conn| {
            conn.query_row(
                "SELECT name FROM servers WHERE port = ?1 AND id != ?2",
                params![port as i64, exclude_id],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_server(id: &str, port: u16) -> Server {
    Server {
        id: id.to_string(),
        name: format!("Server {id}"),
        game_type: "minecraft".to_string(),
        docker_image: "itzg/minecraft-server:latest".to_string(),
        port,
        env_vars: HashMap::from([("EULA".to_string(), "TRUE".to_string())]),
        volumes: HashMap::from([(format!("/data/{id}"), "/data".to_string())]),
        created_at: 1_700_000_000,
        banner_path: None,
        accent_color: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_list_delete_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let server = sample_server("mc", 25565);
        store.server_insert(&server).unwrap();

        let all = store.servers_all().unwrap();
        assert_eq!(all, vec![server.clone()]);

        store.server_delete("mc").unwrap();
        assert!(store.servers_all().unwrap().is_empty());
        assert!(store.server_by_id("mc").unwrap().is_none());
    }

    #[test]
    fn duplicate_id_is_a_constraint_error() {
        let store = Store::open_in_memory().unwrap();
        store.server_insert(&sample_server("mc", 25565)).unwrap();
        assert!(store.server_insert(&sample_server("mc", 25566)).is_err());
    }

    #[test]
    fn port_conflict_names_the_holder() {
        let store = Store::open_in_memory().unwrap();
        store.server_insert(&sample_server("mc", 25565)).unwrap();

        let conflict = store.server_port_conflict(25565, "mc2").unwrap();
        assert_eq!(conflict.as_deref(), Some("Server mc"));
        // A server never conflicts with itself
        assert!(store.server_port_conflict(25565, "mc").unwrap().is_none());
        assert!(store.server_port_conflict(2456, "vh").unwrap().is_none());
    }

    #[test]
    fn config_and_theme_updates() {
        let store = Store::open_in_memory().unwrap();
        store.server_insert(&sample_server("mc", 25565)).unwrap();

        let env = HashMap::from([("MEMORY".to_string(), "4G".to_string())]);
        store
            .server_update_config("mc", "itzg/minecraft-server:java21", &env)
            .unwrap();
        store
            .server_update_theme("mc", Some("banners/mc.png"), Some("#ff8800"))
            .unwrap();

        let server = store.server_by_id("mc").unwrap().unwrap();
        assert_eq!(server.docker_image, "itzg/minecraft-server:java21");
        assert_eq!(server.env_vars, env);
        assert_eq!(server.banner_path.as_deref(), Some("banners/mc.png"));
        assert_eq!(server.accent_color.as_deref(), Some("#ff8800"));

        // None leaves the other theme field alone
        store.server_update_theme("mc", None, Some("#000000")).unwrap();
        let server = store.server_by_id("mc").unwrap().unwrap();
        assert_eq!(server.banner_path.as_deref(), Some("banners/mc.png"));
        assert_eq!(server.accent_color.as_deref(), Some("#000000"));
    }
}
