//! Keyed configuration bags: panel settings and bot settings.
//!
//! Reads resolve stored value → static default → empty string. Writes
//! against unrecognized keys are dropped silently at the API layer; the
//! store itself accepts any key so defaults can evolve without migrations.

use super::Store;
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

pub const PANEL_KEYS: &[&str] = &[
    "host_domain",
    "game_memory_limit_gb",
    "game_cpu_limit",
    "auto_stop_hours",
    "max_backups_per_server",
    "auto_backup_interval_hours",
];

// `logs_channel_id` is recognized and stored but consumed by nothing yet;
// `auto_stop_hours` above is in the same situation.
pub const BOT_KEYS: &[&str] = &[
    "bot_token",
    "allowed_channel_id",
    "errors_channel_id",
    "crashes_channel_id",
    "logs_channel_id",
];

fn static_default(key: &str) -> &'static str {
    match key {
        "host_domain" => "aypapol.com",
        "game_memory_limit_gb" => "6",
        "game_cpu_limit" => "3",
        "auto_stop_hours" => "0",
        "max_backups_per_server" => "5",
        "auto_backup_interval_hours" => "0",
        _ => "",
    }
}

impl Store {
    fn bag_get(&self, table: &str, key: &str) -> rusqlite::Result<Option<String>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT value FROM {table} WHERE key = ?1"),
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn bag_set(&self, table: &str, key: &str, value: &str) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value"
                ),
                params![key, value],
            )?;
            Ok(())
        })
    }

    fn bag_unset(&self, table: &str, key: &str) -> rusqlite::Result<()> {
        self.with(|conn| {
            conn.execute(&format!("DELETE FROM {table} WHERE key = ?1"), params![key])?;
            Ok(())
        })
    }

    pub fn panel_setting(&self, key: &str) -> rusqlite::Result<String> {
        Ok(self
            .bag_get("panel_settings", key)?
            .unwrap_or_else(|| static_default(key).to_string()))
    }

    /// Effective numeric setting; falls back to the static default when the
    /// stored text does not parse.
    pub fn panel_setting_u64(&self, key: &str) -> rusqlite::Result<u64> {
        let value = self.panel_setting(key)?;
        Ok(value
            .parse()
            .unwrap_or_else(|_| static_default(key).parse().unwrap_or(0)))
    }

    pub fn panel_setting_set(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        self.bag_set("panel_settings", key, value)
    }

    pub fn panel_setting_unset(&self, key: &str) -> rusqlite::Result<()> {
        self.bag_unset("panel_settings", key)
    }

    /// All recognized panel settings with their effective values.
    pub fn panel_settings_all(&self) -> rusqlite::Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for key in PANEL_KEYS {
            out.insert(key.to_string(), self.panel_setting(key)?);
        }
        Ok(out)
    }

    pub fn bot_setting(&self, key: &str) -> rusqlite::Result<String> {
        Ok(self.bag_get("bot_settings", key)?.unwrap_or_default())
    }

    pub fn bot_setting_set(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        self.bag_set("bot_settings", key, value)
    }

    pub fn bot_settings_all(&self) -> rusqlite::Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for key in BOT_KEYS {
            out.insert(key.to_string(), self.bot_setting(key)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_when_unset() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.panel_setting("game_memory_limit_gb").unwrap(), "6");
        assert_eq!(store.panel_setting("game_cpu_limit").unwrap(), "3");
        assert_eq!(store.panel_setting("max_backups_per_server").unwrap(), "5");
        assert_eq!(store.panel_setting("auto_backup_interval_hours").unwrap(), "0");
        assert_eq!(store.panel_setting("host_domain").unwrap(), "aypapol.com");
        assert_eq!(store.panel_setting("unknown_key").unwrap(), "");
    }

    #[test]
    fn stored_value_wins_and_unset_restores_default() {
        let store = Store::open_in_memory().unwrap();
        store.panel_setting_set("max_backups_per_server", "3").unwrap();
        assert_eq!(store.panel_setting_u64("max_backups_per_server").unwrap(), 3);

        store.panel_setting_unset("max_backups_per_server").unwrap();
        assert_eq!(store.panel_setting_u64("max_backups_per_server").unwrap(), 5);
    }

    #[test]
    fn unparseable_number_falls_back_to_default() {
        let store = Store::open_in_memory().unwrap();
        store.panel_setting_set("game_cpu_limit", "lots").unwrap();
        assert_eq!(store.panel_setting_u64("game_cpu_limit").unwrap(), 3);
    }

    #[test]
    fn bot_settings_default_to_empty() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.bot_setting("crashes_channel_id").unwrap(), "");
        store.bot_setting_set("crashes_channel_id", "123").unwrap();
        assert_eq!(store.bot_setting("crashes_channel_id").unwrap(), "123");

        let all = store.bot_settings_all().unwrap();
        assert_eq!(all.len(), BOT_KEYS.len());
        assert_eq!(all["crashes_channel_id"], "123");
    }
}
