use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PanelConfig {
    pub server: ServerConfig,
    pub docker: DockerConfig,
    pub paths: PathsConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Public origin of the dashboard, allowed through CORS.
    pub public_url: String,
    /// Timeout for non-streaming requests (seconds).
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            public_url: String::new(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Engine socket path; empty means the platform default.
    pub socket: String,
    /// Name prefix of panel-managed game containers.
    pub container_prefix: String,
    /// Compose project that owns the panel's own infrastructure containers.
    /// Containers labelled with it are never treated as game servers.
    pub compose_project: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: "/var/run/docker.sock".to_string(),
            container_prefix: "game-panel-".to_string(),
            compose_project: "game-panel".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Panel-owned data (db, banners, templates); also the df probe target.
    pub data_dir: String,
    /// Backup archives live under `<backup_root>/<server_id>/`.
    pub backup_root: String,
    /// Where the game volumes' `/data/...` host paths are mounted inside
    /// this process's own container.
    pub host_data: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: "/data".to_string(),
            backup_root: "/backups".to_string(),
            host_data: "/host-data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "/data/panel.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret for the bot principal (`X-Bot-Api-Key`). Empty
    /// disables bot access entirely.
    pub bot_api_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Generic webhook fallback; empty disables it.
    pub webhook_url: String,
    /// Base URL of the chat API the channel notifier posts to.
    pub chat_api_base: String,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            chat_api_base: "https://discord.com/api/v10".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "panel=info,runtime=info".to_string(),
        }
    }
}

impl PanelConfig {
    /// Load configuration: compile-time defaults, then `panel.toml` if
    /// present, then `PANEL__`-prefixed environment variables
    /// (double underscore for nesting: `PANEL__SERVER__BIND_ADDRESS`).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&PanelConfig::default())
            .context("Failed to serialize default configuration")?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("/etc/game-panel/panel").required(false))
            .add_source(config::File::with_name("config/panel").required(false))
            .add_source(
                config::Environment::with_prefix("PANEL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: PanelConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid bind address '{}'", self.server.bind_address))?;
        if self.docker.container_prefix.is_empty() {
            anyhow::bail!("docker.container_prefix must not be empty");
        }
        Ok(())
    }

    pub fn banners_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.paths.data_dir).join("banners")
    }

    pub fn templates_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.paths.data_dir).join("templates.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PanelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.docker.container_prefix, "game-panel-");
        assert_eq!(config.store.path, "/data/panel.db");
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let mut config = PanelConfig::default();
        config.docker.container_prefix.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_bind_address_is_rejected() {
        let mut config = PanelConfig::default();
        config.server.bind_address = "not-an-addr".to_string();
        assert!(config.validate().is_err());
    }
}
