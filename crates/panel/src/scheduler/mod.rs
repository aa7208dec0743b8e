//! Container-exclusive scheduler.
//!
//! Owns every transition of a server between Stopped/Starting/Running/
//! Stopping, the run ledger rows those transitions produce, and the crash
//! watchers. At most one game container runs at a time: starting a server
//! replaces whatever was active. State-changing operations serialize on one
//! mutex — contention is negligible on a single-host control plane, and a
//! global lock also covers the cross-server replacement path.

pub mod watcher;

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use runtime::docker::container::GameContainerSpec;
use runtime::{ContainerInfo, DockerClient, RuntimeError};

use crate::error::{ApiError, ApiResult};
use crate::notify::Notifier;
use crate::store::runs::StopReason;
use crate::store::{now_unix, Store};

/// Compose attaches this label to every container it manages; game
/// containers are created bare, so the label's absence is what marks a
/// container as ours to schedule.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

const STOP_GRACE_SECONDS: u32 = 10;
const WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Derived from the engine on demand; never persisted. The open run row is
/// the authoritative "is running" signal for history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Missing,
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ServerStatus {
    /// Map an engine state string ("running", "paused", "exited", ...) for a
    /// present container.
    pub fn from_engine_state(state: &str) -> Self {
        match state {
            "running" | "paused" => ServerStatus::Running,
            "restarting" => ServerStatus::Starting,
            "removing" => ServerStatus::Stopping,
            _ => ServerStatus::Stopped,
        }
    }
}

pub struct Scheduler {
    store: Arc<Store>,
    docker: Arc<DockerClient>,
    notifier: Arc<dyn Notifier>,
    container_prefix: String,
    /// Serializes Start/Stop/Delete across all servers.
    transitions: tokio::sync::Mutex<()>,
    /// id → cancellation token of the live crash watcher.
    watchers: Arc<DashMap<String, CancellationToken>>,
    /// ids whose next observed stop is intentional (user stop or
    /// replacement) and must not be reported as a crash.
    intentional_stops: Arc<DashMap<String, ()>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        docker: Arc<DockerClient>,
        notifier: Arc<dyn Notifier>,
        container_prefix: String,
    ) -> Self {
        Self {
            store,
            docker,
            notifier,
            container_prefix,
            transitions: tokio::sync::Mutex::new(()),
            watchers: Arc::new(DashMap::new()),
            intentional_stops: Arc::new(DashMap::new()),
        }
    }

    pub fn container_name(&self, server_id: &str) -> String {
        format!("{}{}", self.container_prefix, server_id)
    }

    pub fn server_id_of(&self, container_name: &str) -> Option<String> {
        container_name
            .strip_prefix(&self.container_prefix)
            .map(str::to_string)
    }

    /// The at-most-one running container whose name carries the managed
    /// prefix and which is not one of our own infrastructure containers.
    pub async fn active_game_container(&self) -> ApiResult<Option<ContainerInfo>> {
        let containers = self.docker.list_containers(false).await?;
        Ok(containers.into_iter().find(|c| {
            c.name.starts_with(&self.container_prefix)
                && !c.labels.contains_key(COMPOSE_PROJECT_LABEL)
                && c.is_running()
        }))
    }

    pub async fn status(&self, server_id: &str) -> ApiResult<ServerStatus> {
        let name = self.container_name(server_id);
        match self.docker.inspect_container(&name).await {
            Ok(info) => Ok(if info.is_running() {
                ServerStatus::Running
            } else {
                ServerStatus::from_engine_state(&info.state)
            }),
            Err(RuntimeError::ContainerNotFound(_)) => Ok(ServerStatus::Missing),
            Err(e) => Err(e.into()),
        }
    }

    /// Start a server, replacing whatever game container is active.
    pub async fn start(&self, server_id: &str) -> ApiResult<()> {
        let _guard = self.transitions.lock().await;

        let server = self
            .store
            .server_by_id(server_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Server '{server_id}'")))?;

        // Replace the currently active game, if it is someone else. The
        // replaced run closes before the new run opens, and the old
        // container's stop returns before the new one starts.
        if let Some(active) = self.active_game_container().await? {
            if let Some(active_id) = self.server_id_of(&active.name) {
                if active_id != server_id {
                    self.intentional_stops.insert(active_id.clone(), ());
                    self.cancel_watcher(&active_id);
                    if let Err(e) = self
                        .docker
                        .stop_container(&active.name, STOP_GRACE_SECONDS)
                        .await
                    {
                        tracing::warn!(container = %active.name, error = %e,
                            "stop of replaced server failed; not retried");
                    }
                    self.store
                        .run_stop(&active_id, StopReason::Replaced, now_unix())?;
                }
            }
        }

        // A leftover container under the target name (crashed, or raced in
        // by a concurrent start) always gives way.
        let name = self.container_name(server_id);
        match self.docker.remove_container(&name, true).await {
            Ok(()) | Err(RuntimeError::ContainerNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let env = resolve_env(&server.env_vars, |var| std::env::var(var).ok());

        // Pull/create/start failures abort with no run row written.
        self.docker.pull_image(&server.docker_image).await?;

        let memory_gb = self.store.panel_setting_u64("game_memory_limit_gb")?;
        let cpu_limit = self.store.panel_setting_u64("game_cpu_limit")?;
        let spec = GameContainerSpec {
            name: name.clone(),
            image: server.docker_image.clone(),
            env,
            binds: server.volumes.clone(),
            memory_limit_bytes: (memory_gb as i64) << 30,
            nano_cpus: (cpu_limit as i64) * 1_000_000_000,
            labels: HashMap::from([("game-panel.server".to_string(), server_id.to_string())]),
        };
        self.docker.create_container(&spec).await?;
        self.docker.start_container(&name).await?;

        // A stale intentional mark from an earlier stop must not mask a
        // future crash of this fresh run.
        self.intentional_stops.remove(server_id);
        self.store.run_start(server_id, now_unix())?;
        self.spawn_watcher(server_id, server.name.clone());

        tracing::info!(server = server_id, container = %name, "server started");
        Ok(())
    }

    /// Stop a server. The pseudo-id `active` resolves to whatever game
    /// container is currently running; with none, this is a no-op.
    pub async fn stop(&self, server_id: &str) -> ApiResult<String> {
        let _guard = self.transitions.lock().await;

        let target = if server_id == "active" {
            let active = self.active_game_container().await?;
            match active.and_then(|c| self.server_id_of(&c.name)) {
                Some(id) => id,
                None => return Ok("No server running".to_string()),
            }
        } else {
            self.store
                .server_by_id(server_id)?
                .ok_or_else(|| ApiError::NotFound(format!("Server '{server_id}'")))?;
            server_id.to_string()
        };

        self.intentional_stops.insert(target.clone(), ());
        self.cancel_watcher(&target);

        let name = self.container_name(&target);
        match self.docker.stop_container(&name, STOP_GRACE_SECONDS).await {
            Ok(()) | Err(RuntimeError::ContainerNotFound(_)) => {}
            Err(e) => {
                tracing::warn!(container = %name, error = %e, "stop failed; not retried");
            }
        }
        self.store.run_stop(&target, StopReason::User, now_unix())?;

        tracing::info!(server = %target, "server stopped");
        Ok(format!("Server '{target}' stopped"))
    }

    /// Stop (when running) and start again.
    pub async fn restart(&self, server_id: &str) -> ApiResult<()> {
        if self.status(server_id).await? == ServerStatus::Running {
            self.stop(server_id).await?;
        }
        self.start(server_id).await
    }

    /// Delete a server and its run history. Backups survive to support
    /// post-mortem restore.
    pub async fn delete(&self, server_id: &str) -> ApiResult<()> {
        let _guard = self.transitions.lock().await;

        self.store
            .server_by_id(server_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Server '{server_id}'")))?;

        if self.status(server_id).await? == ServerStatus::Running {
            return Err(ApiError::Invalid(
                "Cannot delete while server is running".to_string(),
            ));
        }

        self.cancel_watcher(server_id);
        self.intentional_stops.remove(server_id);
        let name = self.container_name(server_id);
        match self.docker.remove_container(&name, true).await {
            Ok(()) | Err(RuntimeError::ContainerNotFound(_)) => {}
            Err(e) => {
                tracing::warn!(container = %name, error = %e, "container removal failed");
            }
        }

        self.store.runs_delete_for_server(server_id)?;
        self.store.server_delete(server_id)?;
        tracing::info!(server = server_id, "server deleted");
        Ok(())
    }

    fn cancel_watcher(&self, server_id: &str) {
        if let Some((_, token)) = self.watchers.remove(server_id) {
            token.cancel();
        }
    }

    fn spawn_watcher(&self, server_id: &str, display_name: String) {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .watchers
            .insert(server_id.to_string(), token.clone())
        {
            previous.cancel();
        }
        tokio::spawn(watcher::watch(watcher::WatchContext {
            store: Arc::clone(&self.store),
            docker: Arc::clone(&self.docker),
            notifier: Arc::clone(&self.notifier),
            watchers: Arc::clone(&self.watchers),
            intentional_stops: Arc::clone(&self.intentional_stops),
            server_id: server_id.to_string(),
            display_name,
            container_name: self.container_name(server_id),
            poll_interval: WATCH_INTERVAL,
            cancel: token,
        }));
    }
}

/// Expand `${VAR}` placeholders in env values; unknown variables become the
/// empty string.
pub fn resolve_env(
    env: &HashMap<String, String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<String> {
    let mut entries: Vec<(&String, &String)> = env.iter().collect();
    entries.sort();
    entries
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, expand_placeholders(value, &lookup)))
        .collect()
}

fn expand_placeholders(value: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let var = &rest[start + 2..start + 2 + end];
                if let Some(resolved) = lookup(var) {
                    out.push_str(&resolved);
                }
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                // Unterminated placeholder passes through verbatim
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}
