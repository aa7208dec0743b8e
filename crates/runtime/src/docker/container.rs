//! Container domain — list, inspect, lifecycle, create, and stats.

use super::client::{DockerClient, RuntimeError};
use super::inventory::ContainerInfo;

use bollard::models::{
    ContainerCreateBody, HostConfig, HostConfigLogConfig, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    RestartContainerOptions, StatsOptions, StopContainerOptions,
};
use std::collections::HashMap;

/// Memory floor the kernel keeps available to a game container even under
/// host pressure.
const MEMORY_RESERVATION_BYTES: i64 = 512 * 1024 * 1024;

/// Everything the scheduler decides about a game container, in engine-neutral
/// terms. The adapter translates this into the engine's create request.
#[derive(Debug, Clone)]
pub struct GameContainerSpec {
    pub name: String,
    pub image: String,
    /// `KEY=VALUE` pairs, already placeholder-expanded by the caller.
    pub env: Vec<String>,
    /// host path → container path
    pub binds: HashMap<String, String>,
    pub memory_limit_bytes: i64,
    pub nano_cpus: i64,
    pub labels: HashMap<String, String>,
}

impl DockerClient {
    pub async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let options = Some(ListContainersOptions {
            all: include_stopped,
            ..Default::default()
        });
        let containers = self.client.list_containers(options).await?;
        Ok(containers.into_iter().map(|c| c.into()).collect())
    }

    pub async fn inspect_container(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        let details = self
            .client
            .inspect_container(name, None)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                    RuntimeError::ContainerNotFound(name.to_string())
                }
                other => RuntimeError::BollardError(other),
            })?;
        Ok(ContainerInfo::from(details))
    }

    /// Create a game container. Host networking (the game binds its own
    /// port), unless-stopped restart policy, and rotated json-file logs
    /// (50 MiB × 3) are fixed; limits come from the spec.
    pub async fn create_container(&self, spec: &GameContainerSpec) -> Result<(), RuntimeError> {
        let binds: Vec<String> = spec
            .binds
            .iter()
            .map(|(host, container)| format!("{}:{}", host, container))
            .collect();

        let log_config = HostConfigLogConfig {
            typ: Some("json-file".to_string()),
            config: Some(HashMap::from([
                ("max-size".to_string(), "50m".to_string()),
                ("max-file".to_string(), "3".to_string()),
            ])),
        };

        let host_config = HostConfig {
            network_mode: Some("host".to_string()),
            binds: if binds.is_empty() { None } else { Some(binds) },
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            memory: Some(spec.memory_limit_bytes),
            memory_reservation: Some(MEMORY_RESERVATION_BYTES),
            nano_cpus: Some(spec.nano_cpus),
            log_config: Some(log_config),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.clone())
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: Some(spec.name.clone()),
            ..Default::default()
        });

        self.client.create_container(options, body).await?;
        Ok(())
    }

    /// Returns container stats either as a single snapshot or a continuous
    /// stream of engine samples.
    pub fn stats(
        &self,
        name: &str,
        stream: bool,
    ) -> impl tokio_stream::Stream<
        Item = Result<bollard::models::ContainerStatsResponse, bollard::errors::Error>,
    > {
        let options = Some(StatsOptions {
            stream,
            ..Default::default()
        });
        self.client.stats(name, options)
    }

    // ── Container Lifecycle ───────────────────────────────────────

    /// Start a stopped container.
    pub async fn start_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.client
            .start_container(name, None)
            .await
            .map_err(|e| Self::map_not_found(name, e))
    }

    /// Stop a running container with a grace period (in seconds).
    pub async fn stop_container(&self, name: &str, grace_seconds: u32) -> Result<(), RuntimeError> {
        let options = Some(StopContainerOptions {
            t: Some(grace_seconds as i32),
            ..Default::default()
        });
        self.client
            .stop_container(name, options)
            .await
            .map_err(|e| Self::map_not_found(name, e))
    }

    /// Restart a container with a grace period (in seconds).
    pub async fn restart_container(
        &self,
        name: &str,
        grace_seconds: u32,
    ) -> Result<(), RuntimeError> {
        let options = Some(RestartContainerOptions {
            t: Some(grace_seconds as i32),
            ..Default::default()
        });
        self.client
            .restart_container(name, options)
            .await
            .map_err(|e| Self::map_not_found(name, e))
    }

    /// Pause a running container (freezes all processes).
    pub async fn pause_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.client
            .pause_container(name)
            .await
            .map_err(|e| Self::map_not_found(name, e))
    }

    /// Unpause a paused container.
    pub async fn unpause_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.client
            .unpause_container(name)
            .await
            .map_err(|e| Self::map_not_found(name, e))
    }

    /// Remove a container. If `force` is true, the container will be killed first.
    pub async fn remove_container(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        let options = Some(RemoveContainerOptions {
            force,
            ..Default::default()
        });
        self.client
            .remove_container(name, options)
            .await
            .map_err(|e| Self::map_not_found(name, e))
    }

    fn map_not_found(name: &str, e: bollard::errors::Error) -> RuntimeError {
        match e {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                RuntimeError::ContainerNotFound(name.to_string())
            }
            other => RuntimeError::BollardError(other),
        }
    }
}
