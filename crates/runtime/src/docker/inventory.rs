//! Lightweight container views derived from the engine's list and inspect APIs.

use bollard::models::{ContainerInspectResponse, ContainerSummary};
use chrono::DateTime;
use std::collections::HashMap;

/// Detailed container state information from docker inspect.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContainerStateInfo {
    pub running: bool,
    pub paused: bool,
    pub exit_code: i32,
    pub started_at: String,
    pub finished_at: String,
    pub restart_count: i32,
    /// Whether the container was created with a TTY attached. Determines
    /// the log wire format: raw bytes with a TTY, multiplexed frames without.
    pub tty: bool,
}

/// Basic container information derived from Docker's list API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContainerInfo {
    pub id: String,    // Full container ID 64-char hash
    pub name: String,  // Without leading slash
    pub image: String,
    pub state: String, // "running", "paused", "exited"
    pub status: String, // "Up 2 hours"
    pub labels: HashMap<String, String>,
    pub created_at: i64,
    pub state_info: Option<ContainerStateInfo>, // Only populated by inspect
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        if let Some(info) = &self.state_info {
            return info.running;
        }
        self.state == "running"
    }
}

impl From<ContainerSummary> for ContainerInfo {
    fn from(s: ContainerSummary) -> Self {
        Self {
            id: s.id.unwrap_or_default(),
            name: s
                .names
                .as_deref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/'))
                .unwrap_or("unknown")
                .to_string(),
            image: s.image.unwrap_or_default(),
            state: s
                .state
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".into()),
            status: s.status.unwrap_or_default(),
            labels: s.labels.unwrap_or_default(),
            created_at: s.created.unwrap_or_default(),
            state_info: None, // Not available in list API
        }
    }
}

impl From<ContainerInspectResponse> for ContainerInfo {
    fn from(details: ContainerInspectResponse) -> Self {
        // Inspect returns "Created" as an RFC3339 string, unlike List's i64
        let created_at = details
            .created
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.timestamp())
            .unwrap_or(0);

        let tty = details
            .config
            .as_ref()
            .and_then(|c| c.tty)
            .unwrap_or(false);

        let state_info = details.state.as_ref().map(|s| ContainerStateInfo {
            running: s.running.unwrap_or(false),
            paused: s.paused.unwrap_or(false),
            exit_code: s.exit_code.map(|c| c as i32).unwrap_or(0),
            started_at: s.started_at.clone().unwrap_or_default(),
            finished_at: s.finished_at.clone().unwrap_or_default(),
            restart_count: details.restart_count.map(|c| c as i32).unwrap_or(0),
            tty,
        });

        Self {
            id: details.id.unwrap_or_default(),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| "unknown".into()),
            image: details.image.unwrap_or_default(),
            state: details
                .state
                .as_ref()
                .and_then(|s| s.status.as_ref())
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".into()),
            // Status is often empty in Inspect, unlike List; reconstruct it
            status: details
                .state
                .as_ref()
                .and_then(|s| s.status.as_ref())
                .map(|s| format!("{:?}", s))
                .unwrap_or_default(),
            labels: details.config.and_then(|c| c.labels).unwrap_or_default(),
            created_at,
            state_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, ContainerState, ContainerStateStatusEnum};

    #[test]
    fn summary_name_strips_leading_slash() {
        let summary = ContainerSummary {
            names: Some(vec!["/game-panel-mc".to_string()]),
            state: Some(bollard::models::ContainerSummaryStateEnum::RUNNING),
            ..Default::default()
        };
        let info = ContainerInfo::from(summary);
        assert_eq!(info.name, "game-panel-mc");
        assert!(info.is_running());
    }

    #[test]
    fn inspect_carries_tty_and_running_flags() {
        let details = ContainerInspectResponse {
            name: Some("/game-panel-vh".to_string()),
            config: Some(ContainerConfig {
                tty: Some(true),
                ..Default::default()
            }),
            state: Some(ContainerState {
                status: Some(ContainerStateStatusEnum::RUNNING),
                running: Some(true),
                started_at: Some("2026-01-10T12:00:00Z".to_string()),
                ..Default::default()
            }),
            restart_count: Some(2),
            ..Default::default()
        };
        let info = ContainerInfo::from(details);
        let state = info.state_info.as_ref().unwrap();
        assert!(state.running);
        assert!(state.tty);
        assert_eq!(state.restart_count, 2);
        assert!(info.is_running());
    }

    #[test]
    fn inspect_without_state_is_not_running() {
        let details = ContainerInspectResponse {
            name: Some("/game-panel-mc".to_string()),
            ..Default::default()
        };
        let info = ContainerInfo::from(details);
        assert!(!info.is_running());
    }
}
