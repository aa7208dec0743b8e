//! Crash watcher — one single-shot background task per running server.
//!
//! Polls the container every 30 s. When the container is observed not
//! running, the watcher removes itself from the registry and either tears
//! down silently (the stop was intentional) or closes the open run as a
//! crash and notifies. Transient engine errors are swallowed and retried on
//! the next tick. Starting a server cancels any prior watcher for its id.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use runtime::{DockerClient, RuntimeError};

use crate::notify::Notifier;
use crate::store::runs::StopReason;
use crate::store::{now_unix, Store};

pub(crate) struct WatchContext {
    pub store: Arc<Store>,
    pub docker: Arc<DockerClient>,
    pub notifier: Arc<dyn Notifier>,
    pub watchers: Arc<DashMap<String, CancellationToken>>,
    pub intentional_stops: Arc<DashMap<String, ()>>,
    pub server_id: String,
    pub display_name: String,
    pub container_name: String,
    pub poll_interval: Duration,
    pub cancel: CancellationToken,
}

pub(crate) async fn watch(ctx: WatchContext) {
    let mut interval = tokio::time::interval(ctx.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; the container was just started.
    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                ctx.watchers.remove(&ctx.server_id);
                return;
            }
            _ = interval.tick() => {}
        }

        let running = match ctx.docker.inspect_container(&ctx.container_name).await {
            Ok(info) => info.is_running(),
            Err(RuntimeError::ContainerNotFound(_)) => false,
            Err(e) => {
                tracing::debug!(container = %ctx.container_name, error = %e,
                    "watcher poll failed; retrying next tick");
                continue;
            }
        };
        if running {
            continue;
        }

        // Single-shot: deregister before acting so a concurrent start can
        // install a fresh watcher without racing this one.
        ctx.watchers.remove(&ctx.server_id);

        if ctx.intentional_stops.remove(&ctx.server_id).is_some() {
            tracing::debug!(server = %ctx.server_id, "intentional stop observed");
            return;
        }

        tracing::warn!(server = %ctx.server_id, container = %ctx.container_name,
            "unexpected container stop");
        if let Err(e) = ctx.store.run_stop(&ctx.server_id, StopReason::Crash, now_unix()) {
            tracing::error!(server = %ctx.server_id, error = %e,
                "failed to close run after crash");
        }
        ctx.notifier.crash(&ctx.display_name).await;
        return;
    }
}
