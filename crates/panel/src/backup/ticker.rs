//! Hourly maintenance loop: auto-backups of the active game and expiry of
//! stale auth sessions. Errors are logged and swallowed; the next tick
//! retries.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::BackupEngine;
use crate::scheduler::Scheduler;
use crate::store::{now_unix, Store};

const TICK: Duration = Duration::from_secs(3600);

pub async fn run(
    store: Arc<Store>,
    scheduler: Arc<Scheduler>,
    engine: Arc<BackupEngine>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Swallow the immediate first tick; the first pass runs an hour in.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        match store.sessions_expire(now_unix()) {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "expired auth sessions"),
            Err(e) => tracing::warn!(error = %e, "session expiry sweep failed"),
        }

        if let Err(e) = auto_backup_pass(&store, &scheduler, &engine).await {
            tracing::warn!(error = %e, "auto-backup pass failed");
        }
    }
}

/// Back up the active game when its newest backup is older than the
/// configured interval. Interval 0 disables the feature.
async fn auto_backup_pass(
    store: &Store,
    scheduler: &Scheduler,
    engine: &BackupEngine,
) -> crate::error::ApiResult<()> {
    let interval_hours = store.panel_setting_u64("auto_backup_interval_hours")?;
    if interval_hours == 0 {
        return Ok(());
    }

    let Some(active) = scheduler.active_game_container().await? else {
        return Ok(());
    };
    let Some(server_id) = scheduler.server_id_of(&active.name) else {
        return Ok(());
    };

    let interval_secs = interval_hours as i64 * 3600;
    let due = match store.backup_latest_created_at(&server_id)? {
        Some(latest) => now_unix() - latest >= interval_secs,
        // Never backed up: overdue by definition
        None => true,
    };
    if !due {
        return Ok(());
    }

    tracing::info!(server = %server_id, "auto-backup due");
    engine.create(&server_id).await?;
    Ok(())
}
