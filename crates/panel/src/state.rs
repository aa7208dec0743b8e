use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use runtime::DockerClient;

use crate::backup::BackupEngine;
use crate::config::PanelConfig;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PanelConfig>,
    pub store: Arc<Store>,
    pub docker: Arc<DockerClient>,
    pub scheduler: Arc<Scheduler>,
    pub backups: Arc<BackupEngine>,
    pub notifier: Arc<dyn Notifier>,
    pub started_at: Instant,
    /// Fires once at shutdown; background tasks subscribe.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: PanelConfig,
        store: Arc<Store>,
        docker: Arc<DockerClient>,
        scheduler: Arc<Scheduler>,
        backups: Arc<BackupEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            docker,
            scheduler,
            backups,
            notifier,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }
}
