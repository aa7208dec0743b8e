mod backup;
mod config;
mod error;
mod http;
mod notify;
mod scheduler;
mod state;
mod store;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use runtime::DockerClient;

use crate::backup::BackupEngine;
use crate::config::PanelConfig;
use crate::notify::{ChannelNotifier, CompositeNotifier, Notifier, WebhookNotifier};
use crate::scheduler::Scheduler;
use crate::state::AppState;
use crate::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting game panel v{}", env!("CARGO_PKG_VERSION"));

    let config = PanelConfig::load().context("Failed to load configuration")?;
    info!("Configuration loaded; bind address {}", config.server.bind_address);

    let store = Arc::new(
        Store::open(&config.store.path)
            .with_context(|| format!("Failed to open store at {}", config.store.path))?,
    );
    info!("Store ready at {}", config.store.path);

    let docker = Arc::new(
        DockerClient::new(&config.docker.socket).context("Failed to connect to Docker")?,
    );
    info!("Connected to Docker daemon at {}", config.docker.socket);

    let notify_timeout = Duration::from_secs(config.notify.timeout_secs);
    let channel = ChannelNotifier::new(
        Arc::clone(&store),
        config.notify.chat_api_base.clone(),
        notify_timeout,
    );
    let webhook = if config.notify.webhook_url.is_empty() {
        None
    } else {
        Some(WebhookNotifier::new(
            config.notify.webhook_url.clone(),
            notify_timeout,
        ))
    };
    let notifier: Arc<dyn Notifier> = Arc::new(CompositeNotifier::new(channel, webhook));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&docker),
        Arc::clone(&notifier),
        config.docker.container_prefix.clone(),
    ));

    let backups = Arc::new(BackupEngine::new(
        Arc::clone(&store),
        Arc::clone(&docker),
        Arc::clone(&scheduler),
        &config.paths.backup_root,
        &config.paths.host_data,
    ));

    let state = AppState::new(config, store, docker, scheduler, backups, notifier);

    // Hourly maintenance: auto-backups and auth-session expiry
    tokio::spawn(backup::ticker::run(
        Arc::clone(&state.store),
        Arc::clone(&state.scheduler),
        Arc::clone(&state.backups),
        state.shutdown.child_token(),
    ));

    let app = http::build_router(state.clone());

    let addr: SocketAddr = state
        .config
        .server
        .bind_address
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Game panel listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.shutdown.cancel();
    info!("Server shut down gracefully");
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "panel=info,runtime=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Graceful shutdown on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
