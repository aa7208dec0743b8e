//! Event-stream endpoints.
//!
//! Every subscriber gets its own cold producer from the telemetry fabric,
//! wrapped in the SSE envelope (`data: <json>\n\n`, no event names, no ids,
//! no retry hints). Dropping the response body — the client went away —
//! cancels the producer's token, which closes the underlying socket or
//! engine stream. A producer error mid-stream emits one terminal record if
//! the client is still attached, then closes.

use async_stream::stream;
use axum::extract::{Path, State};
use axum::http::{header, HeaderName};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use runtime::telemetry::{logs, stats};
use runtime::RuntimeError;

use crate::error::{ApiError, ApiResult};
use crate::http::auth::UserPrincipal;
use crate::scheduler::{COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL};
use crate::state::AppState;

const STREAM_ENDED: &str = "\"..stream ended..\"";

/// Frame a payload stream as an event-stream response.
pub fn sse_response(
    payloads: impl Stream<Item = String> + Send + 'static,
) -> impl IntoResponse {
    let events = payloads.map(|payload| Ok::<_, Infallible>(Event::default().data(payload)));
    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    )
}

/// Whether the named container was created with a TTY; missing containers
/// surface as 404 before the stream starts.
async fn container_tty(state: &AppState, name: &str) -> ApiResult<bool> {
    match state.docker.inspect_container(name).await {
        Ok(info) => Ok(info.state_info.map(|s| s.tty).unwrap_or(false)),
        Err(RuntimeError::ContainerNotFound(_)) => {
            Err(ApiError::NotFound(format!("Container '{name}'")))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn log_payloads_for(
    state: &AppState,
    container: String,
    tty: bool,
) -> impl Stream<Item = String> + Send + 'static {
    let cancel = CancellationToken::new();
    let lines = logs::tail_lines(
        state.docker.socket_path().to_string(),
        container,
        tty,
        cancel.clone(),
    );
    let guard = cancel.drop_guard();
    stream! {
        let _guard = guard;
        tokio::pin!(lines);
        while let Some(item) = lines.next().await {
            match item {
                Ok(line) => yield json!(line).to_string(),
                Err(e) => {
                    tracing::debug!(error = %e, "log producer ended");
                    yield STREAM_ENDED.to_string();
                    break;
                }
            }
        }
    }
}

fn stats_payloads(
    state: &AppState,
    container: String,
) -> impl Stream<Item = String> + Send + 'static {
    let cancel = CancellationToken::new();
    let samples = stats::stats_stream((*state.docker).clone(), container, cancel.clone());
    let guard = cancel.drop_guard();
    stream! {
        let _guard = guard;
        tokio::pin!(samples);
        while let Some(item) = samples.next().await {
            match item {
                Ok(sample) => yield json!(sample).to_string(),
                Err(e) => {
                    tracing::debug!(error = %e, "stats producer ended");
                    yield STREAM_ENDED.to_string();
                    break;
                }
            }
        }
    }
}

pub async fn server_logs(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .server_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;
    let container = state.scheduler.container_name(&id);
    let tty = container_tty(&state, &container).await?;
    Ok(sse_response(log_payloads_for(&state, container, tty)))
}

pub async fn server_stats(
    State(state): State<AppState>,
    _user: UserPrincipal,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .server_by_id(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("Server '{id}'")))?;
    let container = state.scheduler.container_name(&id);
    // Inspect up front so a missing container is a 404, not a dead stream.
    container_tty(&state, &container).await?;
    Ok(sse_response(stats_payloads(&state, container)))
}

/// Machine-level samples: CPU, RAM, disk under the data root.
pub async fn host_stats(
    State(state): State<AppState>,
    _user: UserPrincipal,
) -> ApiResult<impl IntoResponse> {
    let cancel = CancellationToken::new();
    let samples = runtime::telemetry::host::host_stream(
        state.config.paths.data_dir.clone(),
        cancel.clone(),
    );
    let guard = cancel.drop_guard();
    let payloads = stream! {
        let _guard = guard;
        tokio::pin!(samples);
        while let Some(item) = samples.next().await {
            match item {
                Ok(sample) => yield json!(sample).to_string(),
                Err(e) => {
                    tracing::debug!(error = %e, "host sampler ended");
                    yield STREAM_ENDED.to_string();
                    break;
                }
            }
        }
    };
    Ok(sse_response(payloads))
}

/// One response fanning in the stats of every infrastructure service,
/// each record tagged with `service=<name>`. Stays open until the client
/// disconnects; producers that settle early are skipped.
pub async fn services_stats(
    State(state): State<AppState>,
    _user: UserPrincipal,
) -> ApiResult<impl IntoResponse> {
    let containers = state.docker.list_containers(false).await?;
    let services: Vec<(String, String)> = containers
        .into_iter()
        .filter(|c| {
            c.labels.get(COMPOSE_PROJECT_LABEL) == Some(&state.config.docker.compose_project)
        })
        .map(|c| {
            let service = c
                .labels
                .get(COMPOSE_SERVICE_LABEL)
                .cloned()
                .unwrap_or_else(|| c.name.clone());
            (service, c.name)
        })
        .collect();

    let cancel = CancellationToken::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(64);

    for (service, container) in services {
        let docker = (*state.docker).clone();
        let tx = tx.clone();
        let token = cancel.child_token();
        tokio::spawn(async move {
            let samples = stats::stats_stream(docker, container, token);
            tokio::pin!(samples);
            while let Some(item) = samples.next().await {
                match item {
                    Ok(sample) => {
                        let mut record = json!(sample);
                        record["service"] = json!(service);
                        if tx.send(record.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(service = %service, error = %e,
                            "service stats producer ended");
                        break;
                    }
                }
            }
        });
    }
    drop(tx);

    let guard = cancel.drop_guard();
    let payloads = stream! {
        let _guard = guard;
        while let Some(payload) = rx.recv().await {
            yield payload;
        }
    };
    Ok(sse_response(payloads))
}
