//! HTTP surface — route table, CORS, body limits, timeouts.
//!
//! Streaming routes live in their own sub-router so the request timeout
//! never tears down a healthy event stream.

pub mod auth;
pub mod backups;
pub mod banners;
pub mod health;
pub mod notifications;
pub mod servers;
pub mod services;
pub mod settings;
pub mod streams;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Request bodies are small JSON except banner uploads (≤5 MiB plus
/// multipart framing).
const BODY_LIMIT: usize = 6 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.server.public_url.is_empty() {
        // Same-origin only
        CorsLayer::new()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .server
            .public_url
            .split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static(auth::BOT_KEY_HEADER),
            ])
            .allow_credentials(true)
    };

    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let streaming = Router::new()
        .route("/api/servers/{id}/logs", get(streams::server_logs))
        .route("/api/servers/{id}/stats", get(streams::server_stats))
        .route("/api/services/host/stats", get(streams::host_stats))
        .route("/api/services/stats", get(streams::services_stats))
        .route("/api/services/{name}/logs", get(services::logs))
        .with_state(state.clone());

    let api = Router::new()
        .route("/api/health", get(health::health))
        .route("/api/health/status", get(health::health_status))
        .route("/api/servers", get(servers::list).post(servers::create))
        .route("/api/servers/catalog", get(servers::catalog))
        .route(
            "/api/servers/{id}",
            get(servers::detail).delete(servers::delete),
        )
        .route("/api/servers/{id}/start", post(servers::start))
        .route("/api/servers/{id}/stop", post(servers::stop))
        .route("/api/servers/{id}/restart", post(servers::restart))
        .route(
            "/api/servers/{id}/config",
            get(servers::get_config).put(servers::put_config),
        )
        .route("/api/servers/{id}/history", get(servers::history))
        .route(
            "/api/servers/{id}/banner",
            get(banners::fetch)
                .post(banners::upload)
                .delete(banners::remove),
        )
        .route(
            "/api/servers/{id}/backups",
            get(backups::list).post(backups::create),
        )
        .route(
            "/api/servers/{id}/backups/{bid}",
            get(backups::detail).delete(backups::delete),
        )
        .route("/api/servers/{id}/backups/{bid}/restore", post(backups::restore))
        .route("/api/servers/{id}/backups/{bid}/download", get(backups::download))
        .route(
            "/api/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route(
            "/api/bot/settings",
            get(settings::get_bot_settings).put(settings::put_bot_settings),
        )
        .route("/api/bot/channels", get(settings::get_bot_channels))
        .route("/api/notifications/error", post(notifications::post_error))
        .route("/api/services/{name}/restart", post(services::restart))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state);

    Router::new()
        .merge(api)
        .merge(streaming)
        .route("/", get(root))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(BODY_LIMIT))
                .layer(cors),
        )
}

async fn root() -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({
        "name": "game-panel",
        "version": env!("CARGO_PKG_VERSION"),
        "api": "/api",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::BackupEngine;
    use crate::config::PanelConfig;
    use crate::notify::testing::RecordingNotifier;
    use crate::scheduler::Scheduler;
    use crate::store::sessions::AuthSession;
    use crate::store::{now_unix, Store};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use runtime::DockerClient;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOT_KEY: &str = "test-bot-secret";

    fn test_state() -> AppState {
        let mut config = PanelConfig::default();
        config.auth.bot_api_key = BOT_KEY.to_string();
        // No engine listens here; handlers that need it will 500, which the
        // tests below avoid.
        config.docker.socket = "/tmp/panel-router-test.sock".to_string();

        let store = Arc::new(Store::open_in_memory().unwrap());
        let docker = Arc::new(DockerClient::new(&config.docker.socket).unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&docker),
            notifier.clone(),
            config.docker.container_prefix.clone(),
        ));
        let backups = Arc::new(BackupEngine::new(
            Arc::clone(&store),
            Arc::clone(&docker),
            Arc::clone(&scheduler),
            &config.paths.backup_root,
            &config.paths.host_data,
        ));
        AppState::new(config, store, docker, scheduler, backups, notifier)
    }

    fn login(state: &AppState) -> String {
        let token = "test-session-token".to_string();
        state
            .store
            .session_insert(&AuthSession {
                token: token.clone(),
                principal_id: "user-1".to_string(),
                display_name: "Pol".to_string(),
                avatar_ref: None,
                expires_at: now_unix() + 3600,
            })
            .unwrap();
        format!("{}={}", auth::SESSION_COOKIE, token)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, cookie: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .header("cookie", cookie)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_open() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "ok": true }));
    }

    #[tokio::test]
    async fn create_requires_a_user_session() {
        let app = build_router(test_state());
        let request = Request::post("/api/servers")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "id": "mc", "name": "Minecraft" }).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_then_duplicate_and_port_conflict() {
        let state = test_state();
        let cookie = login(&state);
        let app = build_router(state);

        let body = serde_json::json!({
            "id": "mc",
            "name": "Minecraft",
            "docker_image": "itzg/minecraft-server:latest",
            "port": 25565,
        });
        let response = app
            .clone()
            .oneshot(post_json("/api/servers", &cookie, body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Same id again
        let response = app
            .clone()
            .oneshot(post_json("/api/servers", &cookie, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // Same port, different id: the error names the holder
        let response = app
            .oneshot(post_json(
                "/api/servers",
                &cookie,
                serde_json::json!({
                    "id": "mc2",
                    "name": "Minecraft 2",
                    "docker_image": "itzg/minecraft-server:latest",
                    "port": 25565,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("Minecraft"));
    }

    #[tokio::test]
    async fn bad_slug_is_rejected() {
        let state = test_state();
        let cookie = login(&state);
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                "/api/servers",
                &cookie,
                serde_json::json!({
                    "id": "Bad Id!",
                    "name": "x",
                    "docker_image": "img",
                    "port": 1000,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_reports_duration_and_reason() {
        let state = test_state();
        let cookie = login(&state);
        state
            .store
            .server_insert(&crate::store::servers::sample_server("mc", 25565))
            .unwrap();
        state.store.run_start("mc", 1000).unwrap();
        state
            .store
            .run_stop("mc", crate::store::runs::StopReason::Replaced, 1600)
            .unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::get("/api/servers/mc/history")
                    .header("cookie", &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["duration_seconds"], 600);
        assert_eq!(body[0]["stop_reason"], "replaced");
    }

    #[tokio::test]
    async fn settings_accept_bot_key_and_filter_unknown_keys() {
        let state = test_state();
        let cookie = login(&state);
        let app = build_router(state);

        // Bot principal may read
        let response = app
            .clone()
            .oneshot(
                Request::get("/api/settings")
                    .header(auth::BOT_KEY_HEADER, BOT_KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["max_backups_per_server"], "5");

        // Wrong key is rejected
        let response = app
            .clone()
            .oneshot(
                Request::get("/api/settings")
                    .header(auth::BOT_KEY_HEADER, "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Writes filter unrecognized keys silently
        let request = Request::put("/api/settings")
            .header("content-type", "application/json")
            .header("cookie", &cookie)
            .body(Body::from(
                serde_json::json!({
                    "max_backups_per_server": "3",
                    "rm_rf": "true",
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/api/settings")
                    .header("cookie", &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["max_backups_per_server"], "3");
        assert!(body.get("rm_rf").is_none());
    }

    #[tokio::test]
    async fn error_report_reaches_the_notifier() {
        let state = test_state();
        let cookie = login(&state);
        let app = build_router(state);

        let response = app
            .oneshot(post_json(
                "/api/notifications/error",
                &cookie,
                serde_json::json!({ "message": "boom", "component": "Dashboard" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "ok": true, "sent": true })
        );
    }

    #[tokio::test]
    async fn me_and_logout_round_trip() {
        let state = test_state();
        let cookie = login(&state);
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/auth/me")
                    .header("cookie", &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["display_name"], "Pol");

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/auth/logout")
                    .header("cookie", &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/api/auth/me")
                    .header("cookie", &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn backup_listing_requires_existing_server() {
        let state = test_state();
        let cookie = login(&state);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::get("/api/servers/ghost/backups")
                    .header("cookie", &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn catalog_defaults_to_empty() {
        let state = test_state();
        let app = build_router(state);
        let response = app
            .oneshot(
                Request::get("/api/servers/catalog")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }
}
