//! Generic webhook notifier — the fallback sink when the chat channel is
//! unconfigured or unreachable.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use super::{ErrorReport, Notifier};

pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http, url }
    }

    async fn post(&self, payload: serde_json::Value) -> bool {
        let result = self.http.post(&self.url).json(&payload).send().await;
        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "webhook rejected notification");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "webhook unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn crash(&self, server_name: &str) -> bool {
        self.post(json!({
            "event": "crash",
            "server": server_name,
            "message": format!("{} stopped unexpectedly", server_name),
        }))
        .await
    }

    async fn error(&self, report: &ErrorReport) -> bool {
        self.post(json!({
            "event": "error",
            "report": report,
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_webhook_reports_not_sent() {
        let notifier = WebhookNotifier::new(
            "http://127.0.0.1:1/hook".to_string(),
            Duration::from_millis(200),
        );
        assert!(!notifier.crash("Minecraft").await);
        assert!(!notifier.error(&ErrorReport::default()).await);
    }
}
