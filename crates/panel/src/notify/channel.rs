//! Chat-channel notifier. Posts rich embeds to the chat API using the bot
//! token and channel ids kept in bot settings, so operators can rewire it
//! at runtime without a restart.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::{ErrorReport, Notifier};
use crate::store::Store;

const CRASH_COLOR: u32 = 0xed4245;
const ERROR_COLOR: u32 = 0xfaa61a;

pub struct ChannelNotifier {
    http: reqwest::Client,
    store: Arc<Store>,
    api_base: String,
}

impl ChannelNotifier {
    pub fn new(store: Arc<Store>, api_base: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            store,
            api_base,
        }
    }

    /// Token and target channel, or `None` when the sink is unconfigured.
    fn credentials(&self, channel_key: &str) -> Option<(String, String)> {
        let token = self.store.bot_setting("bot_token").ok()?;
        let channel = self.store.bot_setting(channel_key).ok()?;
        if token.is_empty() || channel.is_empty() {
            return None;
        }
        Some((token, channel))
    }

    async fn post_embed(&self, channel_key: &str, embed: serde_json::Value) -> bool {
        let Some((token, channel)) = self.credentials(channel_key) else {
            return false;
        };
        let url = format!("{}/channels/{}/messages", self.api_base, channel);
        let result = self
            .http
            .post(&url)
            .header("Authorization", format!("Bot {token}"))
            .json(&json!({ "embeds": [embed] }))
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "chat API rejected notification");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat API unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn crash(&self, server_name: &str) -> bool {
        let embed = json!({
            "title": "Server crashed",
            "description": format!("**{}** stopped unexpectedly.", server_name),
            "color": CRASH_COLOR,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.post_embed("crashes_channel_id", embed).await
    }

    async fn error(&self, report: &ErrorReport) -> bool {
        let mut fields = Vec::new();
        if let Some(component) = &report.component {
            fields.push(json!({ "name": "Component", "value": component, "inline": true }));
        }
        if let Some(url) = &report.url {
            fields.push(json!({ "name": "URL", "value": url, "inline": true }));
        }
        if let Some(stack) = &report.stack {
            let trimmed: String = stack.chars().take(1000).collect();
            fields.push(json!({ "name": "Stack", "value": format!("```\n{}\n```", trimmed) }));
        }
        let embed = json!({
            "title": "Panel error",
            "description": report.message,
            "color": ERROR_COLOR,
            "fields": fields,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.post_embed("errors_channel_id", embed).await
    }
}
