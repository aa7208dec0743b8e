//! Crash and error notification sinks.
//!
//! One abstract sink, two concrete variants: `ChannelNotifier` posts a rich
//! message to a chat channel, `WebhookNotifier` posts plain JSON to a
//! generic webhook. The composite tries the channel first and falls back.
//! Every call is fire-and-forget with a bounded timeout; a failed
//! notification never rolls back the state change that triggered it.

pub mod channel;
pub mod webhook;

use async_trait::async_trait;

pub use channel::ChannelNotifier;
pub use webhook::WebhookNotifier;

/// A frontend- or panel-reported error, forwarded verbatim.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ErrorReport {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// A managed game container died without an intentional stop.
    /// Returns whether any sink accepted the event.
    async fn crash(&self, server_name: &str) -> bool;

    /// An error report from the dashboard or the panel itself.
    async fn error(&self, report: &ErrorReport) -> bool;
}

/// Channel first, webhook as fallback.
pub struct CompositeNotifier {
    channel: ChannelNotifier,
    webhook: Option<WebhookNotifier>,
}

impl CompositeNotifier {
    pub fn new(channel: ChannelNotifier, webhook: Option<WebhookNotifier>) -> Self {
        Self { channel, webhook }
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn crash(&self, server_name: &str) -> bool {
        if self.channel.crash(server_name).await {
            return true;
        }
        match &self.webhook {
            Some(webhook) => webhook.crash(server_name).await,
            None => false,
        }
    }

    async fn error(&self, report: &ErrorReport) -> bool {
        if self.channel.error(report).await {
            return true;
        }
        match &self.webhook {
            Some(webhook) => webhook.error(report).await,
            None => false,
        }
    }
}
