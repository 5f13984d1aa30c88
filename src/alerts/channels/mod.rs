//! Notification channels
//!
//! Every channel is invoked independently under its own timeout. A failing
//! or slow channel never prevents delivery through the others; its failure is
//! captured in a [`ChannelResult`].

pub mod discord;
pub mod email;
pub mod ui;
pub mod webhook;
pub mod whatsapp;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::model::{AlertEvent, AlertStatus, ChannelKind};

pub use discord::DiscordChannel;
pub use email::{EmailChannel, SmtpSettings};
pub use ui::UiChannel;
pub use webhook::WebhookChannel;
pub use whatsapp::WhatsappChannel;

pub const CHANNEL_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of delivering one notification through one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelResult {
    pub channel: ChannelKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChannelResult {
    pub fn ok(channel: ChannelKind) -> Self {
        Self {
            channel,
            success: true,
            error: None,
        }
    }

    pub fn failed(channel: ChannelKind, error: impl Into<String>) -> Self {
        Self {
            channel,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// What channels render for a triggered or resolved event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub alert_id: Uuid,
    pub alert_name: String,
    pub event_id: Uuid,
    pub status: AlertStatus,
    pub condition: String,
    pub details: Option<Value>,
    pub recipients: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AlertNotification {
    pub fn from_event(event: &AlertEvent, recipients: &[String]) -> Self {
        Self {
            alert_id: event.alert_id,
            alert_name: event.alert_name.clone(),
            event_id: event.id,
            status: event.status,
            condition: event.condition.describe(),
            details: event.details.clone(),
            recipients: recipients.to_vec(),
            occurred_at: event.resolved_at.unwrap_or(event.triggered_at),
        }
    }

    pub fn subject(&self) -> String {
        match self.status {
            AlertStatus::Triggered => format!("[ALERT] {}", self.alert_name),
            AlertStatus::Resolved => format!("[RESOLVED] {}", self.alert_name),
        }
    }

    /// Plain-text body shared by the text-based channels
    pub fn body(&self) -> String {
        let mut body = format!(
            "{}\nCondition: {}\nAt: {}",
            self.subject(),
            self.condition,
            self.occurred_at.to_rfc3339()
        );
        if let Some(details) = &self.details {
            body.push_str(&format!("\nDetails: {details}"));
        }
        body
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver the notification. Failures are reported in the result.
    async fn send(&self, notification: &AlertNotification) -> ChannelResult;
}

/// Fold per-recipient outcomes into one channel result.
///
/// The channel succeeds when at least one recipient succeeded; errors of the
/// failing recipients are joined with `"; "`.
pub fn aggregate_recipients(
    channel: ChannelKind,
    outcomes: Vec<(String, Result<(), String>)>,
) -> ChannelResult {
    if outcomes.is_empty() {
        return ChannelResult::failed(channel, "no recipients for channel");
    }

    let mut succeeded = false;
    let mut errors = Vec::new();
    for (recipient, outcome) in outcomes {
        match outcome {
            Ok(()) => succeeded = true,
            Err(e) => errors.push(format!("{recipient}: {e}")),
        }
    }

    ChannelResult {
        channel,
        success: succeeded,
        error: (!errors.is_empty()).then(|| errors.join("; ")),
    }
}

/// Routes notifications to the configured channel implementations
#[derive(Clone)]
pub struct ChannelDispatcher {
    channels: HashMap<ChannelKind, Arc<dyn NotificationChannel>>,
    timeout: Duration,
}

impl Default for ChannelDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            timeout: CHANNEL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        self.channels.insert(channel.kind(), channel);
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.register(channel);
        self
    }

    pub fn is_configured(&self, kind: ChannelKind) -> bool {
        self.channels.contains_key(&kind)
    }

    /// Deliver through every requested channel concurrently.
    ///
    /// Results come back in the order of `kinds`.
    pub async fn dispatch(
        &self,
        kinds: &[ChannelKind],
        notification: &AlertNotification,
    ) -> Vec<ChannelResult> {
        let sends = kinds.iter().map(|kind| async move {
            let Some(channel) = self.channels.get(kind) else {
                return ChannelResult::failed(*kind, format!("{kind} channel not configured"));
            };

            match tokio::time::timeout(self.timeout, channel.send(notification)).await {
                Ok(result) => result,
                Err(_) => ChannelResult::failed(
                    *kind,
                    format!("timed out after {}ms", self.timeout.as_millis()),
                ),
            }
        });

        let results = join_all(sends).await;
        for result in &results {
            match &result.error {
                Some(e) if !result.success => {
                    warn!(channel = %result.channel, alert = %notification.alert_name, "delivery failed: {e}")
                }
                _ => debug!(channel = %result.channel, alert = %notification.alert_name, "delivered"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::alerts::model::{AlertCondition, AlertConfig, AlertConfigInput};

    struct Slow;

    #[async_trait]
    impl NotificationChannel for Slow {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Webhook
        }

        async fn send(&self, _: &AlertNotification) -> ChannelResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            ChannelResult::ok(ChannelKind::Webhook)
        }
    }

    fn notification() -> AlertNotification {
        let config = AlertConfig::from_input(AlertConfigInput {
            name: "cache down".to_string(),
            condition: AlertCondition::ProbeUnhealthy {
                target: "cache".to_string(),
            },
            channels: vec![ChannelKind::Ui],
            recipients: vec![],
            cooldown_seconds: 0,
            enabled: true,
        });
        AlertNotification::from_event(&AlertEvent::triggered(&config, None), &[])
    }

    #[test]
    fn test_aggregate_recipients() {
        let partial = aggregate_recipients(
            ChannelKind::Email,
            vec![
                ("a@example.com".to_string(), Ok(())),
                ("b@example.com".to_string(), Err("rejected".to_string())),
            ],
        );
        assert!(partial.success);
        assert_eq!(partial.error.as_deref(), Some("b@example.com: rejected"));

        let failed = aggregate_recipients(
            ChannelKind::Email,
            vec![
                ("a".to_string(), Err("x".to_string())),
                ("b".to_string(), Err("y".to_string())),
            ],
        );
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("a: x; b: y"));

        assert!(!aggregate_recipients(ChannelKind::Email, vec![]).success);
    }

    #[tokio::test]
    async fn test_dispatch_isolates_channels() {
        let (ui, _rx) = UiChannel::new(8);
        let dispatcher = ChannelDispatcher::new()
            .with_timeout(Duration::from_millis(50))
            .with_channel(Arc::new(ui))
            .with_channel(Arc::new(Slow));

        let results = dispatcher
            .dispatch(
                &[ChannelKind::Ui, ChannelKind::Webhook, ChannelKind::Email],
                &notification(),
            )
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], ChannelResult::ok(ChannelKind::Ui));
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(
            results[2].error.as_deref(),
            Some("email channel not configured")
        );
    }

    #[test]
    fn test_notification_body() {
        let notification = notification();
        assert_eq!(notification.subject(), "[ALERT] cache down");
        assert!(notification.body().contains("probe cache is unhealthy"));
    }
}
