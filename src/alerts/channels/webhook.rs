use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument};

use super::{AlertNotification, ChannelResult, NotificationChannel};
use crate::alerts::model::{AlertStatus, ChannelKind};

/// Generic JSON POST to an operator-provided URL
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    fn format_message(notification: &AlertNotification) -> String {
        match notification.status {
            AlertStatus::Triggered => format!(
                "🔴 **Alert**: `{}` ({})",
                notification.alert_name, notification.condition
            ),
            AlertStatus::Resolved => {
                format!("✅ **Resolved**: `{}`", notification.alert_name)
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    #[instrument(skip_all, fields(alert = %notification.alert_name))]
    async fn send(&self, notification: &AlertNotification) -> ChannelResult {
        let payload = json!({
            "message": Self::format_message(notification),
            "alertId": notification.alert_id,
            "alertName": notification.alert_name,
            "eventId": notification.event_id,
            "status": notification.status,
            "condition": notification.condition,
            "details": notification.details,
            "timestamp": notification.occurred_at.to_rfc3339()
        });

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("successfully sent webhook alert");
                    ChannelResult::ok(ChannelKind::Webhook)
                } else {
                    error!("webhook alert failed with status: {}", response.status());
                    ChannelResult::failed(
                        ChannelKind::Webhook,
                        format!("webhook returned HTTP {}", response.status().as_u16()),
                    )
                }
            }
            Err(e) => {
                error!("failed to send webhook alert: {}", e);
                ChannelResult::failed(ChannelKind::Webhook, e.to_string())
            }
        }
    }
}
