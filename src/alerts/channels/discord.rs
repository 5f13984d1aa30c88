use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use super::{AlertNotification, ChannelResult, NotificationChannel};
use crate::alerts::model::{AlertStatus, ChannelKind};

const RED: u32 = 15158332;
const GREEN: u32 = 3066993;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Posts embeds to a Discord webhook
#[derive(Debug, Clone)]
pub struct DiscordChannel {
    client: Client,
    url: String,
    /// Mentioned in the message content when set
    user_id: Option<String>,
}

impl DiscordChannel {
    pub fn new(client: Client, url: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            user_id,
        }
    }

    pub fn build_embed(notification: &AlertNotification) -> Embed {
        let (title, color) = match notification.status {
            AlertStatus::Triggered => (format!("🔴 {}", notification.alert_name), RED),
            AlertStatus::Resolved => (format!("✅ {} resolved", notification.alert_name), GREEN),
        };

        let mut fields = vec![EmbedField {
            name: "Condition".to_string(),
            value: notification.condition.clone(),
            inline: false,
        }];
        if let Some(details) = &notification.details {
            fields.push(EmbedField {
                name: "Details".to_string(),
                value: format!("```json\n{details}\n```"),
                inline: false,
            });
        }

        Embed {
            title: Some(title),
            description: None,
            color: Some(color),
            fields,
            footer: Some(EmbedFooter {
                text: format!("Alert {}", notification.alert_id),
            }),
            timestamp: Some(notification.occurred_at.to_rfc3339()),
        }
    }

    pub fn build_message(&self, notification: &AlertNotification) -> Message {
        let mut builder = MessageBuilder::new().add_embed(Self::build_embed(notification));
        if let Some(user_id) = &self.user_id {
            builder = builder.content(format!("{} <@{user_id}>", notification.subject()));
        }
        builder.build()
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    #[instrument(skip_all, fields(alert = %notification.alert_name))]
    async fn send(&self, notification: &AlertNotification) -> ChannelResult {
        let message = self.build_message(notification);
        match self.client.post(&self.url).json(&message).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    info!("successfully sent Discord message");
                    return ChannelResult::ok(ChannelKind::Discord);
                }
                error!("Discord message failed with status: {status}");
                if let Ok(error_text) = response.text().await {
                    error!("Discord API error response: {error_text}");
                }
                ChannelResult::failed(
                    ChannelKind::Discord,
                    format!("discord returned HTTP {}", status.as_u16()),
                )
            }
            Err(e) => {
                error!("failed to send Discord message: {e}");
                ChannelResult::failed(ChannelKind::Discord, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn notification(status: AlertStatus) -> AlertNotification {
        AlertNotification {
            alert_id: Uuid::new_v4(),
            alert_name: "db slow".to_string(),
            event_id: Uuid::new_v4(),
            status,
            condition: "db.query.latency >= 500".to_string(),
            details: Some(json!({ "observed": 612.0 })),
            recipients: vec![],
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_embed_colors_follow_status() {
        let triggered = DiscordChannel::build_embed(&notification(AlertStatus::Triggered));
        assert_eq!(triggered.color, Some(RED));
        assert_eq!(triggered.fields.len(), 2);

        let resolved = DiscordChannel::build_embed(&notification(AlertStatus::Resolved));
        assert_eq!(resolved.color, Some(GREEN));
    }

    #[test]
    fn test_mention_only_with_user_id() {
        let plain = DiscordChannel::new(Client::new(), "http://localhost", None);
        assert!(plain.build_message(&notification(AlertStatus::Triggered)).content.is_none());

        let mention = DiscordChannel::new(Client::new(), "http://localhost", Some("42".into()));
        let content = mention
            .build_message(&notification(AlertStatus::Triggered))
            .content
            .unwrap();
        assert_eq!(content, "[ALERT] db slow <@42>");
    }
}
