use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument};

use super::{AlertNotification, ChannelResult, NotificationChannel, aggregate_recipients};
use crate::alerts::model::ChannelKind;
use crate::alerts::validation::is_e164;

/// Sends alert text to each E.164 recipient through the messaging gateway
#[derive(Debug, Clone)]
pub struct WhatsappChannel {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl WhatsappChannel {
    pub fn new(client: Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn send_to(&self, number: &str, text: &str) -> Result<(), String> {
        let mut request = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&json!({ "to": number, "text": text }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("gateway returned HTTP {}", response.status().as_u16()))
        }
    }
}

#[async_trait]
impl NotificationChannel for WhatsappChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    #[instrument(skip_all, fields(alert = %notification.alert_name))]
    async fn send(&self, notification: &AlertNotification) -> ChannelResult {
        let text = notification.body();
        let mut outcomes = Vec::new();
        for number in notification.recipients.iter().filter(|r| is_e164(r)) {
            let outcome = self.send_to(number, &text).await;
            match &outcome {
                Ok(()) => info!("sent whatsapp alert to {number}"),
                Err(e) => error!("failed to send whatsapp alert to {number}: {e}"),
            }
            outcomes.push((number.clone(), outcome));
        }
        aggregate_recipients(ChannelKind::Whatsapp, outcomes)
    }
}
