use async_trait::async_trait;
use lettre::message::{Mailbox, Message, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::Deserialize;
use tracing::{error, info, instrument};

use super::{AlertNotification, ChannelResult, NotificationChannel, aggregate_recipients};
use crate::alerts::model::ChannelKind;
use crate::alerts::validation::is_email;

fn default_smtp_port() -> u16 {
    587
}

fn default_from() -> String {
    "Pulse <pulse@localhost>".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
}

/// Sends one mail per email recipient of the alert
pub struct EmailChannel {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailChannel {
    pub fn new(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid from address '{}': {e}", settings.from))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
            .port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    fn build_message(&self, to: &str, notification: &AlertNotification) -> Result<Message, String> {
        let to: Mailbox = to.parse().map_err(|e| format!("invalid address: {e}"))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body())
            .map_err(|e| format!("failed to build email: {e}"))
    }

    async fn send_to(&self, to: &str, notification: &AlertNotification) -> Result<(), String> {
        let message = self.build_message(to, notification)?;
        self.mailer
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| format!("SMTP send failed: {e}"))
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    #[instrument(skip_all, fields(alert = %notification.alert_name))]
    async fn send(&self, notification: &AlertNotification) -> ChannelResult {
        let mut outcomes = Vec::new();
        for recipient in notification.recipients.iter().filter(|r| is_email(r)) {
            let outcome = self.send_to(recipient, notification).await;
            match &outcome {
                Ok(()) => info!("sent alert email to {recipient}"),
                Err(e) => error!("failed to send alert email to {recipient}: {e}"),
            }
            outcomes.push((recipient.clone(), outcome));
        }
        aggregate_recipients(ChannelKind::Email, outcomes)
    }
}
