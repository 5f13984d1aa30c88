//! Alert configuration and event types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Comparison used by metric threshold conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl ComparisonOperator {
    pub fn compare(&self, observed: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::Gt => observed > threshold,
            ComparisonOperator::Gte => observed >= threshold,
            ComparisonOperator::Lt => observed < threshold,
            ComparisonOperator::Lte => observed <= threshold,
            ComparisonOperator::Eq => observed == threshold,
            ComparisonOperator::Ne => observed != threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::Eq => "==",
            ComparisonOperator::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertCondition {
    /// The named probe's last result was unhealthy
    ProbeUnhealthy { target: String },
    /// The named probe was unhealthy and reported why
    ProbeDegraded { target: String },
    /// The first series of the named metric compares true against `value`
    MetricThreshold {
        target: String,
        operator: ComparisonOperator,
        value: f64,
    },
}

impl AlertCondition {
    pub fn target(&self) -> &str {
        match self {
            AlertCondition::ProbeUnhealthy { target }
            | AlertCondition::ProbeDegraded { target }
            | AlertCondition::MetricThreshold { target, .. } => target,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AlertCondition::ProbeUnhealthy { target } => format!("probe {target} is unhealthy"),
            AlertCondition::ProbeDegraded { target } => format!("probe {target} is degraded"),
            AlertCondition::MetricThreshold {
                target,
                operator,
                value,
            } => format!("{target} {} {value}", operator.symbol()),
        }
    }
}

/// Notification channel an alert can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Ui,
    Email,
    Whatsapp,
    Webhook,
    Discord,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Ui => "ui",
            ChannelKind::Email => "email",
            ChannelKind::Whatsapp => "whatsapp",
            ChannelKind::Webhook => "webhook",
            ChannelKind::Discord => "discord",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
    pub id: Uuid,
    pub name: String,
    pub condition: AlertCondition,
    pub channels: Vec<ChannelKind>,
    pub recipients: Vec<String>,
    pub cooldown_seconds: u64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_cooldown_seconds() -> u64 {
    300
}

fn default_enabled() -> bool {
    true
}

/// Operator-supplied fields of an alert configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfigInput {
    pub name: String,
    pub condition: AlertCondition,
    pub channels: Vec<ChannelKind>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AlertConfig {
    pub fn from_input(input: AlertConfigInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            condition: input.condition,
            channels: dedup_channels(input.channels),
            recipients: input.recipients,
            cooldown_seconds: input.cooldown_seconds,
            enabled: input.enabled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the operator-supplied fields, keeping identity and creation time
    pub fn apply(&mut self, input: AlertConfigInput) {
        self.name = input.name.trim().to_string();
        self.condition = input.condition;
        self.channels = dedup_channels(input.channels);
        self.recipients = input.recipients;
        self.cooldown_seconds = input.cooldown_seconds;
        self.enabled = input.enabled;
        self.updated_at = Utc::now();
    }
}

fn dedup_channels(channels: Vec<ChannelKind>) -> Vec<ChannelKind> {
    let mut unique = Vec::with_capacity(channels.len());
    for channel in channels {
        if !unique.contains(&channel) {
            unique.push(channel);
        }
    }
    unique
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Triggered,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Triggered => "triggered",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// One trigger or resolve transition of an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub alert_name: String,
    pub condition: AlertCondition,
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub status: AlertStatus,
    pub channels: Vec<ChannelKind>,
    pub details: Option<Value>,
    /// For resolved events, the triggered event being resolved
    pub trigger_event_id: Option<Uuid>,
}

impl AlertEvent {
    pub fn triggered(config: &AlertConfig, details: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_id: config.id,
            alert_name: config.name.clone(),
            condition: config.condition.clone(),
            triggered_at: Utc::now(),
            resolved_at: None,
            status: AlertStatus::Triggered,
            channels: config.channels.clone(),
            details,
            trigger_event_id: None,
        }
    }

    /// Resolution of this triggered event, routed to the same channels
    pub fn resolution(&self) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            alert_id: self.alert_id,
            alert_name: self.alert_name.clone(),
            condition: self.condition.clone(),
            triggered_at: self.triggered_at,
            resolved_at: Some(now.max(self.triggered_at)),
            status: AlertStatus::Resolved,
            channels: self.channels.clone(),
            details: self.details.clone(),
            trigger_event_id: Some(self.id),
        }
    }
}
