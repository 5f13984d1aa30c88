//! Validation of operator-supplied alert configurations

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::model::{AlertCondition, AlertConfigInput, ChannelKind};

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_COOLDOWN_SECONDS: u64 = 7 * 24 * 60 * 60;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

static E164: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{6,14}$").expect("E.164 pattern is valid"));

pub fn is_email(recipient: &str) -> bool {
    EMAIL.is_match(recipient)
}

pub fn is_e164(recipient: &str) -> bool {
    E164.is_match(recipient)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every problem found in one configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid alert configuration: ")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Default)]
struct Collector(Vec<FieldError>);

impl Collector {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }
}

pub fn validate(input: &AlertConfigInput) -> Result<(), ValidationErrors> {
    let mut errors = Collector::default();

    let name = input.name.trim();
    if name.is_empty() {
        errors.push("name", "must not be empty");
    } else if name.chars().count() > MAX_NAME_LEN {
        errors.push("name", format!("must be at most {MAX_NAME_LEN} characters"));
    }

    if input.condition.target().trim().is_empty() {
        errors.push("condition.target", "must not be empty");
    }
    if let AlertCondition::MetricThreshold { value, .. } = &input.condition
        && !value.is_finite()
    {
        errors.push("condition.value", "must be a finite number");
    }

    if input.channels.is_empty() {
        errors.push("channels", "at least one channel is required");
    }

    if input.cooldown_seconds > MAX_COOLDOWN_SECONDS {
        errors.push(
            "cooldownSeconds",
            format!("must be at most {MAX_COOLDOWN_SECONDS} seconds"),
        );
    }

    for (i, recipient) in input.recipients.iter().enumerate() {
        if !is_email(recipient) && !is_e164(recipient) {
            errors.push(
                &format!("recipients[{i}]"),
                "must be an email address or an E.164 phone number",
            );
        }
    }

    if input.channels.contains(&ChannelKind::Email) && !input.recipients.iter().any(|r| is_email(r))
    {
        errors.push("recipients", "email channel requires an email recipient");
    }
    if input.channels.contains(&ChannelKind::Whatsapp)
        && !input.recipients.iter().any(|r| is_e164(r))
    {
        errors.push(
            "recipients",
            "whatsapp channel requires an E.164 phone number",
        );
    }

    if errors.0.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors.0))
    }
}
