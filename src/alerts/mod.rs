//! Operator-defined alerts
//!
//! - `model`: configuration, condition and event types
//! - `validation`: field checks for configurations
//! - `repository` / `sqlite`: persistence of configurations and events
//! - `cooldown`: per-alert suppression tokens
//! - `channels`: notification delivery
//! - `engine`: evaluation, manual trigger and resolve

pub mod channels;
pub mod cooldown;
pub mod engine;
pub mod model;
pub mod repository;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;
pub mod validation;

pub use channels::{
    AlertNotification, ChannelDispatcher, ChannelResult, NotificationChannel, UiChannel,
};
pub use cooldown::CooldownTracker;
pub use engine::{AlertEngine, AlertError, AlertResult, EvaluationContext, TriggeredAlert};
pub use model::{
    AlertCondition, AlertConfig, AlertConfigInput, AlertEvent, AlertStatus, ChannelKind,
    ComparisonOperator,
};
pub use repository::{AlertRepository, MemoryAlertRepository};
#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteAlertRepository;
pub use validation::{FieldError, ValidationErrors};
