//! Stored record definitions
//!
//! ## Snapshots
//!
//! A [`MetricsSnapshot`] captures the health of every module at one instant.
//! Each snapshot is tagged with a [`SnapshotPeriod`] class, and each class has
//! its own retention horizon, so a long-range dashboard reads the sparse `24h`
//! series while a live view reads the dense `1m` series.
//!
//! ## Points
//!
//! A [`TimeSeriesPoint`] is a bare `(timestamp, value)` sample for one named
//! metric, kept in a bounded per-metric window.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ModuleHealth;

/// Retention period class of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SnapshotPeriod {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
}

impl SnapshotPeriod {
    pub const ALL: [SnapshotPeriod; 4] = [
        SnapshotPeriod::OneMinute,
        SnapshotPeriod::FiveMinutes,
        SnapshotPeriod::OneHour,
        SnapshotPeriod::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotPeriod::OneMinute => "1m",
            SnapshotPeriod::FiveMinutes => "5m",
            SnapshotPeriod::OneHour => "1h",
            SnapshotPeriod::OneDay => "24h",
        }
    }

    /// Spacing between two snapshots of this class
    pub fn interval(&self) -> Duration {
        match self {
            SnapshotPeriod::OneMinute => Duration::from_secs(60),
            SnapshotPeriod::FiveMinutes => Duration::from_secs(5 * 60),
            SnapshotPeriod::OneHour => Duration::from_secs(60 * 60),
            SnapshotPeriod::OneDay => Duration::from_secs(24 * 60 * 60),
        }
    }

    /// How long snapshots of this class are kept
    pub fn retention(&self) -> Duration {
        match self {
            SnapshotPeriod::OneMinute => Duration::from_secs(60 * 60),
            SnapshotPeriod::FiveMinutes => Duration::from_secs(6 * 60 * 60),
            SnapshotPeriod::OneHour => Duration::from_secs(7 * 24 * 60 * 60),
            SnapshotPeriod::OneDay => Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl fmt::Display for SnapshotPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(SnapshotPeriod::OneMinute),
            "5m" => Ok(SnapshotPeriod::FiveMinutes),
            "1h" => Ok(SnapshotPeriod::OneHour),
            "24h" => Ok(SnapshotPeriod::OneDay),
            other => Err(format!("unknown snapshot period '{other}'")),
        }
    }
}

/// Health of every module at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub period: SnapshotPeriod,
    pub modules: BTreeMap<String, ModuleHealth>,
}

/// Scalar sample of a named metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Accumulated occurrences of one error type within a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub error_type: String,
    pub count: u64,
    pub last_occurred: DateTime<Utc>,
    pub last_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_round_trips_through_str() {
        for period in SnapshotPeriod::ALL {
            assert_eq!(period.as_str().parse::<SnapshotPeriod>(), Ok(period));
        }
        assert!("2m".parse::<SnapshotPeriod>().is_err());
    }

    #[test]
    fn test_period_serializes_as_short_name() {
        let json = serde_json::to_string(&SnapshotPeriod::OneDay).unwrap();
        assert_eq!(json, "\"24h\"");
    }

    #[test]
    fn test_retention_horizons() {
        assert_eq!(SnapshotPeriod::OneMinute.retention(), Duration::from_secs(3600));
        assert_eq!(SnapshotPeriod::FiveMinutes.retention(), Duration::from_secs(6 * 3600));
        assert_eq!(SnapshotPeriod::OneHour.retention(), Duration::from_secs(7 * 86400));
        assert_eq!(SnapshotPeriod::OneDay.retention(), Duration::from_secs(30 * 86400));
    }
}
