//! Per-alert cooldown tokens
//!
//! A token is an `alert_id -> expires_at` entry. Its presence suppresses new
//! triggers of that alert. Expired entries are removed lazily on lookup.
//! [`CooldownTracker::clear`] drops a token whose trigger was never recorded.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct CooldownTracker {
    expiries: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on_cooldown(&self, alert_id: Uuid) -> bool {
        self.is_on_cooldown_at(alert_id, Utc::now())
    }

    pub fn is_on_cooldown_at(&self, alert_id: Uuid, now: DateTime<Utc>) -> bool {
        Self::live(&mut self.lock(), alert_id, now)
    }

    // writes are single inserts or removes, a poisoned map is still consistent
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, DateTime<Utc>>> {
        self.expiries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live(expiries: &mut HashMap<Uuid, DateTime<Utc>>, alert_id: Uuid, now: DateTime<Utc>) -> bool {
        match expiries.get(&alert_id) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                expiries.remove(&alert_id);
                false
            }
            None => false,
        }
    }

    /// Start a cooldown unless one is already running.
    ///
    /// Returns `false` when the alert is on cooldown. The check and the insert
    /// happen under one lock, so concurrent evaluations trigger at most once.
    pub fn try_start_at(&self, alert_id: Uuid, seconds: u64, now: DateTime<Utc>) -> bool {
        let mut expiries = self.lock();
        if Self::live(&mut expiries, alert_id, now) {
            return false;
        }
        if seconds > 0 {
            expiries.insert(alert_id, now + Duration::seconds(seconds as i64));
        }
        true
    }

    pub fn try_start(&self, alert_id: Uuid, seconds: u64) -> bool {
        self.try_start_at(alert_id, seconds, Utc::now())
    }

    /// Drop the alert's token, if any
    pub fn clear(&self, alert_id: Uuid) {
        self.lock().remove(&alert_id);
    }
}
