//! API shared state

use std::sync::Arc;
use std::time::Duration;

use crate::alerts::AlertEngine;
use crate::service::PulseService;

/// Interval between SSE `update` events
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<PulseService>,
    pub update_interval: Duration,
}

impl ApiState {
    pub fn new(service: Arc<PulseService>) -> Self {
        Self {
            service,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }

    pub fn with_update_interval(mut self, update_interval: Duration) -> Self {
        self.update_interval = update_interval;
        self
    }

    pub fn engine(&self) -> &Arc<AlertEngine> {
        self.service.engine()
    }
}
