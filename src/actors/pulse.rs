//! PulseActor - drives the periodic health cycle
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → run_cycle → probes, module health, snapshots, alerts → overview broadcast
//!     ↑
//!     └─── Commands (RunNow, UpdateInterval, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, instrument, warn};

use super::messages::PulseCommand;
use crate::service::{PulseOverview, PulseService};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

pub struct PulseActor {
    service: Arc<PulseService>,
    command_rx: mpsc::Receiver<PulseCommand>,
    interval_duration: Duration,
}

impl PulseActor {
    pub fn new(
        service: Arc<PulseService>,
        command_rx: mpsc::Receiver<PulseCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            service,
            command_rx,
            interval_duration,
        }
    }

    fn ticker(&self) -> tokio::time::Interval {
        let mut ticker = interval(self.interval_duration);
        // a slow cycle must not cause a burst of catch-up cycles
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Run until a Shutdown command arrives or every handle is dropped
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting pulse actor");

        let mut ticker = self.ticker();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.service.run_cycle().await;
                }

                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        warn!("command channel closed, shutting down");
                        break;
                    };
                    match cmd {
                        PulseCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let overview = self.service.run_cycle().await;
                            let _ = respond_to.send(overview);
                        }

                        PulseCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = self.ticker();
                        }

                        PulseCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("pulse actor stopped");
    }
}

/// Handle for controlling a PulseActor
#[derive(Clone)]
pub struct PulseHandle {
    sender: mpsc::Sender<PulseCommand>,
}

impl PulseHandle {
    /// Create the actor, spawn it as a tokio task and return its handle
    pub fn spawn(service: Arc<PulseService>, interval_duration: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = PulseActor::new(service, cmd_rx, interval_duration);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a cycle now and wait for its overview
    pub async fn run_now(&self) -> Result<PulseOverview> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PulseCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(PulseCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PulseCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
