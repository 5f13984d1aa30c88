//! Message types for actor communication

use tokio::sync::oneshot;

use crate::service::PulseOverview;

/// Commands that can be sent to the PulseActor
#[derive(Debug)]
pub enum PulseCommand {
    /// Run a cycle immediately, bypassing the interval timer
    RunNow {
        respond_to: oneshot::Sender<PulseOverview>,
    },

    /// Change the cycle interval. Takes effect from the next tick.
    UpdateInterval { interval_secs: u64 },

    /// Gracefully shut down the scheduler
    ///
    /// An in-flight cycle is finished before the actor exits.
    Shutdown,
}
