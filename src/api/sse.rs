//! Server-Sent Events stream for the dashboard
//!
//! A stream starts with one `snapshot` event carrying the current overview.
//! After that it emits an `alert` event for each triggered or resolved
//! transition and an `update` event every update interval. Dropping the
//! stream drops its timer and its alert subscription.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::StreamExt;
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use crate::alerts::AlertEvent;
use crate::api::state::ApiState;
use crate::service::PulseService;

struct StreamState {
    service: Arc<PulseService>,
    alerts: broadcast::Receiver<AlertEvent>,
    ticker: Interval,
    sent_snapshot: bool,
}

fn event(name: &str, payload: &impl Serialize) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|e| {
            warn!("failed to encode {name} event: {e}");
            Event::default().event("error").data(e.to_string())
        })
}

/// Events of one subscriber, in emission order
pub fn pulse_events(
    service: Arc<PulseService>,
    update_interval: Duration,
) -> impl Stream<Item = Event> {
    let mut ticker = interval_at(Instant::now() + update_interval, update_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let state = StreamState {
        alerts: service.engine().subscribe(),
        service,
        ticker,
        sent_snapshot: false,
    };

    stream::unfold(state, |mut state| async move {
        if !state.sent_snapshot {
            state.sent_snapshot = true;
            let overview = state.service.get_pulse_overview().await;
            return Some((event("snapshot", &overview), state));
        }

        loop {
            tokio::select! {
                received = state.alerts.recv() => match received {
                    Ok(alert) => return Some((event("alert", &alert), state)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("sse subscriber lagged, skipped {skipped} alert events");
                    }
                    Err(RecvError::Closed) => {
                        debug!("alert channel closed, ending stream");
                        return None;
                    }
                },

                _ = state.ticker.tick() => {
                    let overview = state.service.get_pulse_overview().await;
                    return Some((event("update", &overview), state));
                }
            }
        }
    })
}

/// GET /pulse/events
pub async fn events_handler(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("sse client connected");
    let events = pulse_events(state.service.clone(), state.update_interval);
    Sse::new(events.map(Ok::<_, Infallible>)).keep_alive(KeepAlive::default())
}
