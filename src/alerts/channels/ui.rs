use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use super::{AlertNotification, ChannelResult, NotificationChannel};
use crate::alerts::model::ChannelKind;

/// Pushes notifications to connected dashboards.
///
/// Having no subscriber at the moment is not a failure; the event is still
/// visible through the event history.
#[derive(Debug, Clone)]
pub struct UiChannel {
    sender: broadcast::Sender<AlertNotification>,
}

impl UiChannel {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<AlertNotification>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertNotification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationChannel for UiChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Ui
    }

    async fn send(&self, notification: &AlertNotification) -> ChannelResult {
        let receivers = self.sender.send(notification.clone()).unwrap_or(0);
        trace!("ui notification delivered to {receivers} subscribers");
        ChannelResult::ok(ChannelKind::Ui)
    }
}
