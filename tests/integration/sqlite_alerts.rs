//! Alert configurations and history survive a restart

use std::sync::Arc;

use pulse::alerts::{AlertEngine, AlertStatus, ChannelDispatcher, SqliteAlertRepository};
use tempfile::tempdir;

use crate::helpers::latency_alert;

async fn engine_at(path: &std::path::Path) -> AlertEngine {
    let repository = SqliteAlertRepository::new(path).await.unwrap();
    AlertEngine::new(Arc::new(repository), ChannelDispatcher::new())
}

#[tokio::test]
async fn test_alerts_persist_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pulse.db");

    let (alert_id, event_id) = {
        let engine = engine_at(&path).await;
        let alert = engine
            .create_alert(latency_alert("slow queries", 500.0))
            .await
            .unwrap();
        let triggered = engine.trigger_manual_alert(alert.id, None).await.unwrap();
        (alert.id, triggered.event.id)
    };

    let engine = engine_at(&path).await;
    let alert = engine.get_alert(alert_id).await.unwrap();
    assert_eq!(alert.name, "slow queries");

    let active = engine.active_alerts().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, event_id);

    // cooldowns are process-local and start empty after a restart
    assert!(!engine.is_on_cooldown(alert_id));

    let resolved = engine.resolve_alert(alert_id, None).await.unwrap().unwrap();
    assert_eq!(resolved.event.status, AlertStatus::Resolved);
    // the ui channel is not registered here
    assert!(!resolved.deliveries[0].success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_resolves_append_one_event() {
    let dir = tempdir().unwrap();
    let engine = Arc::new(engine_at(&dir.path().join("pulse.db")).await);
    let alert = engine
        .create_alert(latency_alert("slow queries", 500.0))
        .await
        .unwrap();
    engine.trigger_manual_alert(alert.id, None).await.unwrap();

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.resolve_alert(alert.id, None).await }
    });
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.resolve_alert(alert.id, None).await }
    });
    let (first, second) = tokio::join!(first, second);
    let outcomes = [first.unwrap().unwrap(), second.unwrap().unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_some()).count(), 1);
    let events = engine.alert_events(alert.id, 10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].status, AlertStatus::Resolved);
    assert_eq!(events[1].status, AlertStatus::Triggered);
}
