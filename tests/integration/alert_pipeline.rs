//! End-to-end alert evaluation through the scheduler cycle

use assert_matches::assert_matches;
use pulse::alerts::{AlertError, AlertStatus, ChannelKind};
use pulse::storage::TimeSeriesStorage;
use serde_json::json;

use crate::helpers::{
    Outcome, StaticProbe, build_service, in_memory_service, latency_alert, probe_alert, registry,
};

#[tokio::test]
async fn test_latency_threshold_triggers_once_through_ui() {
    let service = in_memory_service();
    let engine = service.engine().clone();
    let alert = engine
        .create_alert(latency_alert("slow queries", 500.0))
        .await
        .unwrap();
    let mut transitions = engine.subscribe();

    service
        .collector()
        .observe_histogram("db.query.latency", 600.0, &[("query", "select")]);
    let overview = service.run_cycle().await;

    let event = transitions.try_recv().unwrap();
    assert_eq!(event.alert_id, alert.id);
    assert_eq!(event.status, AlertStatus::Triggered);
    assert_eq!(event.channels, vec![ChannelKind::Ui]);

    assert_eq!(overview.active_alerts.len(), 1);
    assert_eq!(overview.active_alerts[0].id, event.id);

    let history = engine.alert_events(alert.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].details.as_ref().unwrap()["observed"], json!(600.0));
}

#[tokio::test]
async fn test_cooldown_suppresses_second_cycle() {
    let service = in_memory_service();
    let engine = service.engine().clone();
    let alert = engine
        .create_alert(latency_alert("slow queries", 500.0))
        .await
        .unwrap();

    service
        .collector()
        .observe_histogram("db.query.latency", 900.0, &[]);
    service.run_cycle().await;
    service.run_cycle().await;

    assert!(engine.is_on_cooldown(alert.id));
    assert_eq!(engine.alert_events(alert.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_manual_trigger_ignores_cooldown() {
    let service = in_memory_service();
    let engine = service.engine().clone();
    let alert = engine
        .create_alert(latency_alert("slow queries", 500.0))
        .await
        .unwrap();

    let first = engine.trigger_manual_alert(alert.id, None).await.unwrap();
    let second = engine.trigger_manual_alert(alert.id, None).await.unwrap();

    assert_ne!(first.event.id, second.event.id);
    assert!(!engine.is_on_cooldown(alert.id));
    assert!(first.deliveries.iter().all(|d| d.success));
    assert_eq!(first.event.details, Some(json!({ "manual": true })));
}

#[tokio::test]
async fn test_resolve_is_noop_without_open_trigger() {
    let service = in_memory_service();
    let engine = service.engine().clone();
    let alert = engine
        .create_alert(latency_alert("slow queries", 500.0))
        .await
        .unwrap();

    assert!(engine.resolve_alert(alert.id, None).await.unwrap().is_none());

    let triggered = engine.trigger_manual_alert(alert.id, None).await.unwrap();
    let resolved = engine
        .resolve_alert(alert.id, Some(triggered.event.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.event.status, AlertStatus::Resolved);
    assert_eq!(resolved.event.trigger_event_id, Some(triggered.event.id));
    assert!(resolved.event.resolved_at.unwrap() >= resolved.event.triggered_at);

    // second resolve finds the latest event already resolved
    assert!(engine.resolve_alert(alert.id, None).await.unwrap().is_none());
    assert_eq!(engine.alert_events(alert.id, 10).await.unwrap().len(), 2);
    assert!(engine.active_alerts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unhealthy_probe_triggers_probe_alert() {
    let service = build_service(
        registry(vec![
            StaticProbe::arc("database", false, Outcome::Pass),
            StaticProbe::arc("cache", false, Outcome::Unhealthy),
        ]),
        TimeSeriesStorage::in_memory(),
    );
    let engine = service.engine().clone();
    let cache_alert = engine
        .create_alert(probe_alert("cache down", "cache"))
        .await
        .unwrap();
    let db_alert = engine
        .create_alert(probe_alert("database down", "database"))
        .await
        .unwrap();

    service.run_cycle().await;

    assert_eq!(engine.alert_events(cache_alert.id, 10).await.unwrap().len(), 1);
    assert!(engine.alert_events(db_alert.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_disabled_alert_is_not_evaluated() {
    let service = in_memory_service();
    let engine = service.engine().clone();
    let mut input = latency_alert("disabled", 1.0);
    input.enabled = false;
    let alert = engine.create_alert(input).await.unwrap();

    service
        .collector()
        .observe_histogram("db.query.latency", 50.0, &[]);
    service.run_cycle().await;

    assert!(engine.alert_events(alert.id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleted_alert_is_gone_with_its_events() {
    let service = in_memory_service();
    let engine = service.engine().clone();
    let alert = engine
        .create_alert(latency_alert("temporary", 500.0))
        .await
        .unwrap();
    engine.trigger_manual_alert(alert.id, None).await.unwrap();

    engine.delete_alert(alert.id).await.unwrap();

    assert_matches!(engine.get_alert(alert.id).await, Err(AlertError::NotFound(_)));
    assert!(engine.recent_events().await.unwrap().is_empty());
    assert_matches!(
        engine.delete_alert(alert.id).await,
        Err(AlertError::NotFound(_))
    );
}
