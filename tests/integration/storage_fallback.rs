//! Durable storage failures degrade to memory without losing data

use std::sync::Arc;

use chrono::{Duration, Utc};
use pulse::service::HistoryQuery;
use pulse::storage::{BackendState, SnapshotPeriod, TimeSeriesBackend, TimeSeriesStorage};

use crate::helpers::{BrokenBackend, Outcome, StaticProbe, build_service, registry};

#[tokio::test]
async fn test_failed_durable_write_degrades_and_sticks() {
    let durable = Arc::new(BrokenBackend::default());
    let storage = TimeSeriesStorage::new(Some(durable.clone() as Arc<dyn TimeSeriesBackend>));
    assert_eq!(storage.state(), BackendState::Preferred);

    storage
        .store_point("probe.cache.latency_ms", 4.0, None)
        .await
        .unwrap();
    assert_eq!(storage.state(), BackendState::Degraded);
    assert_eq!(durable.calls(), 1);

    storage
        .store_point("probe.cache.latency_ms", 5.0, None)
        .await
        .unwrap();
    let points = storage
        .get_points(
            "probe.cache.latency_ms",
            Utc::now() - Duration::minutes(1),
            Utc::now(),
        )
        .await
        .unwrap();

    // the durable backend is never consulted again
    assert_eq!(durable.calls(), 1);
    assert_eq!(points.len(), 2);
    assert_eq!(points[1].value, 5.0);
}

#[tokio::test]
async fn test_restore_durable_retries_backend() {
    let durable = Arc::new(BrokenBackend::default());
    let storage = TimeSeriesStorage::new(Some(durable.clone() as Arc<dyn TimeSeriesBackend>));

    storage.record_error("cache", "timeout", "slow").await.unwrap();
    storage.restore_durable();
    assert_eq!(storage.state(), BackendState::Preferred);

    // read fails durably, is served from memory in the same call
    let errors = storage.get_errors("cache").await.unwrap();
    assert_eq!(durable.calls(), 2);
    assert_eq!(storage.state(), BackendState::Degraded);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_type, "timeout");
}

#[tokio::test]
async fn test_cycle_keeps_running_on_broken_durable_store() {
    let durable = Arc::new(BrokenBackend::default());
    let service = build_service(
        registry(vec![
            StaticProbe::arc("database", false, Outcome::Pass),
            StaticProbe::arc("cache", false, Outcome::Unhealthy),
        ]),
        TimeSeriesStorage::new(Some(durable as Arc<dyn TimeSeriesBackend>)),
    );

    let overview = service.run_cycle().await;
    assert_eq!(overview.storage.state, BackendState::Degraded);
    assert!(overview.storage.durable_configured);

    let cache = &overview.modules["cache"];
    assert_eq!(cache.error_summaries.len(), 1);
    assert_eq!(cache.error_summaries[0].error_type, "probe_failure");
    assert_eq!(cache.error_summaries[0].last_message, "connection refused");

    let history = service
        .get_historical_metrics(&HistoryQuery {
            period: Some(SnapshotPeriod::OneMinute),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(history.iter().any(|series| series.name == "db.query.latency"));

    let latency = service
        .get_historical_metrics(&HistoryQuery {
            metric: Some("probe.database.latency_ms".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(latency[0].points.len(), 1);
}
