//! Probe fan-out through the service and the health aggregator

use std::sync::Arc;

use pulse::HealthStatus;
use pulse::probes::{GatewayProbe, LlmProvider, LlmProviderProbe};
use pulse::storage::TimeSeriesStorage;

use crate::helpers::{Outcome, StaticProbe, build_service, registry};

#[tokio::test]
async fn test_one_failing_probe_does_not_abort_fanout() {
    let service = build_service(
        registry(vec![
            StaticProbe::arc("cache", false, Outcome::Pass),
            StaticProbe::arc("database", false, Outcome::Pass),
            StaticProbe::arc("llm-openai", false, Outcome::Pass),
            StaticProbe::arc("queue", false, Outcome::Fail),
            StaticProbe::arc("whatsapp", false, Outcome::Pass),
        ]),
        TimeSeriesStorage::in_memory(),
    );

    let probes = service.get_all_probes(false).await;
    assert_eq!(probes.len(), 5);
    let failed: Vec<_> = probes.iter().filter(|p| !p.healthy).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "queue");
    assert_eq!(failed[0].message.as_deref(), Some("probe crashed"));

    let overview = service.run_cycle().await;
    assert_eq!(overview.status, HealthStatus::Degraded);
    assert_eq!(overview.modules["queue"].status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_deep_and_shallow_classes_are_separate() {
    let service = build_service(
        registry(vec![
            StaticProbe::arc("database", false, Outcome::Pass),
            StaticProbe::arc("database", true, Outcome::Unhealthy),
        ]),
        TimeSeriesStorage::in_memory(),
    );

    assert!(service.get_probe("database", false).await.unwrap().healthy);
    let deep = service.get_probe("database", true).await.unwrap();
    assert!(!deep.healthy);
    assert!(deep.deep);
    assert!(service.get_probe("cache", false).await.is_none());
}

#[tokio::test]
async fn test_unconfigured_dependencies_report_without_network() {
    let client = reqwest::Client::new();
    let provider = LlmProvider {
        name: "anthropic".to_string(),
        base_url: "http://127.0.0.1:9".to_string(),
        api_key: None,
        api_key_header: Some("x-api-key".to_string()),
    };
    let service = build_service(
        registry(vec![
            Arc::new(LlmProviderProbe::new(provider, client.clone(), true)),
            Arc::new(GatewayProbe::new(None, None, client, true)),
        ]),
        TimeSeriesStorage::in_memory(),
    );

    let probes = service.get_all_probes(true).await;
    assert_eq!(probes.len(), 2);
    assert!(probes.iter().all(|p| !p.healthy));

    let llm = probes.iter().find(|p| p.name == "llm-anthropic").unwrap();
    assert_eq!(llm.message.as_deref(), Some("anthropic not configured"));
    let gateway = probes.iter().find(|p| p.name == "whatsapp").unwrap();
    assert_eq!(
        gateway.message.as_deref(),
        Some("whatsapp gateway not configured")
    );
}

#[tokio::test]
async fn test_empty_registry_is_healthy() {
    let service = build_service(registry(Vec::new()), TimeSeriesStorage::in_memory());

    let health = service.aggregator().get_system_health().await;
    assert_eq!(health.status, HealthStatus::Healthy);
    assert!(health.probes.is_empty());
}

#[tokio::test]
async fn test_unseen_histogram_reads_as_zero() {
    let service = build_service(registry(Vec::new()), TimeSeriesStorage::in_memory());

    let histogram = service.collector().get_histogram("never.observed", &[]);
    assert_eq!(histogram.count, 0);
    assert_eq!(histogram.sum, 0.0);
    assert_eq!(histogram.p99, 0.0);
    assert_eq!(histogram.max, 0.0);

    let modules = service.get_module_health().await;
    let database = &modules["database"];
    assert_eq!(database.status, HealthStatus::Healthy);
    assert_eq!(database.metrics["db.query.latency"].value, 0.0);
}
