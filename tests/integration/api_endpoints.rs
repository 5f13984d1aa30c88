//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Overview, probe and metric endpoints return the service's view
//! - Alert CRUD maps validation and lookup failures to 400 and 404
//! - Authentication middleware functions properly
//! - The event stream opens with a snapshot

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use pulse::api::{ApiConfig, ApiState, spawn_api_server};
use pulse::service::PulseService;
use pulse::storage::TimeSeriesStorage;
use serde_json::{Value, json};

use crate::helpers::{Outcome, StaticProbe, build_service, registry};

const TOKEN: &str = "test-token";

fn test_service() -> Arc<PulseService> {
    build_service(
        registry(vec![
            StaticProbe::arc("database", false, Outcome::Pass),
            StaticProbe::arc("database", true, Outcome::Pass),
            StaticProbe::arc("cache", false, Outcome::Unhealthy),
        ]),
        TimeSeriesStorage::in_memory(),
    )
}

async fn spawn_test_api(service: Arc<PulseService>) -> SocketAddr {
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        auth_token: Some(TOKEN.to_string()),
        enable_cors: true,
    };

    spawn_api_server(config, ApiState::new(service)).await.unwrap()
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn alert_body(name: &str) -> Value {
    json!({
        "name": name,
        "condition": { "type": "probe_unhealthy", "target": "cache" },
        "channels": ["ui"],
        "cooldownSeconds": 60
    })
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let addr = spawn_test_api(test_service()).await;

    let response = client()
        .get(format!("http://{addr}/pulse"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client()
        .get(format!("http://{addr}/pulse"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_overview_reports_probes_and_modules() {
    let addr = spawn_test_api(test_service()).await;

    let response = client()
        .get(format!("http://{addr}/pulse"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["probes"].as_array().unwrap().len(), 2);
    assert!(json["modules"]["database"].is_object());
    assert_eq!(json["storage"]["state"], "degraded");
}

#[tokio::test]
async fn test_probe_routes() {
    let addr = spawn_test_api(test_service()).await;

    let deep: Value = client()
        .get(format!("http://{addr}/pulse/probes/deep"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deep.as_array().unwrap().len(), 1);
    assert_eq!(deep[0]["deep"], true);

    let cache: Value = client()
        .get(format!("http://{addr}/pulse/probes/cache"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cache["healthy"], false);
    assert_eq!(cache["message"], "connection refused");

    let missing = client()
        .get(format!("http://{addr}/pulse/probes/queue"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_requires_metric_or_period() {
    let addr = spawn_test_api(test_service()).await;

    let response = client()
        .get(format!("http://{addr}/pulse/metrics/history"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client()
        .get(format!("http://{addr}/pulse/metrics/history?period=1m"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_alert_crud_lifecycle() {
    let addr = spawn_test_api(test_service()).await;
    let base = format!("http://{addr}/pulse/alerts");

    let response = client()
        .post(&base)
        .bearer_auth(TOKEN)
        .json(&alert_body("cache down"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["enabled"], true);

    let mut update = alert_body("cache unreachable");
    update["enabled"] = json!(false);
    let updated: Value = client()
        .put(format!("{base}/{id}"))
        .bearer_auth(TOKEN)
        .json(&update)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated["name"], "cache unreachable");
    assert_eq!(updated["createdAt"], created["createdAt"]);

    let listed: Value = client()
        .get(&base)
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["alerts"].as_array().unwrap().len(), 1);
    assert!(listed["recentEvents"].as_array().unwrap().is_empty());

    let response = client()
        .delete(format!("{base}/{id}"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = client()
        .get(format!("{base}/{id}"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_alert_lists_field_errors() {
    let addr = spawn_test_api(test_service()).await;

    let response = client()
        .post(format!("http://{addr}/pulse/alerts"))
        .bearer_auth(TOKEN)
        .json(&json!({
            "name": "  ",
            "condition": { "type": "probe_unhealthy", "target": "cache" },
            "channels": [],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json: Value = response.json().await.unwrap();
    let fields: Vec<&str> = json["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "channels"]);

    let response = client()
        .post(format!("http://{addr}/pulse/alerts"))
        .bearer_auth(TOKEN)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_alert_ids_are_not_found() {
    let addr = spawn_test_api(test_service()).await;

    for path in [
        "/pulse/alerts/not-a-uuid",
        "/pulse/alerts/6f1c2b1e-0d4a-4b8e-9c53-2f7d0b8e9a10",
        "/pulse/alerts/6f1c2b1e-0d4a-4b8e-9c53-2f7d0b8e9a10/events",
    ] {
        let response = client()
            .get(format!("http://{addr}{path}"))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn test_trigger_and_resolve_over_http() {
    let addr = spawn_test_api(test_service()).await;
    let base = format!("http://{addr}/pulse/alerts");

    let created: Value = client()
        .post(&base)
        .bearer_auth(TOKEN)
        .json(&alert_body("cache down"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let resolved: Value = client()
        .post(format!("{base}/{id}/resolve"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resolved["changed"], false);

    let triggered: Value = client()
        .post(format!("{base}/{id}/trigger"))
        .bearer_auth(TOKEN)
        .json(&json!({ "details": { "reason": "drill" } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(triggered["changed"], true);
    assert_eq!(triggered["event"]["status"], "triggered");
    assert_eq!(triggered["event"]["details"]["reason"], "drill");
    assert_eq!(triggered["event"]["details"]["manual"], true);
    assert_eq!(triggered["event"]["details"]["triggeredBy"], "api-token");
    assert_eq!(triggered["deliveries"][0]["success"], true);

    let resolved: Value = client()
        .post(format!("{base}/{id}/resolve"))
        .bearer_auth(TOKEN)
        .json(&json!({ "eventId": triggered["event"]["id"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resolved["changed"], true);
    assert_eq!(resolved["event"]["status"], "resolved");

    let events: Value = client()
        .get(format!("{base}/{id}/events?limit=1"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["status"], "resolved");
}

#[tokio::test]
async fn test_event_stream_opens_with_snapshot() {
    let addr = spawn_test_api(test_service()).await;

    let mut response = client()
        .get(format!("http://{addr}/pulse/events"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let mut received = String::new();
    while !received.contains("\n\n") {
        let chunk = response.chunk().await.unwrap().unwrap();
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(received.starts_with("event: snapshot\n"), "{received}");
}
