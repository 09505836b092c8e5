//! Integration tests for the AlertManager client against a stub backend.

use axum::extract::RawQuery;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use depscope_alerts::{AlertManagerClient, AlertSource, AlertsConfig, AlertsError};

async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn fetches_and_maps_active_alerts() {
    let app = Router::new().route(
        "/api/v2/alerts",
        get(|RawQuery(q): RawQuery| async move {
            assert_eq!(
                q.as_deref(),
                Some("active=true&silenced=false&inhibited=false")
            );
            Json(json!([
                {
                    "labels": {
                        "alertname": "DependencyDown",
                        "job": "svc-a",
                        "dependency": "postgres",
                        "severity": "critical"
                    },
                    "annotations": {"summary": "postgres unreachable"},
                    "startsAt": "2024-05-01T12:00:00Z",
                    "status": {"state": "active"}
                },
                {
                    "labels": {"alertname": "HighCPU", "job": "svc-a"},
                    "annotations": {},
                    "startsAt": "2024-05-01T12:00:00Z",
                    "status": {"state": "active"}
                }
            ]))
        }),
    );
    let url = spawn_stub(app).await;

    let client = AlertManagerClient::new(AlertsConfig {
        url,
        ..Default::default()
    })
    .unwrap();
    let alerts = client.fetch_alerts().await.unwrap();

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alertname, "DependencyDown");
    assert_eq!(alerts[0].summary, "postgres unreachable");
}

#[tokio::test]
async fn upstream_error_surfaces_as_status_error() {
    let app = Router::new().route(
        "/api/v2/alerts",
        get(|| async { (axum::http::StatusCode::BAD_GATEWAY, "am down") }),
    );
    let url = spawn_stub(app).await;

    let client = AlertManagerClient::new(AlertsConfig {
        url,
        ..Default::default()
    })
    .unwrap();
    let err = client.fetch_alerts().await.unwrap_err();
    assert!(matches!(
        err,
        AlertsError::UpstreamStatus { status: 502, .. }
    ));
}
