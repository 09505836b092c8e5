//! Integration tests for the PromQL client against a stub HTTP backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use depscope_metrics::{MetricsBackend, MetricsConfig, MetricsError, PrometheusClient, QueryOptions};

#[derive(Clone, Default)]
struct Captured {
    params: Arc<Mutex<Vec<HashMap<String, String>>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

impl Captured {
    fn last_params(&self) -> HashMap<String, String> {
        self.params.lock().unwrap().last().cloned().unwrap_or_default()
    }

    fn last_auth(&self) -> Option<String> {
        self.auth.lock().unwrap().last().cloned().flatten()
    }
}

async fn spawn_stub(body: Value, captured: Captured) -> String {
    let app = Router::new()
        .route(
            "/api/v1/query",
            get(
                move |State(cap): State<Captured>,
                      Query(params): Query<HashMap<String, String>>,
                      headers: HeaderMap| {
                    let body = body.clone();
                    async move {
                        cap.params.lock().unwrap().push(params);
                        cap.auth.lock().unwrap().push(
                            headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(String::from),
                        );
                        Json(body)
                    }
                },
            ),
        )
        .with_state(captured);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(url: String) -> PrometheusClient {
    PrometheusClient::new(MetricsConfig {
        url,
        ..Default::default()
    })
    .unwrap()
}

fn edge_vector() -> Value {
    json!({
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {
                    "metric": {
                        "name": "svc-go",
                        "namespace": "prod",
                        "dependency": "postgres",
                        "type": "postgres",
                        "host": "pg.local",
                        "port": "5432",
                        "critical": "yes"
                    },
                    "value": [1700000000, "1"]
                },
                {
                    "metric": {
                        "name": "svc-go",
                        "namespace": "prod",
                        "dependency": "redis",
                        "type": "redis",
                        "host": "redis.local",
                        "port": "6379",
                        "critical": "no"
                    },
                    "value": [1700000000, "1"]
                }
            ]
        }
    })
}

#[tokio::test]
async fn topology_edges_decode_and_query_shape() {
    let captured = Captured::default();
    let url = spawn_stub(edge_vector(), captured.clone()).await;

    let edges = client(url)
        .query_topology_edges(&QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].name, "svc-go");
    assert_eq!(edges[0].host, "pg.local");
    assert!(edges[0].critical);
    assert!(!edges[1].critical);

    let params = captured.last_params();
    assert_eq!(
        params["query"],
        "group by (name, namespace, group, dependency, type, host, port, critical) \
         (app_dependency_health)"
    );
    assert!(!params.contains_key("time"));
}

#[tokio::test]
async fn lookback_query_wraps_last_over_time() {
    let captured = Captured::default();
    let url = spawn_stub(edge_vector(), captured.clone()).await;

    client(url)
        .query_topology_edges_lookback(
            &QueryOptions::default(),
            std::time::Duration::from_secs(5400),
        )
        .await
        .unwrap();

    let params = captured.last_params();
    assert_eq!(
        params["query"],
        "group by (name, namespace, group, dependency, type, host, port, critical) \
         (last_over_time(app_dependency_health[90m]))"
    );
}

#[tokio::test]
async fn historical_query_propagates_time_parameter() {
    let captured = Captured::default();
    let url = spawn_stub(edge_vector(), captured.clone()).await;
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let opts = QueryOptions {
        namespace: "prod".into(),
        time: Some(at),
        ..Default::default()
    };
    client(url).query_health_state(&opts).await.unwrap();

    let params = captured.last_params();
    assert_eq!(params["query"], r#"app_dependency_health{namespace="prod"}"#);
    assert_eq!(params["time"], at.timestamp().to_string());
}

#[tokio::test]
async fn basic_auth_header_is_sent_when_configured() {
    let captured = Captured::default();
    let url = spawn_stub(edge_vector(), captured.clone()).await;

    let prom = PrometheusClient::new(MetricsConfig {
        url,
        username: "metrics".into(),
        password: "s3cret".into(),
        ..Default::default()
    })
    .unwrap();
    prom.query_topology_edges(&QueryOptions::default())
        .await
        .unwrap();

    let auth = captured.last_auth().expect("authorization header");
    assert!(auth.starts_with("Basic "));
}

#[tokio::test]
async fn failed_envelope_status_is_an_error() {
    let captured = Captured::default();
    let url = spawn_stub(json!({"status": "error", "data": {}}), captured).await;

    let err = client(url)
        .query_topology_edges(&QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MetricsError::QueryFailed(_)));
}

#[tokio::test]
async fn upstream_http_error_is_an_error() {
    let app = Router::new().route(
        "/api/v1/query",
        get(|| async {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "backend exploded",
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let err = client(format!("http://{addr}"))
        .query_topology_edges(&QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MetricsError::UpstreamStatus { status: 500, .. }
    ));
}
