//! Transition detection over stubbed status range results.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use depscope_metrics::{
    EdgeKey, HistoricalAlert, Instance, MetricsBackend, MetricsResult, QueryOptions, RangeResult,
    TimeValue, TopologyEdge,
};
use depscope_timeline::{query_status_transitions, EventsRequest, TimelineError};

struct StubRange(Vec<RangeResult>);

#[async_trait]
impl MetricsBackend for StubRange {
    async fn query_topology_edges(&self, _: &QueryOptions) -> MetricsResult<Vec<TopologyEdge>> {
        Ok(Vec::new())
    }
    async fn query_topology_edges_lookback(
        &self,
        _: &QueryOptions,
        _: Duration,
    ) -> MetricsResult<Vec<TopologyEdge>> {
        Ok(Vec::new())
    }
    async fn query_health_state(&self, _: &QueryOptions) -> MetricsResult<HashMap<EdgeKey, f64>> {
        Ok(HashMap::new())
    }
    async fn query_avg_latency(&self, _: &QueryOptions) -> MetricsResult<HashMap<EdgeKey, f64>> {
        Ok(HashMap::new())
    }
    async fn query_p99_latency(&self, _: &QueryOptions) -> MetricsResult<HashMap<EdgeKey, f64>> {
        Ok(HashMap::new())
    }
    async fn query_dependency_status(
        &self,
        _: &QueryOptions,
    ) -> MetricsResult<HashMap<EdgeKey, String>> {
        Ok(HashMap::new())
    }
    async fn query_dependency_status_detail(
        &self,
        _: &QueryOptions,
    ) -> MetricsResult<HashMap<EdgeKey, String>> {
        Ok(HashMap::new())
    }
    async fn query_instances(&self, _: &str) -> MetricsResult<Vec<Instance>> {
        Ok(Vec::new())
    }
    async fn query_historical_alerts(
        &self,
        _: DateTime<Utc>,
    ) -> MetricsResult<Vec<HistoricalAlert>> {
        Ok(Vec::new())
    }
    async fn query_status_range(
        &self,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
        _: Duration,
        _: &str,
    ) -> MetricsResult<Vec<RangeResult>> {
        Ok(self.0.clone())
    }
}

fn key(name: &str) -> EdgeKey {
    EdgeKey {
        name: name.into(),
        host: "pg.local".into(),
        port: "5432".into(),
    }
}

fn series(name: &str, status: &str, samples: &[(i64, f64)]) -> RangeResult {
    RangeResult {
        key: key(name),
        status: status.into(),
        values: samples
            .iter()
            .map(|(ts, v)| TimeValue {
                timestamp: Utc.timestamp_opt(*ts, 0).unwrap(),
                value: *v,
            })
            .collect(),
    }
}

fn request() -> EventsRequest {
    EventsRequest {
        start: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        end: Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
        namespace: String::new(),
    }
}

#[tokio::test]
async fn detects_a_single_degradation() {
    let t0 = 1_700_000_000;
    let t1 = t0 + 15;
    let t2 = t0 + 30;
    let stub = StubRange(vec![
        series("svc-go", "ok", &[(t0, 1.0), (t1, 1.0), (t2, 0.0)]),
        series("svc-go", "timeout", &[(t0, 0.0), (t1, 0.0), (t2, 1.0)]),
    ]);

    let events = query_status_transitions(&stub, &request()).await.unwrap();

    assert_eq!(events.len(), 1);
    let e = &events[0];
    assert_eq!(e.timestamp.timestamp(), t2);
    assert_eq!(e.service, "svc-go");
    assert_eq!(e.from_state, "ok");
    assert_eq!(e.to_state, "timeout");
    assert_eq!(e.kind, "degradation");
}

#[tokio::test]
async fn events_are_sorted_across_edges() {
    let t0 = 1_700_000_000;
    let stub = StubRange(vec![
        series("svc-b", "ok", &[(t0, 1.0), (t0 + 60, 0.0)]),
        series("svc-b", "error", &[(t0, 0.0), (t0 + 60, 1.0)]),
        series("svc-a", "timeout", &[(t0, 1.0), (t0 + 30, 0.0)]),
        series("svc-a", "ok", &[(t0, 0.0), (t0 + 30, 1.0)]),
    ]);

    let events = query_status_transitions(&stub, &request()).await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].service, "svc-a");
    assert_eq!(events[0].kind, "recovery");
    assert_eq!(events[1].service, "svc-b");
    assert_eq!(events[1].kind, "degradation");
    assert!(events[0].timestamp < events[1].timestamp);
}

#[tokio::test]
async fn stable_status_produces_no_events() {
    let t0 = 1_700_000_000;
    let stub = StubRange(vec![series(
        "svc-go",
        "ok",
        &[(t0, 1.0), (t0 + 15, 1.0), (t0 + 30, 1.0)],
    )]);

    let events = query_status_transitions(&stub, &request()).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn inverted_range_is_rejected() {
    let stub = StubRange(Vec::new());
    let req = EventsRequest {
        start: Utc.timestamp_opt(1_700_003_600, 0).unwrap(),
        end: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        namespace: String::new(),
    };
    let err = query_status_transitions(&stub, &req).await.unwrap_err();
    assert!(matches!(err, TimelineError::BadRange));
}
