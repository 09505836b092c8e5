// ABOUTME: Reqwest-based PromQL client with the fixed topology query set
// ABOUTME: Decodes instant vectors and range matrices into per-edge maps

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::{MetricsError, MetricsResult};
use crate::types::{
    EdgeKey, HistoricalAlert, Instance, QueryOptions, RangeResult, TimeValue, TopologyEdge,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the PromQL backend.
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout. Zero means the 10s default.
    pub timeout: Duration,
}

/// Read side of the PromQL backend. The graph builder and the timeline
/// detector consume this trait so tests can substitute canned data.
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// All unique topology edges currently reporting.
    async fn query_topology_edges(&self, opts: &QueryOptions) -> MetricsResult<Vec<TopologyEdge>>;

    /// Topology edges over a lookback window, retaining recently
    /// disappeared series.
    async fn query_topology_edges_lookback(
        &self,
        opts: &QueryOptions,
        lookback: Duration,
    ) -> MetricsResult<Vec<TopologyEdge>>;

    /// Current health value per edge (worst instance wins).
    async fn query_health_state(&self, opts: &QueryOptions)
        -> MetricsResult<HashMap<EdgeKey, f64>>;

    /// Average latency per edge over the last 5 minutes.
    async fn query_avg_latency(&self, opts: &QueryOptions)
        -> MetricsResult<HashMap<EdgeKey, f64>>;

    /// P99 latency per edge over the last 5 minutes.
    async fn query_p99_latency(&self, opts: &QueryOptions)
        -> MetricsResult<HashMap<EdgeKey, f64>>;

    /// Active `status` label per edge.
    async fn query_dependency_status(
        &self,
        opts: &QueryOptions,
    ) -> MetricsResult<HashMap<EdgeKey, String>>;

    /// Active `detail` label per edge.
    async fn query_dependency_status_detail(
        &self,
        opts: &QueryOptions,
    ) -> MetricsResult<HashMap<EdgeKey, String>>;

    /// All instances (pods/containers) reporting for a service.
    async fn query_instances(&self, service: &str) -> MetricsResult<Vec<Instance>>;

    /// Alerts firing at the given instant, from the `ALERTS` metric.
    async fn query_historical_alerts(
        &self,
        time: DateTime<Utc>,
    ) -> MetricsResult<Vec<HistoricalAlert>>;

    /// Range query of active dependency statuses, one series per
    /// (edge, status) pair.
    async fn query_status_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        namespace: &str,
    ) -> MetricsResult<Vec<RangeResult>>;
}

/// PromQL client for Prometheus and VictoriaMetrics.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    cfg: MetricsConfig,
    http: Client,
}

impl PrometheusClient {
    pub fn new(cfg: MetricsConfig) -> MetricsResult<Self> {
        let timeout = if cfg.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            cfg.timeout
        };
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { cfg, http })
    }

    async fn instant(
        &self,
        promql: &str,
        time: Option<DateTime<Utc>>,
    ) -> MetricsResult<Vec<PromSample>> {
        let mut url = Url::parse(&self.cfg.url)?;
        url.set_path("/api/v1/query");

        let mut params: Vec<(&str, String)> = vec![("query", promql.to_string())];
        if let Some(t) = time {
            params.push(("time", t.timestamp().to_string()));
        }

        self.send(url, &params).await
    }

    async fn range(
        &self,
        promql: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
    ) -> MetricsResult<Vec<PromSample>> {
        let mut url = Url::parse(&self.cfg.url)?;
        url.set_path("/api/v1/query_range");

        let params: Vec<(&str, String)> = vec![
            ("query", promql.to_string()),
            ("start", start.timestamp().to_string()),
            ("end", end.timestamp().to_string()),
            ("step", step.as_secs().to_string()),
        ];

        self.send(url, &params).await
    }

    async fn send(&self, url: Url, params: &[(&str, String)]) -> MetricsResult<Vec<PromSample>> {
        let mut req = self.http.get(url).query(params);
        if !self.cfg.username.is_empty() {
            req = req.basic_auth(&self.cfg.username, Some(&self.cfg.password));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MetricsError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: PromResponse = resp.json().await?;
        if envelope.status != "success" {
            return Err(MetricsError::QueryFailed(envelope.status));
        }
        Ok(envelope.data.result)
    }
}

#[async_trait]
impl MetricsBackend for PrometheusClient {
    async fn query_topology_edges(&self, opts: &QueryOptions) -> MetricsResult<Vec<TopologyEdge>> {
        let f = label_filter(opts);
        let promql = format!(
            "group by (name, namespace, group, dependency, type, host, port, critical) \
             (app_dependency_health{f})"
        );
        let samples = self.instant(&promql, opts.time).await?;
        Ok(samples.iter().map(edge_from_sample).collect())
    }

    async fn query_topology_edges_lookback(
        &self,
        opts: &QueryOptions,
        lookback: Duration,
    ) -> MetricsResult<Vec<TopologyEdge>> {
        let f = label_filter(opts);
        let d = promql_duration(lookback);
        let promql = format!(
            "group by (name, namespace, group, dependency, type, host, port, critical) \
             (last_over_time(app_dependency_health{f}[{d}]))"
        );
        let samples = self.instant(&promql, opts.time).await?;
        Ok(samples.iter().map(edge_from_sample).collect())
    }

    async fn query_health_state(
        &self,
        opts: &QueryOptions,
    ) -> MetricsResult<HashMap<EdgeKey, f64>> {
        let f = label_filter(opts);
        let samples = self
            .instant(&format!("app_dependency_health{f}"), opts.time)
            .await?;
        Ok(edge_values_min(&samples))
    }

    async fn query_avg_latency(
        &self,
        opts: &QueryOptions,
    ) -> MetricsResult<HashMap<EdgeKey, f64>> {
        let f = label_filter(opts);
        let promql = format!(
            "rate(app_dependency_latency_seconds_sum{f}[5m]) \
             / rate(app_dependency_latency_seconds_count{f}[5m])"
        );
        let samples = self.instant(&promql, opts.time).await?;
        Ok(edge_values_first(&samples))
    }

    async fn query_p99_latency(
        &self,
        opts: &QueryOptions,
    ) -> MetricsResult<HashMap<EdgeKey, f64>> {
        let f = label_filter(opts);
        let promql =
            format!("histogram_quantile(0.99, rate(app_dependency_latency_seconds_bucket{f}[5m]))");
        let samples = self.instant(&promql, opts.time).await?;
        Ok(edge_values_first(&samples))
    }

    async fn query_dependency_status(
        &self,
        opts: &QueryOptions,
    ) -> MetricsResult<HashMap<EdgeKey, String>> {
        let f = label_filter(opts);
        let samples = self
            .instant(&format!("app_dependency_status{f}"), opts.time)
            .await?;
        Ok(active_label(&samples, "status"))
    }

    async fn query_dependency_status_detail(
        &self,
        opts: &QueryOptions,
    ) -> MetricsResult<HashMap<EdgeKey, String>> {
        let f = label_filter(opts);
        let samples = self
            .instant(&format!("app_dependency_status{f}"), opts.time)
            .await?;
        Ok(active_label(&samples, "detail"))
    }

    async fn query_instances(&self, service: &str) -> MetricsResult<Vec<Instance>> {
        let promql = format!(
            "group by (instance, pod, job) (app_dependency_health{{name=\"{service}\"}})"
        );
        let samples = self.instant(&promql, None).await?;

        let instances = samples
            .iter()
            .filter_map(|s| {
                let instance = label(s, "instance");
                if instance.is_empty() {
                    return None;
                }
                Some(Instance {
                    instance,
                    pod: label(s, "pod"),
                    job: label(s, "job"),
                    service: service.to_string(),
                })
            })
            .collect();
        Ok(instances)
    }

    async fn query_historical_alerts(
        &self,
        time: DateTime<Utc>,
    ) -> MetricsResult<Vec<HistoricalAlert>> {
        let samples = self
            .instant(r#"ALERTS{alertstate="firing"}"#, Some(time))
            .await?;

        let alerts = samples
            .iter()
            .map(|s| HistoricalAlert {
                alert_name: label(s, "alertname"),
                namespace: label(s, "namespace"),
                service: source_name(s),
                severity: label(s, "severity"),
            })
            .collect();
        Ok(alerts)
    }

    async fn query_status_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        namespace: &str,
    ) -> MetricsResult<Vec<RangeResult>> {
        let opts = QueryOptions {
            namespace: namespace.to_string(),
            ..Default::default()
        };
        let f = label_filter(&opts);
        let promql = format!("app_dependency_status{f} == 1");
        let samples = self.range(&promql, start, end, step).await?;

        let results = samples
            .iter()
            .map(|s| RangeResult {
                key: sample_key(s),
                status: label(s, "status"),
                values: s
                    .values
                    .iter()
                    .filter_map(|(ts, v)| {
                        let value = parse_finite(v)?;
                        let timestamp = Utc.timestamp_opt(*ts as i64, 0).single()?;
                        Some(TimeValue { timestamp, value })
                    })
                    .collect(),
            })
            .collect();
        Ok(results)
    }
}

/// Builds the PromQL label selector for the given filter options.
/// Non-empty components are joined with commas inside a single `{}`;
/// no filters yields an empty string.
pub fn label_filter(opts: &QueryOptions) -> String {
    let mut clauses = Vec::new();
    if !opts.namespace.is_empty() {
        clauses.push(format!(r#"namespace="{}""#, opts.namespace));
    }
    if !opts.group.is_empty() {
        clauses.push(format!(r#"group="{}""#, opts.group));
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", clauses.join(","))
    }
}

/// Formats a duration as a PromQL range using the largest whole unit
/// among hours, minutes, and seconds: 90 minutes stays `90m`, not `1h30m`.
pub fn promql_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

#[derive(Debug, Deserialize)]
struct PromResponse {
    status: String,
    #[serde(default)]
    data: PromData,
}

#[derive(Debug, Default, Deserialize)]
struct PromData {
    #[serde(default, rename = "resultType")]
    #[allow(dead_code)]
    result_type: String,
    #[serde(default)]
    result: Vec<PromSample>,
}

#[derive(Debug, Deserialize)]
struct PromSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    #[serde(default)]
    value: Option<(f64, String)>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

fn label(s: &PromSample, name: &str) -> String {
    s.metric.get(name).cloned().unwrap_or_default()
}

/// The service name label. Emitters set `name`; alert rules and some
/// relabelling setups only carry `job`.
fn source_name(s: &PromSample) -> String {
    let name = label(s, "name");
    if name.is_empty() {
        label(s, "job")
    } else {
        name
    }
}

fn sample_key(s: &PromSample) -> EdgeKey {
    EdgeKey {
        name: source_name(s),
        host: label(s, "host"),
        port: label(s, "port"),
    }
}

fn sample_value(s: &PromSample) -> Option<f64> {
    parse_finite(&s.value.as_ref()?.1)
}

fn parse_finite(raw: &str) -> Option<f64> {
    let v: f64 = raw.parse().ok()?;
    v.is_finite().then_some(v)
}

fn edge_from_sample(s: &PromSample) -> TopologyEdge {
    TopologyEdge {
        name: source_name(s),
        namespace: label(s, "namespace"),
        group: label(s, "group"),
        dependency: label(s, "dependency"),
        kind: label(s, "type"),
        host: label(s, "host"),
        port: label(s, "port"),
        critical: label(s, "critical") == "yes",
    }
}

/// Collapses samples onto edge keys keeping the minimum (worst) value,
/// so one unhealthy instance marks the whole edge.
fn edge_values_min(samples: &[PromSample]) -> HashMap<EdgeKey, f64> {
    let mut m = HashMap::with_capacity(samples.len());
    for s in samples {
        let Some(v) = sample_value(s) else { continue };
        m.entry(sample_key(s))
            .and_modify(|cur: &mut f64| {
                if v < *cur {
                    *cur = v;
                }
            })
            .or_insert(v);
    }
    m
}

/// Collapses samples onto edge keys keeping the first value seen.
fn edge_values_first(samples: &[PromSample]) -> HashMap<EdgeKey, f64> {
    let mut m = HashMap::with_capacity(samples.len());
    for s in samples {
        let Some(v) = sample_value(s) else { continue };
        m.entry(sample_key(s)).or_insert(v);
    }
    m
}

/// Keeps the given label of the series whose value is 1 per edge key.
fn active_label(samples: &[PromSample], name: &str) -> HashMap<EdgeKey, String> {
    let mut m = HashMap::new();
    for s in samples {
        if sample_value(s) == Some(1.0) {
            m.insert(sample_key(s), label(s, name));
        }
    }
    m
}
