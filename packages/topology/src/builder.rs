// ABOUTME: Fuses PromQL query results and alerts into one topology response
// ABOUTME: Owns state computation, stale detection, and the alert overlay

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::warn;

use depscope_alerts::{Alert, AlertSource};
use depscope_metrics::{
    EdgeKey, HistoricalAlert, Instance, MetricsBackend, MetricsError, MetricsResult, QueryOptions,
    TopologyEdge,
};

use crate::models::{
    AlertInfo, Edge, GrafanaConfig, Node, SeverityLevel, TopologyMeta, TopologyResponse,
};

/// Only the mandatory edge query can fail a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("querying topology edges: {0}")]
    Topology(#[from] MetricsError),
}

/// Constructs a `TopologyResponse` per call from the metrics backend and
/// the alert source. Stateless between calls.
pub struct GraphBuilder {
    metrics: Arc<dyn MetricsBackend>,
    alerts: Option<Arc<dyn AlertSource>>,
    grafana: GrafanaConfig,
    ttl: Duration,
    lookback: Duration,
    severity_levels: Vec<SeverityLevel>,
}

impl GraphBuilder {
    pub fn new(
        metrics: Arc<dyn MetricsBackend>,
        alerts: Option<Arc<dyn AlertSource>>,
        grafana: GrafanaConfig,
        ttl: Duration,
        lookback: Duration,
        severity_levels: Vec<SeverityLevel>,
    ) -> Self {
        Self {
            metrics,
            alerts,
            grafana,
            ttl,
            lookback,
            severity_levels,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Queries the backend and constructs the full topology response.
    /// The edge query is fatal; health, latency, status, and alert
    /// failures produce a partial response with `meta.errors` populated.
    ///
    /// Dropping the returned future cancels all in-flight upstream
    /// requests; the caller publishes to the cache only after success.
    pub async fn build(&self, opts: &QueryOptions) -> Result<TopologyResponse, BuildError> {
        let raw_edges = if self.lookback > Duration::ZERO {
            self.metrics
                .query_topology_edges_lookback(opts, self.lookback)
                .await?
        } else {
            self.metrics.query_topology_edges(opts).await?
        };

        let mut errors = Vec::new();

        let (health_res, latency_res, status_res, detail_res, alerts_res) = tokio::join!(
            self.metrics.query_health_state(opts),
            self.metrics.query_avg_latency(opts),
            self.metrics.query_dependency_status(opts),
            self.metrics.query_dependency_status_detail(opts),
            self.fetch_alerts(opts),
        );

        let health = optional(health_res, "health state", &mut errors);
        let avg_latency = optional(latency_res, "avg latency", &mut errors);
        let dep_status = optional(status_res, "dependency status", &mut errors);
        let dep_detail = optional(detail_res, "dependency status detail", &mut errors);
        let fetched_alerts = match alerts_res {
            Ok(alerts) => alerts,
            Err(msg) => {
                warn!(error = %msg, "failed to fetch alerts, continuing without");
                errors.push(msg);
                Vec::new()
            }
        };

        // In lookback mode the health query defines which edges are still
        // live; lookback edges absent from it are stale.
        let current_keys: Option<HashSet<EdgeKey>> = (self.lookback > Duration::ZERO)
            .then(|| health.keys().cloned().collect());

        let (mut nodes, mut edges, dep_lookup) = self.build_graph(
            &raw_edges,
            &health,
            &avg_latency,
            current_keys.as_ref(),
            &dep_status,
            &dep_detail,
        );

        let alert_infos = self.enrich_with_alerts(&mut nodes, &mut edges, fetched_alerts, &dep_lookup);

        let meta = TopologyMeta {
            cached_at: Utc::now(),
            ttl_seconds: self.ttl.as_secs(),
            node_count: nodes.len(),
            edge_count: edges.len(),
            partial: !errors.is_empty(),
            errors,
            time: opts.time,
            is_history: opts.time.is_some(),
        };

        Ok(TopologyResponse {
            nodes,
            edges,
            alerts: alert_infos,
            meta,
        })
    }

    pub async fn query_instances(&self, service: &str) -> MetricsResult<Vec<Instance>> {
        self.metrics.query_instances(service).await
    }

    /// Live mode pulls AlertManager; history mode reconstructs firing
    /// alerts from the `ALERTS` metric at the requested instant.
    async fn fetch_alerts(&self, opts: &QueryOptions) -> Result<Vec<Alert>, String> {
        if let Some(t) = opts.time {
            return match self.metrics.query_historical_alerts(t).await {
                Ok(hist) => Ok(historical_to_alerts(hist)),
                Err(e) => Err(format!("historical alerts: {e}")),
            };
        }
        match &self.alerts {
            Some(am) => am
                .fetch_alerts()
                .await
                .map_err(|e| format!("alerts: {e}")),
            None => Ok(Vec::new()),
        }
    }

    fn build_graph(
        &self,
        raw_edges: &[TopologyEdge],
        health: &HashMap<EdgeKey, f64>,
        avg_latency: &HashMap<EdgeKey, f64>,
        current_keys: Option<&HashSet<EdgeKey>>,
        dep_status: &HashMap<EdgeKey, String>,
        dep_detail: &HashMap<EdgeKey, String>,
    ) -> (Vec<Node>, Vec<Edge>, HashMap<(String, String), EdgeKey>) {
        // First pass: every source name is a known service.
        let service_names: HashSet<&str> = raw_edges.iter().map(|e| e.name.as_str()).collect();

        // A dependency whose name matches a known service links to that
        // service node, producing a connected graph. Anything else gets a
        // host:port endpoint node.
        let resolve_target = |e: &TopologyEdge| -> String {
            if service_names.contains(e.dependency.as_str()) {
                e.dependency.clone()
            } else {
                format!("{}:{}", e.host, e.port)
            }
        };

        struct NodeInfo {
            kind: String,
            namespace: String,
            group: String,
            host: String,
            port: String,
            deps: HashSet<String>,
        }

        let mut node_order: Vec<String> = Vec::new();
        let mut node_map: HashMap<String, NodeInfo> = HashMap::new();

        // Unique edges keyed by {name, host, port}; the last raw occurrence
        // wins on non-key fields.
        let mut edge_order: Vec<EdgeKey> = Vec::new();
        let mut edge_map: HashMap<EdgeKey, TopologyEdge> = HashMap::new();

        // Reverse lookup for the alert overlay: alerts carry the dependency
        // by name, not by endpoint.
        let mut dep_lookup: HashMap<(String, String), EdgeKey> = HashMap::new();

        for e in raw_edges {
            let key = e.key();
            if !edge_map.contains_key(&key) {
                edge_order.push(key.clone());
            }
            edge_map.insert(key.clone(), e.clone());
            dep_lookup.insert((e.name.clone(), e.dependency.clone()), key);

            let target_id = resolve_target(e);

            // Source node; namespace and group stick from the first occurrence.
            let info = node_map.entry(e.name.clone()).or_insert_with(|| {
                node_order.push(e.name.clone());
                NodeInfo {
                    kind: "service".to_string(),
                    namespace: e.namespace.clone(),
                    group: e.group.clone(),
                    host: String::new(),
                    port: String::new(),
                    deps: HashSet::new(),
                }
            });
            info.deps.insert(target_id.clone());

            // Target node, unless the dependency resolved to a known service.
            if !service_names.contains(e.dependency.as_str()) {
                node_map.entry(target_id.clone()).or_insert_with(|| {
                    node_order.push(target_id.clone());
                    NodeInfo {
                        kind: e.kind.clone(),
                        namespace: String::new(),
                        group: String::new(),
                        host: e.host.clone(),
                        port: e.port.clone(),
                        deps: HashSet::new(),
                    }
                });
            }
        }

        // Stale bookkeeping per node for the all-stale determination.
        let mut stale_outgoing: HashMap<String, usize> = HashMap::new();
        let mut total_outgoing: HashMap<String, usize> = HashMap::new();
        let mut stale_incoming: HashMap<String, usize> = HashMap::new();
        let mut total_incoming: HashMap<String, usize> = HashMap::new();

        let mut outgoing_health: HashMap<String, Vec<f64>> = HashMap::new();
        let mut incoming_health: HashMap<String, Vec<f64>> = HashMap::new();

        let mut edges = Vec::with_capacity(edge_order.len());
        for key in &edge_order {
            let Some(raw) = edge_map.get(key) else { continue };
            let target_id = resolve_target(raw);

            let stale = current_keys.is_some_and(|keys| !keys.contains(key));
            if stale {
                edges.push(Edge {
                    source: raw.name.clone(),
                    target: target_id.clone(),
                    kind: raw.kind.clone(),
                    latency: String::new(),
                    latency_raw: 0.0,
                    health: -1.0,
                    state: "unknown".to_string(),
                    critical: raw.critical,
                    stale: true,
                    grafana_url: self.link_grafana_url(&raw.dependency, &raw.host, &raw.port),
                    ..Default::default()
                });

                *stale_outgoing.entry(raw.name.clone()).or_default() += 1;
                *total_outgoing.entry(raw.name.clone()).or_default() += 1;
                *stale_incoming.entry(target_id.clone()).or_default() += 1;
                *total_incoming.entry(target_id).or_default() += 1;
                continue;
            }

            let h = health.get(key).copied().unwrap_or(1.0);
            let lat = avg_latency
                .get(key)
                .copied()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);

            let state = if h == 0.0 { "down" } else { "ok" };

            edges.push(Edge {
                source: raw.name.clone(),
                target: target_id.clone(),
                kind: raw.kind.clone(),
                latency: format_latency(lat),
                latency_raw: lat,
                health: h,
                state: state.to_string(),
                critical: raw.critical,
                status: dep_status.get(key).cloned().unwrap_or_default(),
                detail: dep_detail.get(key).cloned().unwrap_or_default(),
                grafana_url: self.link_grafana_url(&raw.dependency, &raw.host, &raw.port),
                ..Default::default()
            });

            outgoing_health.entry(raw.name.clone()).or_default().push(h);
            incoming_health.entry(target_id.clone()).or_default().push(h);
            *total_outgoing.entry(raw.name.clone()).or_default() += 1;
            *total_incoming.entry(target_id).or_default() += 1;
        }

        let mut nodes = Vec::with_capacity(node_order.len());
        for id in &node_order {
            let Some(info) = node_map.get(id) else { continue };

            let (state, stale) = if info.kind == "service" {
                let total = total_outgoing.get(id).copied().unwrap_or(0);
                let stale_count = stale_outgoing.get(id).copied().unwrap_or(0);
                if total > 0 && stale_count == total {
                    ("down".to_string(), true)
                } else {
                    (
                        calc_service_state(
                            outgoing_health.get(id).map_or(&[][..], Vec::as_slice),
                        ),
                        false,
                    )
                }
            } else {
                let total = total_incoming.get(id).copied().unwrap_or(0);
                let stale_count = stale_incoming.get(id).copied().unwrap_or(0);
                if total > 0 && stale_count == total {
                    ("down".to_string(), true)
                } else {
                    (
                        calc_dependency_state(
                            incoming_health.get(id).map_or(&[][..], Vec::as_slice),
                        ),
                        false,
                    )
                }
            };

            let label = if info.kind != "service" && !info.host.is_empty() {
                info.host.clone()
            } else {
                id.clone()
            };

            let grafana_url = if info.kind == "service" {
                self.service_grafana_url(id)
            } else {
                String::new()
            };

            nodes.push(Node {
                id: id.clone(),
                label,
                state,
                kind: info.kind.clone(),
                namespace: info.namespace.clone(),
                group: info.group.clone(),
                host: info.host.clone(),
                port: info.port.clone(),
                dependency_count: info.deps.len(),
                stale,
                grafana_url,
                ..Default::default()
            });
        }

        (nodes, edges, dep_lookup)
    }

    /// Applies alert-based state overrides and severity decoration, then
    /// recomputes the state of services whose edges the overlay touched.
    fn enrich_with_alerts(
        &self,
        nodes: &mut [Node],
        edges: &mut [Edge],
        fetched: Vec<Alert>,
        dep_lookup: &HashMap<(String, String), EdgeKey>,
    ) -> Vec<AlertInfo> {
        if fetched.is_empty() {
            return Vec::new();
        }

        let severity_priority: HashMap<&str, usize> = self
            .severity_levels
            .iter()
            .enumerate()
            .map(|(i, level)| (level.value.as_str(), i))
            .collect();

        let edge_idx: HashMap<(String, String), usize> = edges
            .iter()
            .enumerate()
            .map(|(i, e)| ((e.source.clone(), e.target.clone()), i))
            .collect();
        let node_idx: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut node_alert_counts: HashMap<String, usize> = HashMap::new();
        let mut node_worst_severity: HashMap<String, usize> = HashMap::new();
        let mut edge_worst_severity: HashMap<usize, usize> = HashMap::new();
        // Services where an alert actually overrode an edge state; only
        // these get their node state recomputed.
        let mut overridden_services: HashSet<String> = HashSet::new();

        let mut alert_infos = Vec::with_capacity(fetched.len());
        for a in &fetched {
            alert_infos.push(AlertInfo {
                alertname: a.alertname.clone(),
                service: a.service.clone(),
                dependency: a.dependency.clone(),
                severity: a.severity.clone(),
                state: a.state.clone(),
                since: a.since.clone(),
                summary: a.summary.clone(),
            });

            *node_alert_counts.entry(a.service.clone()).or_default() += 1;
            if let Some(&pri) = severity_priority.get(a.severity.as_str()) {
                node_worst_severity
                    .entry(a.service.clone())
                    .and_modify(|cur| *cur = (*cur).min(pri))
                    .or_insert(pri);
            }

            // Map (service, dependency name) back to the edge. Absent
            // lookups (historical alerts, unknown pairs) decorate nothing.
            let Some(key) = dep_lookup.get(&(a.service.clone(), a.dependency.clone())) else {
                continue;
            };

            // Endpoint target first, then the dependency name for
            // service-to-service edges.
            let endpoint = format!("{}:{}", key.host, key.port);
            let idx = edge_idx
                .get(&(a.service.clone(), endpoint))
                .or_else(|| edge_idx.get(&(a.service.clone(), a.dependency.clone())));
            let Some(&idx) = idx else { continue };

            edges[idx].alert_count += 1;
            if let Some(&pri) = severity_priority.get(a.severity.as_str()) {
                edge_worst_severity
                    .entry(idx)
                    .and_modify(|cur| *cur = (*cur).min(pri))
                    .or_insert(pri);
            }

            // Alert-sourced state is authoritative over sampled health.
            match a.alertname.as_str() {
                "DependencyDown" => {
                    edges[idx].state = "down".to_string();
                    edges[idx].health = 0.0;
                    overridden_services.insert(a.service.clone());
                }
                "DependencyDegraded" => {
                    if edges[idx].state != "down" {
                        edges[idx].state = "degraded".to_string();
                    }
                    overridden_services.insert(a.service.clone());
                }
                _ => {}
            }
        }

        for (idx, pri) in edge_worst_severity {
            if let Some(level) = self.severity_levels.get(pri) {
                edges[idx].alert_severity = level.value.clone();
            }
        }

        for (id, count) in node_alert_counts {
            if let Some(&idx) = node_idx.get(&id) {
                nodes[idx].alert_count = count;
            }
        }
        for (id, pri) in node_worst_severity {
            if let Some(&idx) = node_idx.get(&id) {
                if let Some(level) = self.severity_levels.get(pri) {
                    nodes[idx].alert_severity = level.value.clone();
                }
            }
        }

        if !overridden_services.is_empty() {
            let mut per_source: HashMap<&str, Vec<f64>> = HashMap::new();
            for e in edges.iter() {
                per_source.entry(e.source.as_str()).or_default().push(e.health);
            }
            for id in &overridden_services {
                if let Some(&idx) = node_idx.get(id) {
                    nodes[idx].state =
                        calc_service_state(per_source.get(id.as_str()).map_or(&[][..], Vec::as_slice));
                }
            }
        }

        alert_infos
    }

    fn service_grafana_url(&self, name: &str) -> String {
        if self.grafana.base_url.is_empty() || self.grafana.service_status_uid.is_empty() {
            return String::new();
        }
        format!(
            "{}/d/{}?var-service={}",
            self.grafana.base_url,
            self.grafana.service_status_uid,
            query_escape(name)
        )
    }

    fn link_grafana_url(&self, dependency: &str, host: &str, port: &str) -> String {
        if self.grafana.base_url.is_empty() || self.grafana.link_status_uid.is_empty() {
            return String::new();
        }
        format!(
            "{}/d/{}?var-dependency={}&var-host={}&var-port={}",
            self.grafana.base_url,
            self.grafana.link_status_uid,
            query_escape(dependency),
            query_escape(host),
            query_escape(port)
        )
    }
}

fn optional<T: Default>(
    res: MetricsResult<T>,
    component: &str,
    errors: &mut Vec<String>,
) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            warn!(component, error = %e, "optional topology query failed, using defaults");
            errors.push(format!("{component}: {e}"));
            T::default()
        }
    }
}

/// Historical alerts carry no dependency label, so they decorate service
/// nodes but never edges.
fn historical_to_alerts(hist: Vec<HistoricalAlert>) -> Vec<Alert> {
    hist.into_iter()
        .map(|h| Alert {
            alertname: h.alert_name,
            service: h.service,
            dependency: String::new(),
            severity: h.severity,
            state: "firing".to_string(),
            since: String::new(),
            summary: String::new(),
        })
        .collect()
}

/// Service nodes reflect local observation only: any failing edge means
/// degraded. "down" is reserved for fully stale services; path-level
/// impact is the cascade engine's job.
fn calc_service_state(healths: &[f64]) -> String {
    if healths.is_empty() {
        return "unknown".to_string();
    }
    if healths.iter().any(|&h| h == 0.0) {
        return "degraded".to_string();
    }
    "ok".to_string()
}

/// Dependency nodes aggregate what every caller observes.
fn calc_dependency_state(healths: &[f64]) -> String {
    if healths.is_empty() {
        return "unknown".to_string();
    }
    let all_healthy = healths.iter().all(|&h| h != 0.0);
    let all_down = healths.iter().all(|&h| h == 0.0);
    match (all_healthy, all_down) {
        (true, _) => "ok".to_string(),
        (_, true) => "down".to_string(),
        _ => "degraded".to_string(),
    }
}

/// Renders seconds as a human-readable latency.
pub fn format_latency(seconds: f64) -> String {
    if seconds == 0.0 {
        "0ms".to_string()
    } else if seconds < 0.001 {
        format!("{:.0}µs", seconds * 1_000_000.0)
    } else if seconds < 1.0 {
        format!("{:.1}ms", seconds * 1000.0)
    } else {
        format!("{seconds:.2}s")
    }
}

fn query_escape(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_latency_bands() {
        assert_eq!(format_latency(0.0), "0ms");
        assert_eq!(format_latency(0.000_5), "500µs");
        assert_eq!(format_latency(0.005_2), "5.2ms");
        assert_eq!(format_latency(0.25), "250.0ms");
        assert_eq!(format_latency(1.5), "1.50s");
    }

    #[test]
    fn service_state_rule() {
        assert_eq!(calc_service_state(&[]), "unknown");
        assert_eq!(calc_service_state(&[1.0, 1.0]), "ok");
        assert_eq!(calc_service_state(&[1.0, 0.0]), "degraded");
        assert_eq!(calc_service_state(&[0.0]), "degraded");
    }

    #[test]
    fn dependency_state_rule() {
        assert_eq!(calc_dependency_state(&[]), "unknown");
        assert_eq!(calc_dependency_state(&[1.0, 1.0]), "ok");
        assert_eq!(calc_dependency_state(&[0.0, 0.0]), "down");
        assert_eq!(calc_dependency_state(&[1.0, 0.0]), "degraded");
    }

    #[test]
    fn historical_alerts_never_carry_a_dependency() {
        let alerts = historical_to_alerts(vec![HistoricalAlert {
            alert_name: "DependencyDown".into(),
            namespace: "prod".into(),
            service: "svc-a".into(),
            severity: "critical".into(),
        }]);
        assert_eq!(alerts[0].state, "firing");
        assert!(alerts[0].dependency.is_empty());
    }

    #[test]
    fn query_escape_escapes_reserved_characters() {
        assert_eq!(query_escape("svc a&b"), "svc+a%26b");
    }
}
