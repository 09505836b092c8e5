use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node in the topology graph: either a reporting service or a backend
/// dependency reached by at least one service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub label: String,
    /// "ok", "degraded", "down", or "unknown".
    pub state: String,
    /// "service" for reporters, otherwise the dependency type.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub group: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub host: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub port: String,
    pub dependency_count: usize,
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub alert_count: usize,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub alert_severity: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub grafana_url: String,
}

/// A directed dependency edge. The source is always a service node;
/// the target is a service node or a `host:port` dependency node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable latency, e.g. "5.2ms". Empty for stale edges.
    pub latency: String,
    pub latency_raw: f64,
    /// 0 or 1; -1 marks a stale edge.
    pub health: f64,
    pub state: String,
    pub critical: bool,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub detail: String,
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub alert_count: usize,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub alert_severity: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub grafana_url: String,
}

/// A flattened view of one active alert, as exposed in the response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertInfo {
    pub alertname: String,
    pub service: String,
    pub dependency: String,
    pub severity: String,
    pub state: String,
    pub since: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyMeta {
    pub cached_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub partial: bool,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time: Option<DateTime<Utc>>,
    pub is_history: bool,
}

/// The complete topology API response. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyResponse {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub alerts: Vec<AlertInfo>,
    pub meta: TopologyMeta,
}

/// One alert severity level. Order in the configured list defines
/// priority: index 0 is the worst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityLevel {
    pub value: String,
    pub color: String,
}

impl SeverityLevel {
    pub fn new(value: &str, color: &str) -> Self {
        Self {
            value: value.to_string(),
            color: color.to_string(),
        }
    }
}

/// Default severity ordering used when none is configured.
pub fn default_severity_levels() -> Vec<SeverityLevel> {
    vec![
        SeverityLevel::new("critical", "#f44336"),
        SeverityLevel::new("warning", "#ff9800"),
        SeverityLevel::new("info", "#2196f3"),
    ]
}

/// Grafana deep-link settings consumed by the graph builder.
#[derive(Debug, Clone, Default)]
pub struct GrafanaConfig {
    pub base_url: String,
    pub service_status_uid: String,
    pub link_status_uid: String,
}
