// ABOUTME: Flattened export representation of a topology response
// ABOUTME: Shared by the JSON, CSV, and DOT writers

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use depscope_topology::{Edge, Node, TopologyResponse};

/// Top-level export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub version: String,
    pub timestamp: String,
    pub scope: String,
    pub filters: HashMap<String, String>,
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: String,
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub group: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: String,
    pub alerts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEdge {
    pub source: String,
    pub target: String,
    pub dependency: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub port: String,
    pub critical: bool,
    pub health: f64,
    pub status: String,
    pub detail: String,
    pub latency_ms: f64,
}

impl ExportData {
    /// Flattens a topology response for export.
    pub fn from_topology(
        resp: &TopologyResponse,
        scope: &str,
        filters: HashMap<String, String>,
    ) -> Self {
        let node_map: HashMap<&str, &Node> =
            resp.nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let nodes = resp
            .nodes
            .iter()
            .map(|n| ExportNode {
                id: n.id.clone(),
                name: n.label.clone(),
                namespace: n.namespace.clone(),
                group: n.group.clone(),
                kind: n.kind.clone(),
                state: node_state(n),
                alerts: n.alert_count,
            })
            .collect();

        let edges = resp
            .edges
            .iter()
            .map(|e| {
                let (host, port) = target_host_port(e, &node_map);
                ExportEdge {
                    source: e.source.clone(),
                    target: e.target.clone(),
                    dependency: e.target.clone(),
                    kind: e.kind.clone(),
                    host,
                    port,
                    critical: e.critical,
                    health: e.health,
                    status: e.status.clone(),
                    detail: e.detail.clone(),
                    latency_ms: e.latency_raw * 1000.0,
                }
            })
            .collect();

        Self {
            version: "1.0".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            scope: scope.to_string(),
            filters,
            nodes,
            edges,
        }
    }
}

/// Stale nodes export a dedicated "stale" state.
fn node_state(n: &Node) -> String {
    if n.stale {
        "stale".to_string()
    } else if n.state.is_empty() {
        "unknown".to_string()
    } else {
        n.state.clone()
    }
}

fn target_host_port(e: &Edge, node_map: &HashMap<&str, &Node>) -> (String, String) {
    match node_map.get(e.target.as_str()) {
        Some(target) => (target.host.clone(), target.port.clone()),
        None => (String::new(), String::new()),
    }
}

/// Timestamped download filename for an export.
pub fn export_filename(format: &str) -> String {
    let ts = Utc::now().format("%Y%m%d-%H%M%S");
    format!("depscope-topology-{ts}.{format}")
}
