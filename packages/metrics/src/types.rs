use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity triple joining per-edge labelled vectors across queries.
/// Equality is byte-exact on all three labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub name: String,
    pub host: String,
    pub port: String,
}

/// A raw dependency edge discovered from the `app_dependency_health` metric.
/// Transient: lives only inside one graph build.
#[derive(Debug, Clone)]
pub struct TopologyEdge {
    pub name: String,
    pub namespace: String,
    pub group: String,
    pub dependency: String,
    pub kind: String,
    pub host: String,
    pub port: String,
    pub critical: bool,
}

impl TopologyEdge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port.clone(),
        }
    }
}

/// A single reporting instance (pod/container) of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance: String,
    pub pod: String,
    pub job: String,
    pub service: String,
}

/// A firing alert reconstructed from the `ALERTS` metric at a point in time.
/// Carries no dependency label, so it can decorate nodes but not edges.
#[derive(Debug, Clone)]
pub struct HistoricalAlert {
    pub alert_name: String,
    pub namespace: String,
    pub service: String,
    pub severity: String,
}

/// One series of a status range query: the edge it belongs to, the status
/// label it tracks, and the sampled values over the range.
#[derive(Debug, Clone)]
pub struct RangeResult {
    pub key: EdgeKey,
    pub status: String,
    pub values: Vec<TimeValue>,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Label filters and evaluation time shared by all topology queries.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub namespace: String,
    pub group: String,
    /// Evaluation timestamp for historical queries. None = live.
    pub time: Option<DateTime<Utc>>,
}
