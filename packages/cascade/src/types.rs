use serde::{Deserialize, Serialize};

/// Analysis options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Maximum BFS depth; 0 means unlimited.
    pub max_depth: usize,
    /// Restrict results to this namespace when non-empty.
    pub namespace: String,
}

/// A terminal failure point in the dependency chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootCause {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub namespace: String,
    pub state: String,
}

/// A service impacted by a cascade failure without being down itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedService {
    pub service: String,
    pub namespace: String,
    pub depends_on: String,
    pub root_causes: Vec<String>,
}

/// One failed dependency relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub service: String,
    pub namespace: String,
    pub dependency: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub port: String,
}

/// A path from an affected service down to a root cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeChain {
    pub affected_service: String,
    pub namespace: String,
    pub depends_on: String,
    pub path: Vec<String>,
    pub depth: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_services: usize,
    pub root_cause_count: usize,
    pub affected_service_count: usize,
    pub total_failure_count: usize,
    pub max_depth: usize,
}

/// Complete cascade analysis output. All vectors are present (possibly
/// empty) so the JSON encoding never carries nulls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub root_causes: Vec<RootCause>,
    pub affected_services: Vec<AffectedService>,
    pub all_failures: Vec<Failure>,
    pub cascade_chains: Vec<CascadeChain>,
    pub summary: Summary,
}
