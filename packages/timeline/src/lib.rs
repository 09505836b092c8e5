// ABOUTME: Converts dependency-status range queries into transition events
// ABOUTME: Classifies each transition as degradation, recovery, or change

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depscope_metrics::{EdgeKey, MetricsBackend, MetricsError};

/// A state transition detected on the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub namespace: String,
    pub from_state: String,
    pub to_state: String,
    /// "degradation", "recovery", or "change".
    pub kind: String,
}

/// Parameters for a timeline query.
#[derive(Debug, Clone)]
pub struct EventsRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub namespace: String,
}

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("invalid range: start must be before end")]
    BadRange,

    #[error("querying status range: {0}")]
    Upstream(#[from] MetricsError),
}

/// Numeric severity per status for transition classification. Higher is
/// worse; unrecognized statuses rank below everything.
fn status_severity(status: &str) -> i32 {
    match status {
        "ok" => 0,
        "timeout" => 1,
        "unhealthy" => 2,
        "connection_error" | "dns_error" | "auth_error" | "tls_error" => 3,
        "error" => 4,
        _ => -1,
    }
}

pub fn classify_transition(from: &str, to: &str) -> &'static str {
    let from_sev = status_severity(from);
    let to_sev = status_severity(to);
    if to_sev > from_sev {
        "degradation"
    } else if to_sev < from_sev {
        "recovery"
    } else {
        "change"
    }
}

/// Picks a query step balancing resolution against backend load.
pub fn auto_step(range: chrono::Duration) -> Duration {
    let hour = chrono::Duration::hours(1);
    let day = chrono::Duration::days(1);
    if range <= hour {
        Duration::from_secs(15)
    } else if range <= hour * 6 {
        Duration::from_secs(60)
    } else if range <= day {
        Duration::from_secs(5 * 60)
    } else if range <= day * 7 {
        Duration::from_secs(15 * 60)
    } else if range <= day * 30 {
        Duration::from_secs(3600)
    } else if range <= day * 90 {
        Duration::from_secs(3 * 3600)
    } else {
        Duration::from_secs(6 * 3600)
    }
}

/// Queries the dependency status metric over a range and folds each
/// edge's active status per timestamp into transition events, sorted
/// ascending by timestamp.
pub async fn query_status_transitions(
    metrics: &dyn MetricsBackend,
    req: &EventsRequest,
) -> Result<Vec<Event>, TimelineError> {
    let range = req.end - req.start;
    if range <= chrono::Duration::zero() {
        return Err(TimelineError::BadRange);
    }

    let step = auto_step(range);
    let results = metrics
        .query_status_range(req.start, req.end, step, &req.namespace)
        .await?;

    // Each edge has one series per status value; only the series sampled
    // at 1 is active at that instant.
    let mut active_at: HashMap<EdgeKey, BTreeMap<i64, String>> = HashMap::new();
    for r in &results {
        let per_edge = active_at.entry(r.key.clone()).or_default();
        for tv in &r.values {
            if tv.value == 1.0 {
                per_edge.insert(tv.timestamp.timestamp(), r.status.clone());
            }
        }
    }

    // Deterministic edge order so same-timestamp events are stable.
    let mut keys: Vec<&EdgeKey> = active_at.keys().collect();
    keys.sort_by(|a, b| {
        (&a.name, &a.host, &a.port).cmp(&(&b.name, &b.host, &b.port))
    });

    let mut events = Vec::new();
    for key in keys {
        let statuses = &active_at[key];
        let mut prev: Option<&str> = None;
        for (ts, status) in statuses {
            if let Some(prev_status) = prev {
                if prev_status != status {
                    events.push(Event {
                        timestamp: DateTime::from_timestamp(*ts, 0).unwrap_or_default(),
                        service: key.name.clone(),
                        namespace: String::new(),
                        from_state: prev_status.to_string(),
                        to_state: status.clone(),
                        kind: classify_transition(prev_status, status).to_string(),
                    });
                }
            }
            prev = Some(status);
        }
    }

    events.sort_by_key(|e| e.timestamp);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_status_classes() {
        assert_eq!(status_severity("ok"), 0);
        assert_eq!(status_severity("timeout"), 1);
        assert_eq!(status_severity("unhealthy"), 2);
        assert_eq!(status_severity("connection_error"), 3);
        assert_eq!(status_severity("dns_error"), 3);
        assert_eq!(status_severity("auth_error"), 3);
        assert_eq!(status_severity("tls_error"), 3);
        assert_eq!(status_severity("error"), 4);
        assert_eq!(status_severity("mystery"), -1);
    }

    #[test]
    fn classify_transition_directions() {
        assert_eq!(classify_transition("ok", "timeout"), "degradation");
        assert_eq!(classify_transition("error", "ok"), "recovery");
        assert_eq!(classify_transition("ok", "ok"), "change");
        assert_eq!(classify_transition("mystery", "mystery"), "change");
        // Unknown statuses rank below ok, so landing on one is a recovery.
        assert_eq!(classify_transition("ok", "mystery"), "recovery");
    }

    #[test]
    fn auto_step_bands() {
        let h = chrono::Duration::hours(1);
        let d = chrono::Duration::days(1);
        assert_eq!(auto_step(chrono::Duration::minutes(30)), Duration::from_secs(15));
        assert_eq!(auto_step(h), Duration::from_secs(15));
        assert_eq!(auto_step(h * 3), Duration::from_secs(60));
        assert_eq!(auto_step(h * 12), Duration::from_secs(300));
        assert_eq!(auto_step(d * 3), Duration::from_secs(900));
        assert_eq!(auto_step(d * 20), Duration::from_secs(3600));
        assert_eq!(auto_step(d * 60), Duration::from_secs(3 * 3600));
        assert_eq!(auto_step(d * 120), Duration::from_secs(6 * 3600));
    }
}
