// ABOUTME: Fetches active alerts from AlertManager and maps their labels
// ABOUTME: onto the (service, dependency) identities used by the graph

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AlertsError, AlertsResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A firing alert flattened to the labels the topology cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alertname: String,
    /// Source service (`job` label).
    pub service: String,
    /// Target dependency name (`dependency` label).
    pub dependency: String,
    pub severity: String,
    pub state: String,
    pub since: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub summary: String,
}

/// Source of active alerts. The graph builder consumes this trait so
/// tests can inject canned alerts.
#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn fetch_alerts(&self) -> AlertsResult<Vec<Alert>>;
}

/// Connection settings for AlertManager.
#[derive(Debug, Clone, Default)]
pub struct AlertsConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout. Zero means the 10s default.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AlertManagerClient {
    cfg: AlertsConfig,
    http: Client,
}

impl AlertManagerClient {
    pub fn new(cfg: AlertsConfig) -> AlertsResult<Self> {
        let timeout = if cfg.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            cfg.timeout
        };
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { cfg, http })
    }
}

#[async_trait]
impl AlertSource for AlertManagerClient {
    async fn fetch_alerts(&self) -> AlertsResult<Vec<Alert>> {
        if self.cfg.url.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/api/v2/alerts?active=true&silenced=false&inhibited=false",
            self.cfg.url
        );

        let mut req = self.http.get(&url);
        if !self.cfg.username.is_empty() {
            req = req.basic_auth(&self.cfg.username, Some(&self.cfg.password));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AlertsError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Vec<AmAlert> = resp.json().await?;
        Ok(map_alerts(raw))
    }
}

/// AlertManager API v2 alert entry.
#[derive(Debug, Deserialize)]
struct AmAlert {
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    annotations: HashMap<String, String>,
    #[serde(default, rename = "startsAt")]
    starts_at: String,
}

/// Keeps alerts that carry both a `job` and a `dependency` label; anything
/// else cannot be placed on the graph.
fn map_alerts(raw: Vec<AmAlert>) -> Vec<Alert> {
    raw.into_iter()
        .filter_map(|a| {
            let job = a.labels.get("job").cloned().unwrap_or_default();
            let dependency = a.labels.get("dependency").cloned().unwrap_or_default();
            if job.is_empty() || dependency.is_empty() {
                return None;
            }
            Some(Alert {
                alertname: a.labels.get("alertname").cloned().unwrap_or_default(),
                service: job,
                dependency,
                severity: a.labels.get("severity").cloned().unwrap_or_default(),
                state: "firing".to_string(),
                since: a.starts_at,
                summary: a.annotations.get("summary").cloned().unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn am_alert(labels: &[(&str, &str)]) -> AmAlert {
        AmAlert {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            annotations: HashMap::new(),
            starts_at: "2024-05-01T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn alerts_without_job_or_dependency_are_dropped() {
        let raw = vec![
            am_alert(&[("alertname", "DependencyDown"), ("job", "svc-a")]),
            am_alert(&[("alertname", "DependencyDown"), ("dependency", "pg")]),
            am_alert(&[
                ("alertname", "DependencyDown"),
                ("job", "svc-a"),
                ("dependency", "pg"),
                ("severity", "critical"),
            ]),
        ];

        let mapped = map_alerts(raw);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].service, "svc-a");
        assert_eq!(mapped[0].dependency, "pg");
        assert_eq!(mapped[0].state, "firing");
        assert_eq!(mapped[0].since, "2024-05-01T12:00:00Z");
    }

    #[tokio::test]
    async fn empty_url_yields_no_alerts_without_a_request() {
        let client = AlertManagerClient::new(AlertsConfig::default()).unwrap();
        let alerts = client.fetch_alerts().await.unwrap();
        assert!(alerts.is_empty());
    }
}
