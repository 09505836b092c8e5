// ABOUTME: Startup probe of the configured Grafana instance
// ABOUTME: Never fatal; feeds the grafana.available flag in /api/v1/config

use std::time::Duration;

use tracing::{info, warn};

use crate::config::GrafanaSettings;

/// Checks /api/health on the configured Grafana base URL.
pub async fn check_grafana(settings: &GrafanaSettings) -> bool {
    if settings.base_url.is_empty() {
        return false;
    }

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "building grafana probe client failed");
            return false;
        }
    };

    let url = format!("{}/api/health", settings.base_url.trim_end_matches('/'));
    let mut req = client.get(&url);
    if !settings.token.is_empty() {
        req = req.bearer_auth(&settings.token);
    } else if !settings.username.is_empty() {
        req = req.basic_auth(&settings.username, Some(&settings.password));
    }

    match req.send().await {
        Ok(resp) if resp.status().is_success() => {
            info!(url = %settings.base_url, "grafana is reachable");
            true
        }
        Ok(resp) => {
            warn!(url = %settings.base_url, status = %resp.status(), "grafana health check failed");
            false
        }
        Err(e) => {
            warn!(url = %settings.base_url, error = %e, "grafana is unreachable");
            false
        }
    }
}
