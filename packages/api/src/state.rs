// ABOUTME: Shared handler state and the frontend-visible config payload
// ABOUTME: Also hosts the cached-or-fresh topology snapshot helper

use std::sync::Arc;

use serde::Serialize;

use depscope_alerts::AlertSource;
use depscope_metrics::{MetricsBackend, QueryOptions};
use depscope_topology::{GraphBuilder, SeverityLevel, TopologyCache, TopologyResponse};

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub builder: Arc<GraphBuilder>,
    pub cache: Arc<TopologyCache>,
    pub metrics: Arc<dyn MetricsBackend>,
    pub alerts: Option<Arc<dyn AlertSource>>,
    pub severity_levels: Vec<SeverityLevel>,
    pub config: Arc<ConfigResponse>,
}

/// Configuration surfaced to the frontend via /api/v1/config.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigResponse {
    pub grafana: ConfigGrafana,
    pub cache: ConfigCache,
    pub auth: ConfigAuth,
    pub alerts: ConfigAlerts,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigGrafana {
    pub base_url: String,
    pub available: bool,
    pub dashboards: ConfigDashboards,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDashboards {
    pub service_status: String,
    pub link_status: String,
    pub service_list: String,
    pub services_status: String,
    pub links_status: String,
    pub cascade_overview: String,
    pub root_cause: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigCache {
    pub ttl: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigAuth {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigAlerts {
    pub enabled: bool,
    pub severity_levels: Vec<SeverityLevel>,
}

/// Returns a topology snapshot for analysis endpoints: the cached
/// response when the request is unfiltered and live, a fresh build
/// otherwise. Only unfiltered live builds are published to the cache.
pub async fn topology_snapshot(
    state: &AppState,
    opts: &QueryOptions,
) -> ApiResult<Arc<TopologyResponse>> {
    let unfiltered_live =
        opts.namespace.is_empty() && opts.group.is_empty() && opts.time.is_none();

    if unfiltered_live {
        if let Some(cached) = state.cache.get().await {
            return Ok(cached);
        }
    }

    let built = state.builder.build(opts).await.map_err(ApiError::from)?;
    if unfiltered_live {
        state.cache.set(built.clone()).await;
    }
    Ok(Arc::new(built))
}
