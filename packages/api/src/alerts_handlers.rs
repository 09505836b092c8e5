// ABOUTME: Handler for /api/v1/alerts: wrapped list with severity counts

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use depscope_alerts::Alert;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct AlertsResponse {
    alerts: Vec<Alert>,
    meta: AlertsMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertsMeta {
    total: usize,
    by_severity: BTreeMap<String, usize>,
    fetched_at: String,
}

/// GET /api/v1/alerts. Counts are keyed by the configured severity
/// levels; an absent alerts backend yields an empty 200.
pub async fn get_alerts(State(state): State<AppState>) -> ApiResult<Response> {
    let fetched = match &state.alerts {
        Some(am) => am
            .fetch_alerts()
            .await
            .map_err(|e| ApiError::Upstream(format!("failed to fetch alerts: {e}")))?,
        None => Vec::new(),
    };

    let mut by_severity: BTreeMap<String, usize> = state
        .severity_levels
        .iter()
        .map(|level| (level.value.clone(), 0))
        .collect();
    for a in &fetched {
        if let Some(count) = by_severity.get_mut(&a.severity) {
            *count += 1;
        }
    }

    let resp = AlertsResponse {
        meta: AlertsMeta {
            total: fetched.len(),
            by_severity,
            fetched_at: Utc::now().to_rfc3339(),
        },
        alerts: fetched,
    };
    Ok(Json(resp).into_response())
}
