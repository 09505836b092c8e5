// ABOUTME: Handler for /api/v1/timeline/events

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use depscope_timeline::{query_status_transitions, Event, EventsRequest, TimelineError};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TimelineParams {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Serialize)]
struct TimelineResponse {
    events: Vec<Event>,
    meta: TimelineMeta,
}

#[derive(Debug, Serialize)]
struct TimelineMeta {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    count: usize,
}

fn parse_required(raw: &str, name: &str) -> ApiResult<DateTime<Utc>> {
    if raw.is_empty() {
        return Err(ApiError::bad_request(format!(
            "missing required query parameter: {name}"
        )));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            ApiError::bad_request(format!("invalid {name} parameter: must be RFC3339 format"))
        })
}

/// GET /api/v1/timeline/events?start=...&end=...[&namespace=...]
pub async fn get_timeline_events(
    State(state): State<AppState>,
    Query(params): Query<TimelineParams>,
) -> ApiResult<Response> {
    let start = parse_required(&params.start, "start")?;
    let end = parse_required(&params.end, "end")?;

    let req = EventsRequest {
        start,
        end,
        namespace: params.namespace.clone(),
    };
    let events = query_status_transitions(state.metrics.as_ref(), &req)
        .await
        .map_err(|e| match e {
            TimelineError::BadRange => ApiError::bad_request(e.to_string()),
            TimelineError::Upstream(_) => {
                ApiError::Upstream(format!("failed to fetch timeline events: {e}"))
            }
        })?;

    let resp = TimelineResponse {
        meta: TimelineMeta {
            start,
            end,
            count: events.len(),
        },
        events,
    };
    Ok(Json(resp).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_param_validation() {
        assert!(parse_required("", "start").is_err());
        assert!(parse_required("not-a-time", "end").is_err());
        assert!(parse_required("2024-05-01T12:00:00Z", "start").is_ok());
    }
}
