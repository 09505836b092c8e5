// ABOUTME: Handlers for /api/v1/topology and /api/v1/instances
// ABOUTME: Owns the ETag short-circuit for unfiltered live requests

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use depscope_metrics::QueryOptions;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TopologyParams {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub time: String,
}

/// Parses an optional RFC3339 query parameter.
pub fn parse_time_param(raw: &str) -> ApiResult<Option<DateTime<Utc>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|_| ApiError::bad_request("invalid time parameter: must be RFC3339 format"))
}

/// GET /api/v1/topology. Only unfiltered live requests participate in
/// the cache and ETag discipline; filtered and historical requests
/// always build fresh and never set an ETag.
pub async fn get_topology(
    State(state): State<AppState>,
    Query(params): Query<TopologyParams>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let time = parse_time_param(&params.time)?;
    let opts = QueryOptions {
        namespace: params.namespace.clone(),
        group: params.group.clone(),
        time,
    };
    let unfiltered_live = params.namespace.is_empty() && params.group.is_empty() && time.is_none();

    if unfiltered_live {
        if let Some((cached, etag)) = state.cache.get_with_etag().await {
            let client_etag = headers
                .get(header::IF_NONE_MATCH)
                .and_then(|v| v.to_str().ok());
            if client_etag == Some(etag.as_str()) {
                return Ok(StatusCode::NOT_MODIFIED.into_response());
            }
            return Ok(with_etag(Json(&*cached).into_response(), &etag));
        }
    }

    let built = state.builder.build(&opts).await?;

    if unfiltered_live {
        let etag = state.cache.set(built.clone()).await;
        Ok(with_etag(Json(built).into_response(), &etag))
    } else {
        Ok(Json(built).into_response())
    }
}

fn with_etag(mut resp: Response, etag: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(etag) {
        resp.headers_mut().insert(header::ETAG, value);
    }
    resp
}

#[derive(Debug, Deserialize)]
pub struct InstancesParams {
    #[serde(default)]
    pub service: String,
}

/// GET /api/v1/instances?service=<name>
pub async fn get_instances(
    State(state): State<AppState>,
    Query(params): Query<InstancesParams>,
) -> ApiResult<Response> {
    if params.service.is_empty() {
        return Err(ApiError::bad_request(
            "missing required query parameter: service",
        ));
    }

    let instances = state
        .builder
        .query_instances(&params.service)
        .await
        .map_err(|e| ApiError::Upstream(format!("failed to fetch instances: {e}")))?;

    Ok(Json(instances).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_param_parsing() {
        assert_eq!(parse_time_param("").unwrap(), None);
        let t = parse_time_param("2024-05-01T12:00:00Z").unwrap().unwrap();
        assert_eq!(t.timestamp(), 1_714_564_800);
        assert!(parse_time_param("yesterday").is_err());
    }
}
