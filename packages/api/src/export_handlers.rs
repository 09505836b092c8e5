// ABOUTME: Handler for /api/v1/export/{format}
// ABOUTME: Streams the snapshot as a download with the right content type

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use depscope_export::{
    export_csv, export_dot, export_filename, export_json, graphviz_available, render_dot,
    DotOptions, ExportData, ExportError,
};
use depscope_metrics::QueryOptions;

use crate::error::{ApiError, ApiResult};
use crate::state::{topology_snapshot, AppState};
use crate::topology_handlers::parse_time_param;

const DEFAULT_SCALE: u32 = 2;

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub scale: String,
}

/// GET /api/v1/export/{json|csv|dot|png|svg}
pub async fn get_export(
    State(state): State<AppState>,
    Path(format): Path<String>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    if !matches!(format.as_str(), "json" | "csv" | "dot" | "png" | "svg") {
        return Err(ApiError::bad_request(format!(
            "unsupported export format: {format}"
        )));
    }

    let scope = if params.scope.is_empty() {
        "full".to_string()
    } else {
        params.scope.clone()
    };
    if scope != "full" && scope != "current" {
        return Err(ApiError::bad_request("scope must be 'full' or 'current'"));
    }

    let time = parse_time_param(&params.time)?;

    let mut opts = QueryOptions {
        time,
        ..Default::default()
    };
    if scope == "current" {
        opts.namespace = params.namespace.clone();
        opts.group = params.group.clone();
    }

    let scale = if params.scale.is_empty() {
        DEFAULT_SCALE
    } else {
        match params.scale.parse::<u32>() {
            Ok(v) if (1..=4).contains(&v) => v,
            _ => {
                return Err(ApiError::bad_request(
                    "scale must be an integer between 1 and 4",
                ))
            }
        }
    };

    // Fail fast before building the snapshot when rendering is impossible.
    if matches!(format.as_str(), "png" | "svg") && !graphviz_available() {
        return Err(ApiError::RendererUnavailable(
            "Graphviz is not installed on the server".to_string(),
        ));
    }

    let snapshot = topology_snapshot(&state, &opts).await?;

    let mut filters = HashMap::new();
    if !params.namespace.is_empty() {
        filters.insert("namespace".to_string(), params.namespace.clone());
    }
    if !params.group.is_empty() {
        filters.insert("group".to_string(), params.group.clone());
    }

    let data = ExportData::from_topology(&snapshot, &scope, filters);

    let (output, content_type, file_ext) = match format.as_str() {
        "json" => (export_json(&data).map_err(export_error)?, "application/json", "json"),
        "csv" => (export_csv(&data).map_err(export_error)?, "application/zip", "zip"),
        "dot" => (
            export_dot(&data, &DotOptions::default()).map_err(export_error)?,
            "text/vnd.graphviz",
            "dot",
        ),
        "png" | "svg" => {
            let dot = export_dot(&data, &DotOptions::default()).map_err(export_error)?;
            let rendered = render_dot(&dot, &format, scale).await.map_err(export_error)?;
            if format == "png" {
                (rendered, "image/png", "png")
            } else {
                (rendered, "image/svg+xml", "svg")
            }
        }
        _ => unreachable!("format validated above"),
    };

    let mut resp = (StatusCode::OK, output).into_response();
    let headers = resp.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    let disposition = format!(r#"attachment; filename="{}""#, export_filename(file_ext));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(resp)
}

fn export_error(err: ExportError) -> ApiError {
    match err {
        ExportError::RendererUnavailable => {
            ApiError::RendererUnavailable("Graphviz is not installed on the server".to_string())
        }
        other => ApiError::Internal(format!("export failed: {other}")),
    }
}
