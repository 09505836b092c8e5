// ABOUTME: Handler for the public /api/v1/config endpoint

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::AppState;

/// GET /api/v1/config — static frontend configuration, no auth required.
pub async fn get_config(State(state): State<AppState>) -> Response {
    Json(state.config.as_ref()).into_response()
}
