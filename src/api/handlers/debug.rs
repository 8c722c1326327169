use crate::api::{
    errors::{ApiError, ErrorMessage},
    state::AppState,
};
use axum::{
    extract::Extension,
    http::{HeaderValue, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Exposition format served by `GET /debug/vars`.
pub const CONTENT_TYPE_TEXT: &str = "text/plain; version=0.0.4";

#[utoipa::path(
    get,
    path = "/debug/vars",
    responses(
        (status = 200, description = "Request counters, runtime and pool gauges", body = String, content_type = "text/plain"),
        (status = 500, description = "Metrics could not be encoded", body = ErrorMessage)
    ),
    tag = "reelgate"
)]
pub async fn debug_vars(state: Extension<Arc<AppState>>) -> Result<Response, ApiError> {
    let body = state.metrics().render()?;
    Ok((
        [(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_TEXT))],
        body,
    )
        .into_response())
}
