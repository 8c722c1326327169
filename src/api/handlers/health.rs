use crate::{GIT_COMMIT_HASH, api::state::AppState};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SystemInfo {
    environment: String,
    version: String,
    commit: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    status: String,
    system_info: SystemInfo,
}

#[utoipa::path(
    get,
    path = "/v1/healthcheck",
    responses(
        (status = 200, description = "Service is available", body = Health)
    ),
    tag = "reelgate"
)]
pub async fn healthcheck(state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let health = Health {
        status: "available".to_string(),
        system_info: SystemInfo {
            environment: state.env().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: GIT_COMMIT_HASH.to_string(),
        },
    };

    let short_hash = health.system_info.commit.get(0..7).unwrap_or("");

    let mut headers = HeaderMap::new();
    match format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        health.system_info.version,
        short_hash
    )
    .parse::<HeaderValue>()
    {
        Ok(value) => {
            debug!("X-App header: {:?}", value);
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to parse X-App header: {}", err),
    }

    (headers, Json(health))
}
