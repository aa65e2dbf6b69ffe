/// Health check endpoint
use crate::{api::response::ApiResponse, context::AppContext};
use axum::{routing::get, Router};

pub fn routes() -> Router<AppContext> {
    Router::new().route("/healthcheck", get(healthcheck))
}

/// Liveness only; storage problems surface on the requests that hit them
pub async fn healthcheck() -> ApiResponse<()> {
    ApiResponse::ok((), "OK")
}
