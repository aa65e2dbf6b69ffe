/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{ApiError, ApiResult, ErrorResponse},
};
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::Json,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

/// Public path the disk blob store is served under
pub const MEDIA_PATH: &str = "/media";

fn cors_layer(origin: &str) -> ApiResult<CorsLayer> {
    // Credentialed CORS cannot use a wildcard, so "*" mirrors the caller's origin
    let allow_origin = if origin.trim() == "*" {
        AllowOrigin::mirror_request()
    } else {
        let value = HeaderValue::from_str(origin.trim())
            .map_err(|e| ApiError::Config(format!("Invalid CORS origin {}: {}", origin, e)))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> ApiResult<Router> {
    let cors = cors_layer(&ctx.config.service.cors_origin)?;
    let media = ServeDir::new(&ctx.config.storage.blob_location);

    Ok(Router::new()
        .merge(crate::api::routes(&ctx.config.service))
        .nest_service(MEDIA_PATH, media)
        .with_state(ctx)
        .fallback(not_found)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http()))
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            status_code: StatusCode::NOT_FOUND.as_u16(),
            message: "Endpoint not found".to_string(),
            success: false,
        }),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> ApiResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("VideoTube listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());
    info!("   Media: {}", ctx.config.storage.media_base_url);

    let app = build_router(ctx)?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
