/// API routes and handlers
pub mod comments;
pub mod health;
pub mod likes;
pub mod middleware;
pub mod playlists;
pub mod response;
pub mod subscriptions;
pub mod tweets;
pub mod upload;
pub mod users;
pub mod videos;

use crate::{config::ServiceConfig, context::AppContext};
use axum::{extract::DefaultBodyLimit, Router};

/// Version prefix of every API route
pub const API_PREFIX: &str = "/api/v1";

/// Build API routes. JSON bodies are capped at the JSON limit; the multipart
/// routes carry their own, larger cap.
pub fn routes(service: &ServiceConfig) -> Router<AppContext> {
    let v1 = Router::new()
        .merge(health::routes())
        .merge(users::routes(service.upload_limit))
        .merge(videos::routes(service.upload_limit))
        .merge(comments::routes())
        .merge(tweets::routes())
        .merge(likes::routes())
        .merge(playlists::routes())
        .merge(subscriptions::routes())
        .layer(DefaultBodyLimit::max(service.json_body_limit));

    Router::new().nest(API_PREFIX, v1)
}
