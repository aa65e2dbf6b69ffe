/// Like endpoints
use crate::{
    api::response::ApiResponse,
    auth::AuthContext,
    context::AppContext,
    db::models::ReactionKind,
    error::ApiResult,
    view::LikedVideos,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub is_liked: bool,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/likes/toggle/v/:video_id", post(toggle_video_like))
        .route("/likes/toggle/c/:comment_id", post(toggle_comment_like))
        .route("/likes/toggle/t/:tweet_id", post(toggle_tweet_like))
        .route("/likes/videos", get(liked_videos))
}

async fn toggle(ctx: &AppContext, auth: &AuthContext, kind: ReactionKind, raw_id: &str) -> ApiResult<ApiResponse<ToggleResponse>> {
    let state = ctx.reaction_toggle.toggle_param(auth.account_id(), kind, raw_id).await?;

    let message = if state.is_liked() { "Liked" } else { "Unliked" };
    Ok(ApiResponse::ok(ToggleResponse { is_liked: state.is_liked() }, message))
}

pub async fn toggle_video_like(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<ToggleResponse>> {
    toggle(&ctx, &auth, ReactionKind::Video, &video_id).await
}

pub async fn toggle_comment_like(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(comment_id): Path<String>,
) -> ApiResult<ApiResponse<ToggleResponse>> {
    toggle(&ctx, &auth, ReactionKind::Comment, &comment_id).await
}

pub async fn toggle_tweet_like(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(tweet_id): Path<String>,
) -> ApiResult<ApiResponse<ToggleResponse>> {
    toggle(&ctx, &auth, ReactionKind::Tweet, &tweet_id).await
}

pub async fn liked_videos(State(ctx): State<AppContext>, auth: AuthContext) -> ApiResult<ApiResponse<LikedVideos>> {
    let liked = ctx.reaction_toggle.liked_videos(auth.account_id()).await?;
    Ok(ApiResponse::ok(liked, "Liked videos fetched successfully"))
}
