/// Comment endpoints
use crate::{
    api::response::ApiResponse,
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    db::models::Comment,
    error::ApiResult,
    view::{CommentView, PageParams},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;

/// Body of comment and tweet writes
#[derive(Debug, Default, Deserialize)]
pub struct ContentBody {
    pub content: Option<String>,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/comments/:video_id", get(list_comments).post(add_comment))
        .route("/comments/c/:comment_id", patch(update_comment).delete(delete_comment))
}

pub async fn list_comments(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthContext,
    Path(video_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Vec<CommentView>>> {
    let comments = ctx
        .comment_manager
        .list(&video_id, page.plan(), viewer.viewer_id().as_ref())
        .await?;

    Ok(ApiResponse::ok(comments, "Comments fetched successfully"))
}

pub async fn add_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(video_id): Path<String>,
    Json(body): Json<ContentBody>,
) -> ApiResult<ApiResponse<Comment>> {
    let comment = ctx
        .comment_manager
        .add(auth.account_id(), &video_id, body.content.as_deref())
        .await?;

    Ok(ApiResponse::created(comment, "Comment added successfully"))
}

pub async fn update_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(comment_id): Path<String>,
    Json(body): Json<ContentBody>,
) -> ApiResult<ApiResponse<Comment>> {
    let comment = ctx
        .comment_manager
        .update(auth.account_id(), &comment_id, body.content.as_deref())
        .await?;

    Ok(ApiResponse::ok(comment, "Comment updated successfully"))
}

pub async fn delete_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(comment_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    ctx.comment_manager.delete(auth.account_id(), &comment_id).await?;
    Ok(ApiResponse::ok((), "Comment deleted successfully"))
}
