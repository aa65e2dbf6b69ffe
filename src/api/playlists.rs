/// Playlist endpoints
use crate::{
    api::response::ApiResponse,
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    db::models::Playlist,
    error::ApiResult,
    view::{PageParams, PlaylistSummary, PlaylistView},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct PlaylistBody {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/playlist", post(create_playlist))
        .route(
            "/playlist/:playlist_id",
            get(get_playlist).patch(update_playlist).delete(delete_playlist),
        )
        .route("/playlist/add/:video_id/:playlist_id", patch(add_video))
        .route("/playlist/remove/:video_id/:playlist_id", patch(remove_video))
        .route("/playlist/user/:user_id", get(user_playlists))
}

pub async fn create_playlist(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(body): Json<PlaylistBody>,
) -> ApiResult<ApiResponse<Playlist>> {
    let playlist = ctx
        .playlist_manager
        .create(auth.account_id(), body.name.as_deref(), body.description.as_deref())
        .await?;

    Ok(ApiResponse::created(playlist, "Playlist created successfully"))
}

pub async fn get_playlist(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthContext,
    Path(playlist_id): Path<String>,
) -> ApiResult<ApiResponse<PlaylistView>> {
    let playlist = ctx
        .playlist_manager
        .get(&playlist_id, viewer.viewer_id().as_ref())
        .await?;
    Ok(ApiResponse::ok(playlist, "Playlist fetched successfully"))
}

pub async fn update_playlist(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(playlist_id): Path<String>,
    Json(body): Json<PlaylistBody>,
) -> ApiResult<ApiResponse<Playlist>> {
    let playlist = ctx
        .playlist_manager
        .update(
            auth.account_id(),
            &playlist_id,
            body.name.as_deref(),
            body.description.as_deref(),
        )
        .await?;

    Ok(ApiResponse::ok(playlist, "Playlist updated successfully"))
}

pub async fn delete_playlist(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(playlist_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    ctx.playlist_manager.delete(auth.account_id(), &playlist_id).await?;
    Ok(ApiResponse::ok((), "Playlist deleted successfully"))
}

pub async fn add_video(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> ApiResult<ApiResponse<Playlist>> {
    let playlist = ctx
        .playlist_manager
        .add_video(auth.account_id(), &video_id, &playlist_id)
        .await?;

    Ok(ApiResponse::ok(playlist, "Video added to playlist"))
}

pub async fn remove_video(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((video_id, playlist_id)): Path<(String, String)>,
) -> ApiResult<ApiResponse<Playlist>> {
    let playlist = ctx
        .playlist_manager
        .remove_video(auth.account_id(), &video_id, &playlist_id)
        .await?;

    Ok(ApiResponse::ok(playlist, "Video removed from playlist"))
}

pub async fn user_playlists(
    State(ctx): State<AppContext>,
    Path(user_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Vec<PlaylistSummary>>> {
    let playlists = ctx.playlist_manager.list_by_user(&user_id, page.plan()).await?;
    Ok(ApiResponse::ok(playlists, "Playlists fetched successfully"))
}
