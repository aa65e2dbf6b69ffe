/// Video endpoints
use crate::{
    api::{response::ApiResponse, upload::UploadForm},
    auth::{AuthContext, OptionalAuthContext},
    content::videos::{PublishVideo, UpdateVideo},
    context::AppContext,
    db::models::Video,
    error::ApiResult,
    view::{VideoListParams, VideoView},
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{get, patch, post},
    Router,
};

/// `upload_limit` caps the multipart routes
pub fn routes(upload_limit: usize) -> Router<AppContext> {
    let uploads = DefaultBodyLimit::max(upload_limit);

    Router::new()
        .route("/videos", get(list_videos).merge(post(publish_video).layer(uploads)))
        .route(
            "/videos/:video_id",
            get(get_video)
                .merge(patch(update_video).layer(uploads))
                .delete(delete_video),
        )
        .route("/videos/toggle/publish/:video_id", patch(toggle_publish))
}

pub async fn list_videos(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthContext,
    Query(params): Query<VideoListParams>,
) -> ApiResult<ApiResponse<Vec<VideoView>>> {
    let videos = ctx.video_manager.list(&params, viewer.viewer_id().as_ref()).await?;
    Ok(ApiResponse::ok(videos, "Videos fetched successfully"))
}

pub async fn publish_video(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    multipart: Multipart,
) -> ApiResult<ApiResponse<Video>> {
    let form = UploadForm::collect(multipart, &ctx.config.storage.upload_tmp_location).await?;

    let video = ctx
        .video_manager
        .publish(
            &auth.account,
            PublishVideo {
                title: form.text("title"),
                description: form.text("description"),
                video_file: form.file("videoFile"),
                thumbnail: form.file("thumbnail"),
            },
        )
        .await?;

    Ok(ApiResponse::created(video, "Video published successfully"))
}

pub async fn get_video(
    State(ctx): State<AppContext>,
    viewer: OptionalAuthContext,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<VideoView>> {
    let video = ctx.video_manager.get(&video_id, viewer.viewer_id().as_ref()).await?;
    Ok(ApiResponse::ok(video, "Video fetched successfully"))
}

pub async fn update_video(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(video_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<ApiResponse<Video>> {
    let form = UploadForm::collect(multipart, &ctx.config.storage.upload_tmp_location).await?;

    let video = ctx
        .video_manager
        .update(
            auth.account_id(),
            &video_id,
            UpdateVideo {
                title: form.text("title"),
                description: form.text("description"),
                thumbnail: form.file("thumbnail"),
            },
        )
        .await?;

    Ok(ApiResponse::ok(video, "Video updated successfully"))
}

pub async fn delete_video(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    ctx.video_manager.delete(auth.account_id(), &video_id).await?;
    Ok(ApiResponse::ok((), "Video deleted successfully"))
}

pub async fn toggle_publish(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<Video>> {
    let video = ctx.video_manager.toggle_publish(auth.account_id(), &video_id).await?;
    Ok(ApiResponse::ok(video, "Publish status toggled"))
}
