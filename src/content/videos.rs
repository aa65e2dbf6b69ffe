/// Video catalogue
use crate::{
    auth::require_ownership,
    blob_store::{delete_quietly, BlobStore},
    content::{fetch, fetch_visible_video, required_text, visible_to},
    db::{
        models::{from_document, to_document, Account, Comment, NewVideo, ReactionKind, Video},
        Collection, DocumentStore, Filter, ObjectId, UpdateOp,
    },
    error::{ApiError, ApiResult},
    view::{Join, VideoListParams, VideoView, ViewComposer, ViewQuery},
};
use serde_json::Value;
use std::{path::PathBuf, sync::Arc};

/// Fields of a new upload; files are local temporary paths
#[derive(Debug, Default)]
pub struct PublishVideo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_file: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct UpdateVideo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<PathBuf>,
}

pub struct VideoManager {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    views: Arc<ViewComposer>,
}

impl VideoManager {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>, views: Arc<ViewComposer>) -> Self {
        Self { store, blobs, views }
    }

    /// Paged, searchable listing with owner summaries
    pub async fn list(&self, params: &VideoListParams, viewer: Option<&ObjectId>) -> ApiResult<Vec<VideoView>> {
        let plan = params.plan()?;

        let query = ViewQuery::new(Collection::Videos, Filter::all_of(vec![plan.filter, visible_to(viewer)]))
            .sorted(plan.sort)
            .paged(plan.page);

        self.views.compose_as(&query, &[Join::owner("owner")]).await
    }

    pub async fn publish(&self, owner: &Account, input: PublishVideo) -> ApiResult<Video> {
        let title = required_text(input.title.as_deref(), "Title and description are required")?;
        let description = required_text(input.description.as_deref(), "Title and description are required")?;
        let video_path = input
            .video_file
            .ok_or_else(|| ApiError::InvalidInput("Video file is required".to_string()))?;
        let thumbnail_path = input
            .thumbnail
            .ok_or_else(|| ApiError::InvalidInput("Thumbnail is required".to_string()))?;

        let video_blob = self.blobs.store(&video_path).await?;
        let thumbnail_blob = match self.blobs.store(&thumbnail_path).await {
            Ok(blob) => blob,
            Err(e) => {
                delete_quietly(self.blobs.as_ref(), &video_blob.url).await;
                return Err(e);
            }
        };

        let new_video = NewVideo {
            video_file: video_blob.url.clone(),
            thumbnail: thumbnail_blob.url.clone(),
            title,
            description,
            duration: video_blob.duration_seconds.map_or(0, |d| d.max(0.0).round() as u64),
            views: 0,
            is_published: true,
            owner: owner.id,
        };

        let created = match self.store.create(Collection::Videos, to_document(&new_video)?).await {
            Ok(doc) => doc,
            Err(e) => {
                delete_quietly(self.blobs.as_ref(), &video_blob.url).await;
                delete_quietly(self.blobs.as_ref(), &thumbnail_blob.url).await;
                return Err(e.into());
            }
        };

        let video: Video = from_document(created)?;
        tracing::info!(video = %video.id, owner = %owner.id, "Video published");
        Ok(video)
    }

    /// Fetch one video, counting the view and recording it in the viewer's history
    pub async fn get(&self, raw_id: &str, viewer: Option<&ObjectId>) -> ApiResult<VideoView> {
        let video_id = ObjectId::parse_param(raw_id, "video")?;

        fetch_visible_video(self.store.as_ref(), &video_id, viewer).await?;

        self.store
            .update_by_id(Collection::Videos, &video_id, &[UpdateOp::Inc("views".to_string(), 1)])
            .await?
            .ok_or_else(|| ApiError::NotFound("Video not found".to_string()))?;

        if let Some(viewer) = viewer {
            // Re-watching moves the video to the end of the history
            let entry = Value::from(video_id);
            self.store
                .update_by_id(
                    Collection::Users,
                    viewer,
                    &[
                        UpdateOp::Pull("watchHistory".to_string(), entry.clone()),
                        UpdateOp::Push("watchHistory".to_string(), entry),
                    ],
                )
                .await?;
        }

        let mut joins = vec![Join::owner("owner")];
        joins.extend(Join::reactions(ReactionKind::Video, viewer.copied()));

        self.views
            .compose_one(&ViewQuery::by_id(Collection::Videos, &video_id), &joins)
            .await?
            .ok_or_else(|| ApiError::NotFound("Video not found".to_string()))
    }

    pub async fn update(&self, caller: &ObjectId, raw_id: &str, input: UpdateVideo) -> ApiResult<Video> {
        let video_id = ObjectId::parse_param(raw_id, "video")?;
        let title = required_text(input.title.as_deref(), "Title and description are required")?;
        let description = required_text(input.description.as_deref(), "Title and description are required")?;

        let video: Video = fetch(self.store.as_ref(), Collection::Videos, &video_id, "Video").await?;
        require_ownership(&video.owner, caller, "update this video")?;

        let mut ops = vec![UpdateOp::set("title", title), UpdateOp::set("description", description)];
        let new_thumbnail = match input.thumbnail {
            Some(path) => Some(self.blobs.store(&path).await?),
            None => None,
        };
        if let Some(blob) = &new_thumbnail {
            ops.push(UpdateOp::set("thumbnail", blob.url.as_str()));
        }

        let updated = match self.store.update_by_id(Collection::Videos, &video_id, &ops).await {
            Ok(Some(doc)) => doc,
            result => {
                // The write never landed, so the fresh upload is orphaned
                if let Some(blob) = &new_thumbnail {
                    delete_quietly(self.blobs.as_ref(), &blob.url).await;
                }
                return Err(match result {
                    Err(e) => e.into(),
                    _ => ApiError::NotFound("Video not found".to_string()),
                });
            }
        };

        if new_thumbnail.is_some() {
            delete_quietly(self.blobs.as_ref(), &video.thumbnail).await;
        }

        tracing::info!(video = %video_id, "Video updated");
        Ok(from_document(updated)?)
    }

    /// Delete a video with its likes, its comments and their likes
    pub async fn delete(&self, caller: &ObjectId, raw_id: &str) -> ApiResult<()> {
        let video_id = ObjectId::parse_param(raw_id, "video")?;

        let video: Video = fetch(self.store.as_ref(), Collection::Videos, &video_id, "Video").await?;
        require_ownership(&video.owner, caller, "delete this video")?;

        self.store
            .delete_by_id(Collection::Videos, &video_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Video not found".to_string()))?;

        let comment_ids: Vec<Value> = self
            .store
            .find(Collection::Comments, &Filter::eq("video", video_id))
            .await?
            .into_iter()
            .map(from_document::<Comment>)
            .map(|comment| comment.map(|c| Value::from(c.id)))
            .collect::<Result<_, _>>()?;

        if !comment_ids.is_empty() {
            self.store
                .delete_many(
                    Collection::Likes,
                    &Filter::all_of(vec![
                        Filter::eq("kind", ReactionKind::Comment.as_str()),
                        Filter::In("target".to_string(), comment_ids),
                    ]),
                )
                .await?;
        }
        self.store
            .delete_many(Collection::Comments, &Filter::eq("video", video_id))
            .await?;
        self.store
            .delete_many(
                Collection::Likes,
                &Filter::all_of(vec![
                    Filter::eq("kind", ReactionKind::Video.as_str()),
                    Filter::eq("target", video_id),
                ]),
            )
            .await?;

        delete_quietly(self.blobs.as_ref(), &video.video_file).await;
        delete_quietly(self.blobs.as_ref(), &video.thumbnail).await;

        tracing::info!(video = %video_id, "Video deleted");
        Ok(())
    }

    pub async fn toggle_publish(&self, caller: &ObjectId, raw_id: &str) -> ApiResult<Video> {
        let video_id = ObjectId::parse_param(raw_id, "video")?;

        let video: Video = fetch(self.store.as_ref(), Collection::Videos, &video_id, "Video").await?;
        require_ownership(&video.owner, caller, "change this video's visibility")?;

        // Conditional on the observed state so two toggles never cancel into one
        let updated = self
            .store
            .update_one(
                Collection::Videos,
                &Filter::all_of(vec![Filter::id(&video_id), Filter::eq("isPublished", video.is_published)]),
                &[UpdateOp::set("isPublished", !video.is_published)],
            )
            .await?
            .ok_or_else(|| ApiError::Conflict("Video visibility changed concurrently, retry".to_string()))?;

        tracing::info!(video = %video_id, published = !video.is_published, "Video visibility toggled");
        Ok(from_document(updated)?)
    }
}
