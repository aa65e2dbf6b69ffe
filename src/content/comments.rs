/// Comments on videos
use crate::{
    auth::require_ownership,
    content::{fetch, fetch_visible_video, required_text},
    db::{
        models::{from_document, to_document, Comment, NewComment, ReactionKind},
        Collection, DocumentStore, Filter, ObjectId, UpdateOp,
    },
    error::{ApiError, ApiResult},
    view::{CommentView, Join, PagePlan, ViewComposer, ViewQuery},
};
use std::sync::Arc;

pub struct CommentManager {
    store: Arc<dyn DocumentStore>,
    views: Arc<ViewComposer>,
}

impl CommentManager {
    pub fn new(store: Arc<dyn DocumentStore>, views: Arc<ViewComposer>) -> Self {
        Self { store, views }
    }

    /// Newest-first comments on a video
    pub async fn list(&self, raw_video_id: &str, page: PagePlan, viewer: Option<&ObjectId>) -> ApiResult<Vec<CommentView>> {
        let video_id = ObjectId::parse_param(raw_video_id, "video")?;
        fetch_visible_video(self.store.as_ref(), &video_id, viewer).await?;

        let query = ViewQuery::new(Collection::Comments, Filter::eq("video", video_id))
            .newest_first()
            .paged(page);

        let mut joins = vec![Join::owner("owner")];
        joins.extend(Join::reactions(ReactionKind::Comment, viewer.copied()));

        self.views.compose_as(&query, &joins).await
    }

    pub async fn add(&self, caller: &ObjectId, raw_video_id: &str, content: Option<&str>) -> ApiResult<Comment> {
        let video_id = ObjectId::parse_param(raw_video_id, "video")?;
        let content = required_text(content, "Comment content is required")?;

        fetch_visible_video(self.store.as_ref(), &video_id, Some(caller)).await?;

        let doc = to_document(&NewComment {
            content,
            video: video_id,
            owner: *caller,
        })?;
        let comment: Comment = from_document(self.store.create(Collection::Comments, doc).await?)?;

        tracing::info!(comment = %comment.id, video = %video_id, "Comment added");
        Ok(comment)
    }

    pub async fn update(&self, caller: &ObjectId, raw_comment_id: &str, content: Option<&str>) -> ApiResult<Comment> {
        let comment_id = ObjectId::parse_param(raw_comment_id, "comment")?;
        let content = required_text(content, "Comment content is required")?;

        let comment: Comment = fetch(self.store.as_ref(), Collection::Comments, &comment_id, "Comment").await?;
        require_ownership(&comment.owner, caller, "edit this comment")?;

        let updated = self
            .store
            .update_by_id(Collection::Comments, &comment_id, &[UpdateOp::set("content", content)])
            .await?
            .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

        Ok(from_document(updated)?)
    }

    pub async fn delete(&self, caller: &ObjectId, raw_comment_id: &str) -> ApiResult<()> {
        let comment_id = ObjectId::parse_param(raw_comment_id, "comment")?;

        let comment: Comment = fetch(self.store.as_ref(), Collection::Comments, &comment_id, "Comment").await?;
        require_ownership(&comment.owner, caller, "delete this comment")?;

        self.store
            .delete_by_id(Collection::Comments, &comment_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;
        self.store
            .delete_many(
                Collection::Likes,
                &Filter::all_of(vec![
                    Filter::eq("kind", ReactionKind::Comment.as_str()),
                    Filter::eq("target", comment_id),
                ]),
            )
            .await?;

        tracing::info!(comment = %comment_id, "Comment deleted");
        Ok(())
    }
}
