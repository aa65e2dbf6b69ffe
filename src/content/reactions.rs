/// Like toggling for videos, comments and tweets
use crate::{
    content::{fetch, fetch_visible_video, visible_to},
    db::{
        models::{to_document, NewLike, ReactionKind, ReactionTarget},
        Collection, Document, DocumentStore, Filter, ObjectId, Toggled,
    },
    error::ApiResult,
    view::{Join, LikedVideos, VideoSummary, ViewComposer, ViewQuery, VIDEO_SUMMARY_FIELDS},
};
use serde::Serialize;
use std::sync::Arc;

/// Reaction state after a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    Liked,
    Unliked,
}

impl ToggleState {
    pub fn is_liked(&self) -> bool {
        matches!(self, ToggleState::Liked)
    }
}

/// Parse a request-supplied target id for the given kind
pub fn parse_target(kind: ReactionKind, raw_id: &str) -> ApiResult<ReactionTarget> {
    let id = ObjectId::parse_param(raw_id, kind.as_str())?;
    Ok(ReactionTarget::from_parts(kind, id))
}

fn target_collection(target: &ReactionTarget) -> (Collection, &'static str) {
    match target {
        ReactionTarget::Video(_) => (Collection::Videos, "Video"),
        ReactionTarget::Comment(_) => (Collection::Comments, "Comment"),
        ReactionTarget::Tweet(_) => (Collection::Tweets, "Tweet"),
    }
}

pub struct ReactionToggle {
    store: Arc<dyn DocumentStore>,
    views: Arc<ViewComposer>,
}

impl ReactionToggle {
    pub fn new(store: Arc<dyn DocumentStore>, views: Arc<ViewComposer>) -> Self {
        Self { store, views }
    }

    /// Flip the caller's like on a target.
    ///
    /// The check and the write are a single atomic store operation, so
    /// concurrent toggles by the same account never leave two likes behind.
    pub async fn toggle(&self, caller: &ObjectId, target: ReactionTarget) -> ApiResult<ToggleState> {
        match &target {
            ReactionTarget::Video(id) => {
                fetch_visible_video(self.store.as_ref(), id, Some(caller)).await?;
            }
            _ => {
                let (collection, label) = target_collection(&target);
                fetch::<Document>(self.store.as_ref(), collection, &target.id(), label).await?;
            }
        }

        let existing = Filter::all_of(vec![
            Filter::eq("likedBy", *caller),
            Filter::eq("kind", target.kind().as_str()),
            Filter::eq("target", target.id()),
        ]);
        let like = to_document(&NewLike::new(*caller, target))?;

        let state: ToggleState = self.store.toggle_one(Collection::Likes, &existing, like).await?.into();

        tracing::debug!(
            account = %caller,
            kind = target.kind().as_str(),
            target = %target.id(),
            ?state,
            "Reaction toggled"
        );
        Ok(state)
    }

    /// Toggle a like on a request-supplied id; a malformed id is rejected
    /// before the store is consulted
    pub async fn toggle_param(&self, caller: &ObjectId, kind: ReactionKind, raw_id: &str) -> ApiResult<ToggleState> {
        let target = parse_target(kind, raw_id)?;
        self.toggle(caller, target).await
    }

    /// Videos the caller has liked, most recently liked first
    pub async fn liked_videos(&self, caller: &ObjectId) -> ApiResult<LikedVideos> {
        let query = ViewQuery::new(
            Collection::Likes,
            Filter::all_of(vec![
                Filter::eq("likedBy", *caller),
                Filter::eq("kind", ReactionKind::Video.as_str()),
            ]),
        )
        .newest_first()
        .replace_root("target");

        let videos: Vec<VideoSummary> = self
            .views
            .compose_as(
                &query,
                &[Join::nested_one(
                    Collection::Videos,
                    "target",
                    VIDEO_SUMMARY_FIELDS,
                    vec![Join::owner("owner")],
                )
                .matching(visible_to(Some(caller)))],
            )
            .await?;

        Ok(LikedVideos {
            videos_count: videos.len(),
            videos,
        })
    }
}

impl From<Toggled> for ToggleState {
    fn from(toggled: Toggled) -> Self {
        match toggled {
            Toggled::Inserted(_) => ToggleState::Liked,
            Toggled::Deleted(_) => ToggleState::Unliked,
        }
    }
}
