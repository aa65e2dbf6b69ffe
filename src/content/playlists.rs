/// Playlists: owner-curated ordered lists of videos
use crate::{
    auth::require_ownership,
    content::{fetch, fetch_visible_video, required_text, visible_to},
    db::{
        models::{from_document, to_document, Account, NewPlaylist, Playlist},
        Collection, DocumentStore, Filter, ObjectId, UpdateOp,
    },
    error::{ApiError, ApiResult},
    view::{Join, PagePlan, PlaylistSummary, PlaylistView, ViewComposer, ViewQuery, VIDEO_SUMMARY_FIELDS},
};
use serde_json::Value;
use std::sync::Arc;

pub struct PlaylistManager {
    store: Arc<dyn DocumentStore>,
    views: Arc<ViewComposer>,
}

impl PlaylistManager {
    pub fn new(store: Arc<dyn DocumentStore>, views: Arc<ViewComposer>) -> Self {
        Self { store, views }
    }

    pub async fn create(&self, caller: &ObjectId, name: Option<&str>, description: Option<&str>) -> ApiResult<Playlist> {
        let name = required_text(name, "Name and description are required")?;
        let description = required_text(description, "Name and description are required")?;

        let doc = to_document(&NewPlaylist {
            name,
            description,
            owner: *caller,
            videos: Vec::new(),
        })?;
        let playlist: Playlist = from_document(self.store.create(Collection::Playlists, doc).await?)?;

        tracing::info!(playlist = %playlist.id, "Playlist created");
        Ok(playlist)
    }

    /// Newest-first playlists of one account, with video counts
    pub async fn list_by_user(&self, raw_user_id: &str, page: PagePlan) -> ApiResult<Vec<PlaylistSummary>> {
        let user_id = ObjectId::parse_param(raw_user_id, "user")?;
        fetch::<Account>(self.store.as_ref(), Collection::Users, &user_id, "User").await?;

        let query = ViewQuery::new(Collection::Playlists, Filter::eq("owner", user_id))
            .newest_first()
            .paged(page);

        self.views
            .compose_as(
                &query,
                &[Join::Size {
                    field: "videos".to_string(),
                    as_field: "videoCount".to_string(),
                }],
            )
            .await
    }

    /// One playlist with its videos in playlist order; videos the viewer
    /// may not see are left out
    pub async fn get(&self, raw_playlist_id: &str, viewer: Option<&ObjectId>) -> ApiResult<PlaylistView> {
        let playlist_id = ObjectId::parse_param(raw_playlist_id, "playlist")?;

        self.views
            .compose_one(
                &ViewQuery::by_id(Collection::Playlists, &playlist_id),
                &[
                    Join::owner("owner"),
                    Join::nested(Collection::Videos, "videos", VIDEO_SUMMARY_FIELDS, vec![Join::owner("owner")])
                        .matching(visible_to(viewer)),
                ],
            )
            .await?
            .ok_or_else(|| ApiError::NotFound("Playlist not found".to_string()))
    }

    /// Rename and/or re-describe; at least one field must be given
    pub async fn update(
        &self,
        caller: &ObjectId,
        raw_playlist_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> ApiResult<Playlist> {
        let playlist_id = ObjectId::parse_param(raw_playlist_id, "playlist")?;

        let mut ops = Vec::new();
        if let Ok(name) = required_text(name, "") {
            ops.push(UpdateOp::set("name", name));
        }
        if let Ok(description) = required_text(description, "") {
            ops.push(UpdateOp::set("description", description));
        }
        if ops.is_empty() {
            return Err(ApiError::InvalidInput("Name or description is required".to_string()));
        }

        let playlist: Playlist = fetch(self.store.as_ref(), Collection::Playlists, &playlist_id, "Playlist").await?;
        require_ownership(&playlist.owner, caller, "edit this playlist")?;

        let updated = self
            .store
            .update_by_id(Collection::Playlists, &playlist_id, &ops)
            .await?
            .ok_or_else(|| ApiError::NotFound("Playlist not found".to_string()))?;

        Ok(from_document(updated)?)
    }

    pub async fn delete(&self, caller: &ObjectId, raw_playlist_id: &str) -> ApiResult<()> {
        let playlist_id = ObjectId::parse_param(raw_playlist_id, "playlist")?;

        let playlist: Playlist = fetch(self.store.as_ref(), Collection::Playlists, &playlist_id, "Playlist").await?;
        require_ownership(&playlist.owner, caller, "delete this playlist")?;

        self.store
            .delete_by_id(Collection::Playlists, &playlist_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Playlist not found".to_string()))?;

        tracing::info!(playlist = %playlist_id, "Playlist deleted");
        Ok(())
    }

    /// Append a video; adding one already present is a conflict
    pub async fn add_video(&self, caller: &ObjectId, raw_video_id: &str, raw_playlist_id: &str) -> ApiResult<Playlist> {
        let video_id = ObjectId::parse_param(raw_video_id, "video")?;
        let playlist_id = ObjectId::parse_param(raw_playlist_id, "playlist")?;

        let playlist: Playlist = fetch(self.store.as_ref(), Collection::Playlists, &playlist_id, "Playlist").await?;
        fetch_visible_video(self.store.as_ref(), &video_id, Some(caller)).await?;
        require_ownership(&playlist.owner, caller, "edit this playlist")?;

        let entry = Value::from(video_id);
        let updated = self
            .store
            .update_one(
                Collection::Playlists,
                &Filter::all_of(vec![
                    Filter::id(&playlist_id),
                    Filter::not(Filter::contains("videos", entry.clone())),
                ]),
                &[UpdateOp::Push("videos".to_string(), entry)],
            )
            .await?;

        match updated {
            Some(doc) => Ok(from_document(doc)?),
            None => Err(ApiError::Conflict("Video is already in the playlist".to_string())),
        }
    }

    /// Remove a video; removing one that is absent is not found
    pub async fn remove_video(&self, caller: &ObjectId, raw_video_id: &str, raw_playlist_id: &str) -> ApiResult<Playlist> {
        let video_id = ObjectId::parse_param(raw_video_id, "video")?;
        let playlist_id = ObjectId::parse_param(raw_playlist_id, "playlist")?;

        let playlist: Playlist = fetch(self.store.as_ref(), Collection::Playlists, &playlist_id, "Playlist").await?;
        require_ownership(&playlist.owner, caller, "edit this playlist")?;

        let entry = Value::from(video_id);
        let updated = self
            .store
            .update_one(
                Collection::Playlists,
                &Filter::all_of(vec![
                    Filter::id(&playlist_id),
                    Filter::contains("videos", entry.clone()),
                ]),
                &[UpdateOp::Pull("videos".to_string(), entry)],
            )
            .await?;

        match updated {
            Some(doc) => Ok(from_document(doc)?),
            None => Err(ApiError::NotFound("Video is not in the playlist".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        content::testing::{account, memory_store, CountingStore},
        db::models::{NewVideo, Video},
        view::normalize,
    };

    fn manager(store: &Arc<dyn DocumentStore>) -> PlaylistManager {
        PlaylistManager::new(Arc::clone(store), Arc::new(ViewComposer::new(Arc::clone(store))))
    }

    async fn video(store: &Arc<dyn DocumentStore>, owner: ObjectId, title: &str) -> ObjectId {
        let doc = to_document(&NewVideo {
            video_file: format!("{}.mp4", title),
            thumbnail: format!("{}.png", title),
            title: title.to_string(),
            description: title.to_string(),
            duration: 1,
            views: 0,
            is_published: true,
            owner,
        })
        .unwrap();
        from_document::<Video>(store.create(Collection::Videos, doc).await.unwrap())
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_membership_edits() {
        let store = memory_store().await;
        let playlists = manager(&store);
        let ana = account(&store, "ana").await;
        let bob = account(&store, "bob").await;
        let a = video(&store, bob.id, "a").await;
        let b = video(&store, ana.id, "b").await;

        let playlist = playlists.create(&ana.id, Some("mix"), Some("favourites")).await.unwrap();
        let pid = playlist.id.to_hex();

        playlists.add_video(&ana.id, &b.to_hex(), &pid).await.unwrap();
        let after = playlists.add_video(&ana.id, &a.to_hex(), &pid).await.unwrap();
        assert_eq!(after.videos, vec![b, a]);

        assert!(matches!(
            playlists.add_video(&ana.id, &a.to_hex(), &pid).await,
            Err(ApiError::Conflict(_))
        ));

        let view = playlists.get(&pid, None).await.unwrap();
        let titles: Vec<_> = view.videos.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a"]);
        assert_eq!(view.videos[1].owner.as_ref().unwrap().username, "bob");
        assert_eq!(view.owner.as_ref().unwrap().username, "ana");

        let after = playlists.remove_video(&ana.id, &b.to_hex(), &pid).await.unwrap();
        assert_eq!(after.videos, vec![a]);
        assert!(matches!(
            playlists.remove_video(&ana.id, &b.to_hex(), &pid).await,
            Err(ApiError::NotFound(_))
        ));
    }

    async fn unpublish(store: &Arc<dyn DocumentStore>, video: &ObjectId) {
        store
            .update_by_id(Collection::Videos, video, &[UpdateOp::set("isPublished", false)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unpublished_videos_stay_private() {
        let store = memory_store().await;
        let playlists = manager(&store);
        let ana = account(&store, "ana").await;
        let bob = account(&store, "bob").await;
        let secret = video(&store, ana.id, "secret").await;
        let public = video(&store, ana.id, "public").await;

        let bobs = playlists.create(&bob.id, Some("bob's"), Some("d")).await.unwrap();
        let bobs_id = bobs.id.to_hex();
        playlists.add_video(&bob.id, &secret.to_hex(), &bobs_id).await.unwrap();
        playlists.add_video(&bob.id, &public.to_hex(), &bobs_id).await.unwrap();
        unpublish(&store, &secret).await;

        let fresh = playlists.create(&bob.id, Some("later"), Some("d")).await.unwrap();
        assert!(matches!(
            playlists.add_video(&bob.id, &secret.to_hex(), &fresh.id.to_hex()).await,
            Err(ApiError::NotFound(_))
        ));

        for viewer in [None, Some(&bob.id)] {
            let view = playlists.get(&bobs_id, viewer).await.unwrap();
            let titles: Vec<_> = view.videos.iter().map(|v| v.title.as_str()).collect();
            assert_eq!(titles, vec!["public"]);
        }

        let as_owner = playlists.get(&bobs_id, Some(&ana.id)).await.unwrap();
        assert_eq!(as_owner.videos.len(), 2);

        let anas = playlists.create(&ana.id, Some("drafts"), Some("d")).await.unwrap();
        playlists.add_video(&ana.id, &secret.to_hex(), &anas.id.to_hex()).await.unwrap();
    }

    #[tokio::test]
    async fn test_not_found_precedes_forbidden() {
        let store = memory_store().await;
        let playlists = manager(&store);
        let ana = account(&store, "ana").await;
        let bob = account(&store, "bob").await;
        let playlist = playlists.create(&ana.id, Some("mix"), Some("d")).await.unwrap();
        let pid = playlist.id.to_hex();

        let ghost = ObjectId::new().to_hex();
        assert!(matches!(
            playlists.add_video(&bob.id, &ghost, &pid).await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(playlists.delete(&bob.id, &ghost).await, Err(ApiError::NotFound(_))));

        let v = video(&store, bob.id, "v").await;
        assert!(matches!(
            playlists.add_video(&bob.id, &v.to_hex(), &pid).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            playlists.update(&bob.id, &pid, Some("mix"), None).await,
            Err(ApiError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_list_and_update() {
        let store = memory_store().await;
        let playlists = manager(&store);
        let ana = account(&store, "ana").await;
        let v = video(&store, ana.id, "v").await;

        let first = playlists.create(&ana.id, Some("one"), Some("d")).await.unwrap();
        playlists.create(&ana.id, Some("two"), Some("d")).await.unwrap();
        playlists.add_video(&ana.id, &v.to_hex(), &first.id.to_hex()).await.unwrap();

        let listed = playlists.list_by_user(&ana.id.to_hex(), normalize(None, None)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "two");
        assert_eq!(listed[0].video_count, 0);
        assert_eq!(listed[1].video_count, 1);

        let renamed = playlists
            .update(&ana.id, &first.id.to_hex(), Some(" renamed "), Some(""))
            .await
            .unwrap();
        assert_eq!(renamed.name, "renamed");
        assert_eq!(renamed.description, "d");

        assert!(matches!(
            playlists.update(&ana.id, &first.id.to_hex(), None, Some("  ")).await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_then_fetch() {
        let store = memory_store().await;
        let playlists = manager(&store);
        let ana = account(&store, "ana").await;
        let playlist = playlists.create(&ana.id, Some("mix"), Some("d")).await.unwrap();
        let pid = playlist.id.to_hex();

        playlists.delete(&ana.id, &pid).await.unwrap();
        assert!(matches!(playlists.get(&pid, None).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_malformed_ids_never_reach_the_store() {
        let counting = Arc::new(CountingStore::default());
        let store: Arc<dyn DocumentStore> = counting.clone();
        let playlists = manager(&store);
        let caller = ObjectId::new();
        let valid = ObjectId::new().to_hex();

        assert!(matches!(playlists.get("", None).await, Err(ApiError::InvalidId("playlist"))));
        assert!(matches!(playlists.delete(&caller, "nope").await, Err(ApiError::InvalidId("playlist"))));
        assert!(matches!(
            playlists.update(&caller, "nope", Some("n"), None).await,
            Err(ApiError::InvalidId("playlist"))
        ));
        assert!(matches!(
            playlists.add_video(&caller, "nope", &valid).await,
            Err(ApiError::InvalidId("video"))
        ));
        assert!(matches!(
            playlists.remove_video(&caller, &valid, "nope").await,
            Err(ApiError::InvalidId("playlist"))
        ));
        assert!(matches!(
            playlists.list_by_user("nope", normalize(None, None)).await,
            Err(ApiError::InvalidId("user"))
        ));

        assert_eq!(counting.calls(), 0);
    }
}
