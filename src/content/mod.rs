/// Content management: videos, comments, tweets, playlists, likes and
/// subscriptions
///
/// Every mutating operation runs its checks in the same order: parse ids,
/// load the entity (`NotFound`), check ownership (`Forbidden`), then write.

pub mod comments;
pub mod playlists;
pub mod reactions;
pub mod subscriptions;
pub mod tweets;
pub mod videos;

pub use comments::CommentManager;
pub use playlists::PlaylistManager;
pub use reactions::{ReactionToggle, ToggleState};
pub use subscriptions::{SubscriptionManager, SubscriptionState};
pub use tweets::TweetManager;
pub use videos::VideoManager;

use crate::{
    db::{
        models::{from_document, Video},
        Collection, DocumentStore, Filter, ObjectId,
    },
    error::{ApiError, ApiResult},
};
use serde::de::DeserializeOwned;

/// Load an entity or fail with `NotFound` naming it
pub(crate) async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Collection,
    id: &ObjectId,
    label: &str,
) -> ApiResult<T> {
    match store.find_by_id(collection, id).await? {
        Some(doc) => Ok(from_document(doc)?),
        None => Err(ApiError::NotFound(format!("{} not found", label))),
    }
}

/// Published videos, plus the viewer's own unpublished ones
pub(crate) fn visible_to(viewer: Option<&ObjectId>) -> Filter {
    let published = Filter::eq("isPublished", true);
    match viewer {
        Some(viewer) => Filter::Or(vec![published, Filter::eq("owner", viewer)]),
        None => published,
    }
}

/// Load a video the viewer may see; another account's unpublished video
/// is reported as missing
pub(crate) async fn fetch_visible_video(
    store: &dyn DocumentStore,
    id: &ObjectId,
    viewer: Option<&ObjectId>,
) -> ApiResult<Video> {
    let video: Video = fetch(store, Collection::Videos, id, "Video").await?;
    if !video.is_published && viewer != Some(&video.owner) {
        return Err(ApiError::NotFound("Video not found".to_string()));
    }
    Ok(video)
}

/// Trimmed, non-blank text field
pub(crate) fn required_text(value: Option<&str>, message: &str) -> ApiResult<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::InvalidInput(message.to_string()))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the manager tests

    use crate::{
        blob_store::{BlobStore, StoredBlob},
        db::{
            models::{from_document, to_document, Account, NewAccount},
            Collection, Document, DocumentStore, Filter, ObjectId, SqliteDocumentStore, Stage,
            StoreResult, Toggled, UpdateOp,
        },
        error::ApiResult,
    };
    use async_trait::async_trait;
    use std::{
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    pub async fn memory_store() -> Arc<dyn DocumentStore> {
        Arc::new(SqliteDocumentStore::in_memory().await.unwrap())
    }

    pub async fn account(store: &Arc<dyn DocumentStore>, username: &str) -> Account {
        let doc = to_document(&NewAccount {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            full_name: username.to_uppercase(),
            avatar: format!("http://localhost/media/{}.png", username),
            cover_image: None,
            watch_history: Vec::new(),
            password: "$argon2id$placeholder".to_string(),
        })
        .unwrap();
        from_document(store.create(Collection::Users, doc).await.unwrap()).unwrap()
    }

    /// Blob store that hands out predictable URLs and records deletions
    #[derive(Default)]
    pub struct FakeBlobStore {
        pub duration: Option<f64>,
        pub deleted: Mutex<Vec<String>>,
        pub fail: bool,
    }

    #[async_trait]
    impl BlobStore for FakeBlobStore {
        async fn store(&self, local_path: &Path) -> ApiResult<StoredBlob> {
            if self.fail {
                return Err(crate::error::ApiError::UploadFailed("offline".to_string()));
            }
            let name = local_path.file_name().and_then(|n| n.to_str()).unwrap_or("blob");
            Ok(StoredBlob {
                url: format!("http://cdn.test/{}", name),
                duration_seconds: self.duration,
            })
        }

        async fn delete(&self, url: &str) -> ApiResult<()> {
            self.deleted.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    /// Store that counts every call and holds no data
    #[derive(Default)]
    pub struct CountingStore {
        pub calls: AtomicUsize,
    }

    impl CountingStore {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn find(&self, _: Collection, _: &Filter) -> StoreResult<Vec<Document>> {
            self.hit();
            Ok(Vec::new())
        }

        async fn count(&self, _: Collection, _: &Filter) -> StoreResult<u64> {
            self.hit();
            Ok(0)
        }

        async fn create(&self, _: Collection, doc: Document) -> StoreResult<Document> {
            self.hit();
            Ok(doc)
        }

        async fn create_unique(&self, _: Collection, doc: Document, _: &[&str]) -> StoreResult<Option<Document>> {
            self.hit();
            Ok(Some(doc))
        }

        async fn update_one(&self, _: Collection, _: &Filter, _: &[UpdateOp]) -> StoreResult<Option<Document>> {
            self.hit();
            Ok(None)
        }

        async fn delete_by_id(&self, _: Collection, _: &ObjectId) -> StoreResult<Option<Document>> {
            self.hit();
            Ok(None)
        }

        async fn delete_many(&self, _: Collection, _: &Filter) -> StoreResult<u64> {
            self.hit();
            Ok(0)
        }

        async fn toggle_one(&self, _: Collection, _: &Filter, doc: Document) -> StoreResult<Toggled> {
            self.hit();
            Ok(Toggled::Inserted(doc))
        }

        async fn run_pipeline(&self, _: Collection, _: &[Stage]) -> StoreResult<Vec<Document>> {
            self.hit();
            Ok(Vec::new())
        }
    }
}
