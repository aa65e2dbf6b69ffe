/// Denormalized read views
///
/// A `ViewQuery` selects, orders and pages root documents; `Join`s then
/// attach related data: the owner's public profile, counts of related
/// records, viewer-specific flags and nested sub-views. Every list and get
/// endpoint composes its response through `ViewComposer`.

pub mod pagination;

pub use pagination::{normalize, PagePlan, PageParams, VideoListParams};

use crate::{
    db::{
        document::ID_FIELD,
        models::{Account, ReactionKind},
        Collection, Document, DocumentStore, Filter, Lookup, ObjectId, Related, SortDirection, SortSpec, Stage,
    },
    error::{ApiError, ApiResult},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Account fields that may appear inside another entity's view
pub const PUBLIC_OWNER_FIELDS: &[&str] = &["username", "fullName", "avatar"];

/// Root selection of a view
#[derive(Debug, Clone)]
pub struct ViewQuery {
    pub collection: Collection,
    pub filter: Filter,
    pub sort: Vec<SortSpec>,
    pub page: Option<PagePlan>,
    /// Emit this embedded object in place of each root document
    pub root: Option<String>,
}

impl ViewQuery {
    pub fn new(collection: Collection, filter: Filter) -> Self {
        Self {
            collection,
            filter,
            sort: Vec::new(),
            page: None,
            root: None,
        }
    }

    pub fn by_id(collection: Collection, id: &ObjectId) -> Self {
        Self::new(collection, Filter::id(id))
    }

    /// Order by `sort` alone; ties keep the store's natural order
    pub fn sorted(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    /// Creation time descending; records created in the same instant fall
    /// back to id order, which follows creation within a process
    pub fn newest_first(self) -> Self {
        self.sorted(vec![
            SortSpec::newest_first(),
            SortSpec::new(ID_FIELD, SortDirection::Descending),
        ])
    }

    pub fn paged(mut self, page: PagePlan) -> Self {
        self.page = Some(page);
        self
    }

    pub fn replace_root(mut self, field: &str) -> Self {
        self.root = Some(field.to_string());
        self
    }
}

/// Related data attached to every root document
#[derive(Debug, Clone)]
pub enum Join {
    /// Replace an account reference with that account's public fields;
    /// dropped when the account no longer exists
    Owner { field: String },
    /// Number of related records
    Count(Related),
    /// Whether the viewer has a related record; always false when anonymous
    ViewerFlag {
        related: Related,
        viewer_field: String,
        viewer: Option<ObjectId>,
    },
    /// Length of an embedded array
    Size { field: String, as_field: String },
    /// Replace a reference (or array of references) with sub-views;
    /// related documents failing `filter` are left out
    Nested {
        from: Collection,
        field: String,
        filter: Filter,
        project: Vec<String>,
        joins: Vec<Join>,
        single: bool,
    },
}

fn likes_of(kind: ReactionKind, as_field: &str) -> Related {
    Related {
        from: Collection::Likes,
        local_field: ID_FIELD.to_string(),
        foreign_field: "target".to_string(),
        filter: Filter::eq("kind", kind.as_str()),
        as_field: as_field.to_string(),
    }
}

impl Join {
    pub fn owner(field: &str) -> Self {
        Join::Owner { field: field.to_string() }
    }

    pub fn likes_count(kind: ReactionKind) -> Self {
        Join::Count(likes_of(kind, "likesCount"))
    }

    pub fn liked_by(kind: ReactionKind, viewer: Option<ObjectId>) -> Self {
        Join::ViewerFlag {
            related: likes_of(kind, "isLiked"),
            viewer_field: "likedBy".to_string(),
            viewer,
        }
    }

    /// Like count plus the viewer's like flag
    pub fn reactions(kind: ReactionKind, viewer: Option<ObjectId>) -> Vec<Join> {
        vec![Join::likes_count(kind), Join::liked_by(kind, viewer)]
    }

    pub fn nested(from: Collection, field: &str, project: &[&str], joins: Vec<Join>) -> Self {
        Join::Nested {
            from,
            field: field.to_string(),
            filter: Filter::All,
            project: project.iter().map(|f| f.to_string()).collect(),
            joins,
            single: false,
        }
    }

    /// Nested join of a single reference, flattened to one object
    pub fn nested_one(from: Collection, field: &str, project: &[&str], joins: Vec<Join>) -> Self {
        Join::Nested {
            from,
            field: field.to_string(),
            filter: Filter::All,
            project: project.iter().map(|f| f.to_string()).collect(),
            joins,
            single: true,
        }
    }

    /// Restrict a nested join to related documents matching `filter`
    pub fn matching(mut self, only: Filter) -> Self {
        if let Join::Nested { filter, .. } = &mut self {
            *filter = only;
        }
        self
    }

    fn stages(&self) -> Vec<Stage> {
        match self {
            Join::Owner { field } => vec![
                Stage::Lookup(Lookup {
                    from: Collection::Users,
                    local_field: field.clone(),
                    foreign_field: ID_FIELD.to_string(),
                    as_field: field.clone(),
                    pipeline: vec![Stage::project(PUBLIC_OWNER_FIELDS)],
                }),
                Stage::First(field.clone()),
            ],
            Join::Count(related) => vec![Stage::Count(related.clone())],
            Join::ViewerFlag { related, viewer: None, .. } => {
                vec![Stage::Set(related.as_field.clone(), Value::Bool(false))]
            }
            Join::ViewerFlag {
                related,
                viewer_field,
                viewer: Some(viewer),
            } => vec![Stage::Exists(Related {
                filter: Filter::all_of(vec![related.filter.clone(), Filter::eq(viewer_field, *viewer)]),
                ..related.clone()
            })],
            Join::Size { field, as_field } => vec![Stage::Size {
                field: field.clone(),
                as_field: as_field.clone(),
            }],
            Join::Nested {
                from,
                field,
                filter,
                project,
                joins,
                single,
            } => {
                // Match before projecting so the filter sees every field
                let mut pipeline = Vec::new();
                if *filter != Filter::All {
                    pipeline.push(Stage::Match(filter.clone()));
                }
                pipeline.push(Stage::Project(project.clone()));
                pipeline.extend(joins.iter().flat_map(Join::stages));

                let mut stages = vec![Stage::Lookup(Lookup {
                    from: *from,
                    local_field: field.clone(),
                    foreign_field: ID_FIELD.to_string(),
                    as_field: field.clone(),
                    pipeline,
                })];
                if *single {
                    stages.push(Stage::First(field.clone()));
                }
                stages
            }
        }
    }
}

/// Full pipeline for a query and its joins.
///
/// Paging runs before the joins so only the visible window is joined.
pub fn plan_stages(query: &ViewQuery, joins: &[Join]) -> Vec<Stage> {
    let mut stages = vec![Stage::Match(query.filter.clone())];

    if !query.sort.is_empty() {
        stages.push(Stage::Sort(query.sort.clone()));
    }
    if let Some(page) = query.page {
        stages.push(Stage::Skip(usize::try_from(page.offset).unwrap_or(usize::MAX)));
        stages.push(Stage::Limit(usize::try_from(page.limit).unwrap_or(usize::MAX)));
    }

    stages.extend(joins.iter().flat_map(Join::stages));

    if let Some(root) = &query.root {
        stages.push(Stage::ReplaceRoot(root.clone()));
    }
    stages
}

pub struct ViewComposer {
    store: Arc<dyn DocumentStore>,
}

impl ViewComposer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn compose(&self, query: &ViewQuery, joins: &[Join]) -> ApiResult<Vec<Document>> {
        let stages = plan_stages(query, joins);
        tracing::debug!(collection = query.collection.as_str(), stages = stages.len(), "Composing view");
        Ok(self.store.run_pipeline(query.collection, &stages).await?)
    }

    /// Compose and deserialize into a typed view
    pub async fn compose_as<T: DeserializeOwned>(&self, query: &ViewQuery, joins: &[Join]) -> ApiResult<Vec<T>> {
        self.compose(query, joins)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(Value::Object(doc)).map_err(|e| ApiError::Store(e.into())))
            .collect()
    }

    pub async fn compose_one<T: DeserializeOwned>(&self, query: &ViewQuery, joins: &[Join]) -> ApiResult<Option<T>> {
        Ok(self.compose_as(query, joins).await?.into_iter().next())
    }
}

/// Public subset of an account, embedded in other views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

/// Account as shown to itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub watch_history: Vec<ObjectId>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            avatar: account.avatar.clone(),
            cover_image: account.cover_image.clone(),
            watch_history: account.watch_history.clone(),
            created_at: crate::db::document::format_timestamp(&account.created_at),
            updated_at: crate::db::document::format_timestamp(&account.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoView {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: u64,
    pub views: i64,
    pub is_published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_liked: Option<bool>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields of a video embedded in playlists, history and liked lists
pub const VIDEO_SUMMARY_FIELDS: &[&str] = &[
    "videoFile",
    "thumbnail",
    "title",
    "description",
    "duration",
    "views",
    "owner",
    "createdAt",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: u64,
    pub views: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub content: String,
    pub video: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
    pub likes_count: u64,
    pub is_liked: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetView {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
    pub likes_count: u64,
    pub is_liked: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub description: String,
    pub owner: ObjectId,
    pub video_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistView {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
    pub videos: Vec<VideoSummary>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub subscribers_count: u64,
    pub channels_subscribed_to_count: u64,
    pub is_subscribed: bool,
}

/// A subscriber of a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberView {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub subscriber: OwnerSummary,
    pub created_at: String,
}

/// A channel an account subscribes to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedChannelView {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub channel: OwnerSummary,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikedVideos {
    pub videos: Vec<VideoSummary>,
    pub videos_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        models::{to_document, NewVideo},
        SqliteDocumentStore,
    };
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    async fn seed() -> (ViewComposer, Arc<dyn DocumentStore>, ObjectId, Vec<ObjectId>) {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().await.unwrap());
        let owner = store
            .create(
                Collection::Users,
                doc(json!({
                    "username": "ana",
                    "email": "ana@example.com",
                    "fullName": "Ana",
                    "avatar": "a.png",
                    "watchHistory": [],
                    "password": "$argon2id$secret",
                    "refreshToken": "stored-refresh",
                })),
            )
            .await
            .unwrap();
        let owner_id: ObjectId = owner[ID_FIELD].as_str().unwrap().parse().unwrap();

        let mut videos = Vec::new();
        for title in ["first", "second", "third"] {
            let created = store
                .create(
                    Collection::Videos,
                    to_document(&NewVideo {
                        video_file: format!("{}.mp4", title),
                        thumbnail: format!("{}.png", title),
                        title: title.to_string(),
                        description: "clip".to_string(),
                        duration: 10,
                        views: 0,
                        is_published: true,
                        owner: owner_id,
                    })
                    .unwrap(),
                )
                .await
                .unwrap();
            videos.push(created[ID_FIELD].as_str().unwrap().parse().unwrap());
        }

        (ViewComposer::new(Arc::clone(&store)), store, owner_id, videos)
    }

    #[tokio::test]
    async fn test_owner_is_flattened_and_scrubbed() {
        let (composer, _, owner_id, _) = seed().await;
        let views = composer
            .compose(&ViewQuery::new(Collection::Videos, Filter::All), &[Join::owner("owner")])
            .await
            .unwrap();

        assert_eq!(views.len(), 3);
        let owner = views[0]["owner"].as_object().unwrap();
        assert_eq!(owner[ID_FIELD], json!(owner_id.to_hex()));
        assert_eq!(owner["username"], "ana");
        assert!(!owner.contains_key("password"));
        assert!(!owner.contains_key("refreshToken"));
        assert!(!owner.contains_key("email"));
    }

    #[tokio::test]
    async fn test_missing_owner_is_omitted() {
        let (composer, store, owner_id, _) = seed().await;
        store.delete_by_id(Collection::Users, &owner_id).await.unwrap();

        let views: Vec<VideoView> = composer
            .compose_as(&ViewQuery::new(Collection::Videos, Filter::All), &[Join::owner("owner")])
            .await
            .unwrap();
        assert!(views.iter().all(|v| v.owner.is_none()));
    }

    #[tokio::test]
    async fn test_paging_and_newest_first() {
        let (composer, _, _, _) = seed().await;
        let query = ViewQuery::new(Collection::Videos, Filter::All)
            .newest_first()
            .paged(normalize(Some("2"), Some("2")));

        let views: Vec<VideoView> = composer.compose_as(&query, &[Join::owner("owner")]).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].title, "first");
        assert_eq!(views[0].owner.as_ref().unwrap().username, "ana");
    }

    #[tokio::test]
    async fn test_reaction_aggregates_follow_viewer() {
        let (composer, store, owner_id, videos) = seed().await;
        store
            .create(
                Collection::Likes,
                doc(json!({"likedBy": owner_id, "kind": "video", "target": videos[0]})),
            )
            .await
            .unwrap();
        // Same id under a different kind must not count
        store
            .create(
                Collection::Likes,
                doc(json!({"likedBy": ObjectId::new(), "kind": "tweet", "target": videos[0]})),
            )
            .await
            .unwrap();

        let query = ViewQuery::by_id(Collection::Videos, &videos[0]);
        let joins_for = |viewer: Option<ObjectId>| {
            let mut joins = vec![Join::owner("owner")];
            joins.extend(Join::reactions(ReactionKind::Video, viewer));
            joins
        };

        let as_owner: VideoView = composer
            .compose_one(&query, &joins_for(Some(owner_id)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(as_owner.likes_count, Some(1));
        assert_eq!(as_owner.is_liked, Some(true));

        let anonymous: VideoView = composer
            .compose_one(&query, &joins_for(None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(anonymous.is_liked, Some(false));

        let stranger: VideoView = composer
            .compose_one(&query, &joins_for(Some(ObjectId::new())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stranger.is_liked, Some(false));
    }

    #[tokio::test]
    async fn test_nested_playlist_view() {
        let (composer, store, owner_id, videos) = seed().await;
        let playlist = store
            .create(
                Collection::Playlists,
                doc(json!({
                    "name": "mix",
                    "description": "best of",
                    "owner": owner_id,
                    "videos": [videos[2], videos[0]],
                })),
            )
            .await
            .unwrap();
        let playlist_id: ObjectId = playlist[ID_FIELD].as_str().unwrap().parse().unwrap();

        let view: PlaylistView = composer
            .compose_one(
                &ViewQuery::by_id(Collection::Playlists, &playlist_id),
                &[
                    Join::owner("owner"),
                    Join::nested(Collection::Videos, "videos", VIDEO_SUMMARY_FIELDS, vec![Join::owner("owner")]),
                ],
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(view.videos.len(), 2);
        assert_eq!(view.videos[0].title, "third");
        assert_eq!(view.videos[1].title, "first");
        assert_eq!(view.videos[0].owner.as_ref().unwrap().username, "ana");
        assert_eq!(view.owner.unwrap().id, owner_id);
    }

    #[tokio::test]
    async fn test_nested_join_filter_sees_unprojected_fields() {
        let (composer, store, owner_id, videos) = seed().await;
        store
            .update_by_id(Collection::Videos, &videos[1], &[crate::db::UpdateOp::set("isPublished", false)])
            .await
            .unwrap();
        let playlist = store
            .create(
                Collection::Playlists,
                doc(json!({"name": "mix", "description": "all", "owner": owner_id, "videos": videos})),
            )
            .await
            .unwrap();
        let playlist_id: ObjectId = playlist[ID_FIELD].as_str().unwrap().parse().unwrap();

        let view: PlaylistView = composer
            .compose_one(
                &ViewQuery::by_id(Collection::Playlists, &playlist_id),
                &[
                    Join::owner("owner"),
                    Join::nested(Collection::Videos, "videos", VIDEO_SUMMARY_FIELDS, vec![Join::owner("owner")])
                        .matching(Filter::eq("isPublished", true)),
                ],
            )
            .await
            .unwrap()
            .unwrap();

        let titles: Vec<_> = view.videos.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "third"]);
    }

    #[test]
    fn test_joins_run_after_paging() {
        let query = ViewQuery::new(Collection::Videos, Filter::All)
            .newest_first()
            .paged(normalize(None, None));
        let stages = plan_stages(&query, &[Join::owner("owner")]);

        assert!(matches!(stages[0], Stage::Match(Filter::All)));
        assert!(matches!(stages[1], Stage::Sort(_)));
        assert!(matches!(stages[2], Stage::Skip(0)));
        assert!(matches!(stages[3], Stage::Limit(10)));
        assert!(matches!(stages[4], Stage::Lookup(_)));
        assert!(matches!(stages[5], Stage::First(_)));
    }
}
