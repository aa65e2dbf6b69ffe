/// Typed views of stored documents
use crate::db::{document::timestamp, Document, ObjectId, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Serialize a model into a storable document
pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(doc) => Ok(doc),
        other => Err(StoreError::Corrupt(format!("model serialized to {}", other))),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// Registered account, including its private fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub watch_history: Vec<ObjectId>,
    /// Argon2 PHC string
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub watch_history: Vec<ObjectId>,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    /// Whole seconds
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub views: i64,
    #[serde(default = "published_by_default")]
    pub is_published: bool,
    pub owner: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

fn published_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideo {
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: u64,
    pub views: i64,
    pub is_published: bool,
    pub owner: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub content: String,
    pub video: ObjectId,
    pub owner: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    pub content: String,
    pub video: ObjectId,
    pub owner: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub content: String,
    pub owner: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTweet {
    pub content: String,
    pub owner: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    pub description: String,
    pub owner: ObjectId,
    #[serde(default)]
    pub videos: Vec<ObjectId>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPlaylist {
    pub name: String,
    pub description: String,
    pub owner: ObjectId,
    pub videos: Vec<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub subscriber: ObjectId,
    pub channel: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Kind of entity a reaction points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Video,
    Comment,
    Tweet,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Video => "video",
            ReactionKind::Comment => "comment",
            ReactionKind::Tweet => "tweet",
        }
    }
}

/// The single entity a reaction points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionTarget {
    Video(ObjectId),
    Comment(ObjectId),
    Tweet(ObjectId),
}

impl ReactionTarget {
    pub fn kind(&self) -> ReactionKind {
        match self {
            ReactionTarget::Video(_) => ReactionKind::Video,
            ReactionTarget::Comment(_) => ReactionKind::Comment,
            ReactionTarget::Tweet(_) => ReactionKind::Tweet,
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            ReactionTarget::Video(id) | ReactionTarget::Comment(id) | ReactionTarget::Tweet(id) => *id,
        }
    }

    pub fn from_parts(kind: ReactionKind, id: ObjectId) -> Self {
        match kind {
            ReactionKind::Video => ReactionTarget::Video(id),
            ReactionKind::Comment => ReactionTarget::Comment(id),
            ReactionKind::Tweet => ReactionTarget::Tweet(id),
        }
    }
}

/// Stored as `{kind, target}` so a like can only ever reference one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub liked_by: ObjectId,
    kind: ReactionKind,
    target: ObjectId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Like {
    pub fn target(&self) -> ReactionTarget {
        ReactionTarget::from_parts(self.kind, self.target)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLike {
    pub liked_by: ObjectId,
    kind: ReactionKind,
    target: ObjectId,
}

impl NewLike {
    pub fn new(liked_by: ObjectId, target: ReactionTarget) -> Self {
        Self {
            liked_by,
            kind: target.kind(),
            target: target.id(),
        }
    }
}
