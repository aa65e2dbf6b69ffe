/// VideoTube - video-sharing platform backend
///
/// Accounts with short-lived access tokens and rotating refresh tokens,
/// videos, comments, tweets, likes, playlists and channel subscriptions,
/// served as a JSON API over a document store.

pub mod account;
pub mod api;
pub mod auth;
pub mod blob_store;
pub mod config;
pub mod content;
pub mod context;
pub mod db;
pub mod error;
pub mod server;
pub mod view;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{ApiError, ApiResult};
