/// Application context and dependency injection
use crate::{
    account::AccountManager,
    auth::{AuthGuard, PasswordHasher, SessionStore, TokenIssuer},
    blob_store::{BlobStore, DiskBlobStore},
    config::ServerConfig,
    content::{CommentManager, PlaylistManager, ReactionToggle, SubscriptionManager, TweetManager, VideoManager},
    db::{self, DocumentStore, SqliteDocumentStore},
    error::{ApiError, ApiResult},
    view::ViewComposer,
};
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub auth_guard: Arc<AuthGuard>,
    // Managers
    pub account_manager: Arc<AccountManager>,
    pub video_manager: Arc<VideoManager>,
    pub comment_manager: Arc<CommentManager>,
    pub tweet_manager: Arc<TweetManager>,
    pub playlist_manager: Arc<PlaylistManager>,
    pub reaction_toggle: Arc<ReactionToggle>,
    pub subscription_manager: Arc<SubscriptionManager>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;
        tracing::info!(database = %config.storage.database.display(), "Document store ready");

        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(pool));
        let blobs: Arc<dyn BlobStore> = Arc::new(DiskBlobStore::new(
            config.storage.blob_location.clone(),
            &config.storage.media_base_url,
        ));

        Self::with_store(config, store, blobs)
    }

    /// Wire every service over the given collaborators
    pub fn with_store(
        config: ServerConfig,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> ApiResult<Self> {
        let issuer = Arc::new(TokenIssuer::new(&config.authentication));
        let hasher = Arc::new(PasswordHasher::from_config(&config.authentication)?);
        let sessions = Arc::new(SessionStore::new(Arc::clone(&store), Arc::clone(&issuer)));
        let auth_guard = Arc::new(AuthGuard::new(Arc::clone(&store), Arc::clone(&issuer)));
        let views = Arc::new(ViewComposer::new(Arc::clone(&store)));

        let account_manager = Arc::new(AccountManager::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            hasher,
            sessions,
            Arc::clone(&views),
        ));
        let video_manager = Arc::new(VideoManager::new(Arc::clone(&store), Arc::clone(&blobs), Arc::clone(&views)));
        let comment_manager = Arc::new(CommentManager::new(Arc::clone(&store), Arc::clone(&views)));
        let tweet_manager = Arc::new(TweetManager::new(Arc::clone(&store), Arc::clone(&views)));
        let playlist_manager = Arc::new(PlaylistManager::new(Arc::clone(&store), Arc::clone(&views)));
        let reaction_toggle = Arc::new(ReactionToggle::new(Arc::clone(&store), Arc::clone(&views)));
        let subscription_manager = Arc::new(SubscriptionManager::new(Arc::clone(&store), Arc::clone(&views)));

        Ok(Self {
            config: Arc::new(config),
            store,
            blobs,
            auth_guard,
            account_manager,
            video_manager,
            comment_manager,
            tweet_manager,
            playlist_manager,
            reaction_toggle,
            subscription_manager,
        })
    }

    /// Ensure required directories exist
    pub async fn ensure_directories(config: &ServerConfig) -> ApiResult<()> {
        let dirs = [
            &config.storage.data_directory,
            &config.storage.blob_location,
            &config.storage.upload_tmp_location,
        ];

        for dir in dirs {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ApiError::Internal(format!("Failed to create directory {}: {}", dir.display(), e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!("http://{}:{}", self.config.service.hostname, self.config.service.port)
    }
}
