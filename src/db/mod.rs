/// Database layer for VideoTube
///
/// Presents persistence as a document store: JSON documents grouped in
/// collections, addressed by object ids, queried with filters and
/// aggregation-style pipelines.

pub mod document;
pub mod id;
pub mod models;
pub mod pipeline;
pub mod sqlite;
pub mod store;

pub use document::{Collection, Document, Filter, SortDirection, SortSpec, UpdateOp};
pub use id::ObjectId;
pub use pipeline::{Lookup, Related, Stage};
pub use sqlite::SqliteDocumentStore;
pub use store::{DocumentStore, Toggled};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use thiserror::Error;

/// Errors raised below the document store boundary
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt document: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> StoreResult<SqlitePool> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    SqliteJournalMode::Wal
                } else {
                    SqliteJournalMode::Delete
                })
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await?;

    Ok(pool)
}

/// Single-connection in-memory pool. The connection is never recycled, since
/// dropping it would drop the database with it.
pub async fn create_memory_pool() -> StoreResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    Ok(pool)
}

/// Run migrations embedded at compile time from ./migrations
pub async fn run_migrations(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
