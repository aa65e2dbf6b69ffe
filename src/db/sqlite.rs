/// SQLite-backed document store
///
/// Documents are JSON bodies in a single `documents` table keyed by
/// (collection, id). Filters are evaluated in process after the rows of a
/// collection are loaded; `_id` equality is pushed down to SQL.
use crate::db::{
    document::{now_timestamp, CREATED_AT, ID_FIELD, UPDATED_AT},
    pipeline, Collection, Document, DocumentStore, Filter, ObjectId, Stage, StoreError,
    StoreResult, Toggled, UpdateOp,
};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
    /// Serializes check-then-write operations so each is one atomic write
    write_lock: Mutex<()>,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Fresh in-memory store with the schema applied
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = crate::db::create_memory_pool().await?;
        crate::db::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_body(body: &str) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(doc) => Ok(doc),
        other => Err(StoreError::Corrupt(format!("expected object, found {}", other))),
    }
}

fn document_id(doc: &Document) -> StoreResult<String> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Corrupt("document without _id".to_string()))
}

/// Matching documents of a collection, in insertion order
async fn load_matching(
    conn: &mut SqliteConnection,
    collection: Collection,
    filter: &Filter,
) -> StoreResult<Vec<Document>> {
    let rows = match filter.pinned_id() {
        Some(id) => {
            sqlx::query("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
                .bind(collection.as_str())
                .bind(id)
                .fetch_all(&mut *conn)
                .await?
        }
        None => {
            sqlx::query("SELECT body FROM documents WHERE collection = ?1 ORDER BY seq")
                .bind(collection.as_str())
                .fetch_all(&mut *conn)
                .await?
        }
    };

    let mut docs = Vec::new();
    for row in rows {
        let body: String = row.try_get("body")?;
        let doc = parse_body(&body)?;
        if filter.matches(&doc) {
            docs.push(doc);
        }
    }

    Ok(docs)
}

async fn insert_document(
    conn: &mut SqliteConnection,
    collection: Collection,
    mut doc: Document,
) -> StoreResult<Document> {
    let now = now_timestamp();
    let id = ObjectId::new();
    doc.insert(ID_FIELD.to_string(), id.into());
    doc.insert(CREATED_AT.to_string(), Value::String(now.clone()));
    doc.insert(UPDATED_AT.to_string(), Value::String(now));

    sqlx::query("INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)")
        .bind(collection.as_str())
        .bind(id.to_hex())
        .bind(serde_json::to_string(&doc)?)
        .execute(&mut *conn)
        .await?;

    Ok(doc)
}

async fn delete_document(conn: &mut SqliteConnection, collection: Collection, id: &str) -> StoreResult<u64> {
    let result = sqlx::query("DELETE FROM documents WHERE collection = ?1 AND id = ?2")
        .bind(collection.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        let mut conn = self.pool.acquire().await?;
        load_matching(&mut conn, collection, filter).await
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        Ok(self.find(collection, filter).await?.len() as u64)
    }

    async fn create(&self, collection: Collection, doc: Document) -> StoreResult<Document> {
        let mut conn = self.pool.acquire().await?;
        insert_document(&mut conn, collection, doc).await
    }

    async fn create_unique(
        &self,
        collection: Collection,
        doc: Document,
        unique_fields: &[&str],
    ) -> StoreResult<Option<Document>> {
        let conflict = Filter::Or(
            unique_fields
                .iter()
                .filter_map(|field| doc.get(*field).map(|v| Filter::Eq(field.to_string(), v.clone())))
                .collect(),
        );

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        if !load_matching(&mut tx, collection, &conflict).await?.is_empty() {
            return Ok(None);
        }

        let created = insert_document(&mut tx, collection, doc).await?;
        tx.commit().await?;
        Ok(Some(created))
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        ops: &[UpdateOp],
    ) -> StoreResult<Option<Document>> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let Some(mut doc) = load_matching(&mut tx, collection, filter).await?.into_iter().next() else {
            return Ok(None);
        };

        for op in ops {
            op.apply(&mut doc);
        }
        doc.insert(UPDATED_AT.to_string(), Value::String(now_timestamp()));

        sqlx::query("UPDATE documents SET body = ?1 WHERE collection = ?2 AND id = ?3")
            .bind(serde_json::to_string(&doc)?)
            .bind(collection.as_str())
            .bind(document_id(&doc)?)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(doc))
    }

    async fn delete_by_id(&self, collection: Collection, id: &ObjectId) -> StoreResult<Option<Document>> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let Some(doc) = load_matching(&mut tx, collection, &Filter::id(id)).await?.into_iter().next() else {
            return Ok(None);
        };

        delete_document(&mut tx, collection, &id.to_hex()).await?;
        tx.commit().await?;
        Ok(Some(doc))
    }

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> StoreResult<u64> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut deleted = 0;
        for doc in load_matching(&mut tx, collection, filter).await? {
            deleted += delete_document(&mut tx, collection, &document_id(&doc)?).await?;
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn toggle_one(&self, collection: Collection, filter: &Filter, doc: Document) -> StoreResult<Toggled> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let outcome = match load_matching(&mut tx, collection, filter).await?.into_iter().next() {
            Some(existing) => {
                delete_document(&mut tx, collection, &document_id(&existing)?).await?;
                Toggled::Deleted(existing)
            }
            None => Toggled::Inserted(insert_document(&mut tx, collection, doc).await?),
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn run_pipeline(&self, collection: Collection, stages: &[Stage]) -> StoreResult<Vec<Document>> {
        pipeline::execute(self, collection, stages).await
    }
}
