/// Document store collaborator
use crate::db::{Collection, Document, Filter, ObjectId, Stage, StoreResult, UpdateOp};
use async_trait::async_trait;

/// Outcome of an atomic insert-if-absent / delete-if-present
#[derive(Debug, Clone, PartialEq)]
pub enum Toggled {
    Inserted(Document),
    Deleted(Document),
}

/// Persistence engine contract.
///
/// Every method is one persistence round trip. Conditional writes
/// (`create_unique`, `update_one`, `toggle_one`) check and write atomically.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents matching the filter, in natural order
    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>>;

    async fn find_one(&self, collection: Collection, filter: &Filter) -> StoreResult<Option<Document>> {
        Ok(self.find(collection, filter).await?.into_iter().next())
    }

    async fn find_by_id(&self, collection: Collection, id: &ObjectId) -> StoreResult<Option<Document>> {
        self.find_one(collection, &Filter::id(id)).await
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> StoreResult<u64>;

    /// Insert a document, assigning `_id`, `createdAt` and `updatedAt`
    async fn create(&self, collection: Collection, doc: Document) -> StoreResult<Document>;

    /// Insert unless another document shares a value in any of the unique
    /// fields; `None` signals the conflict
    async fn create_unique(
        &self,
        collection: Collection,
        doc: Document,
        unique_fields: &[&str],
    ) -> StoreResult<Option<Document>>;

    /// Apply the operators to the first match and return the updated document
    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        ops: &[UpdateOp],
    ) -> StoreResult<Option<Document>>;

    async fn update_by_id(
        &self,
        collection: Collection,
        id: &ObjectId,
        ops: &[UpdateOp],
    ) -> StoreResult<Option<Document>> {
        self.update_one(collection, &Filter::id(id), ops).await
    }

    async fn delete_by_id(&self, collection: Collection, id: &ObjectId) -> StoreResult<Option<Document>>;

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> StoreResult<u64>;

    /// Delete the first match, or insert `doc` when nothing matches
    async fn toggle_one(&self, collection: Collection, filter: &Filter, doc: Document) -> StoreResult<Toggled>;

    /// Evaluate an aggregation pipeline rooted at `collection`
    async fn run_pipeline(&self, collection: Collection, stages: &[Stage]) -> StoreResult<Vec<Document>>;
}
