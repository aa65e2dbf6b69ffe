/// Aggregation pipeline
///
/// Stages are evaluated in order over an in-flight set of documents. Joins
/// reach back into the store, so evaluation is async and recursive (a lookup
/// carries its own sub-pipeline, which may itself join).
use crate::db::{
    document::{sort_documents, ID_FIELD},
    Collection, Document, DocumentStore, Filter, SortSpec, StoreResult,
};
use futures::future::BoxFuture;
use serde_json::Value;

/// Join of related documents into an array field
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub from: Collection,
    /// Root field holding the reference (a scalar or an array of references)
    pub local_field: String,
    pub foreign_field: String,
    pub as_field: String,
    /// Applied to each root document's matches
    pub pipeline: Vec<Stage>,
}

/// Related-record aggregate computed without materializing the records
#[derive(Debug, Clone, PartialEq)]
pub struct Related {
    pub from: Collection,
    pub local_field: String,
    pub foreign_field: String,
    /// Extra condition on the related records
    pub filter: Filter,
    pub as_field: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Lookup(Lookup),
    /// Reduce a joined array to its first element, removing the field if empty
    First(String),
    /// Number of related records
    Count(Related),
    /// Whether any related record exists
    Exists(Related),
    /// Length of an array field
    Size { field: String, as_field: String },
    Set(String, Value),
    Sort(Vec<SortSpec>),
    Skip(usize),
    Limit(usize),
    /// Keep only these fields (plus `_id`)
    Project(Vec<String>),
    /// Replace each document with the object held in the field
    ReplaceRoot(String),
}

impl Stage {
    pub fn project(fields: &[&str]) -> Self {
        Stage::Project(fields.iter().map(|f| f.to_string()).collect())
    }
}

/// Run a pipeline rooted at a collection
///
/// A leading `Match` is handed to the store as the initial query.
pub async fn execute(
    store: &dyn DocumentStore,
    collection: Collection,
    stages: &[Stage],
) -> StoreResult<Vec<Document>> {
    let (docs, rest) = match stages.split_first() {
        Some((Stage::Match(filter), rest)) => (store.find(collection, filter).await?, rest),
        _ => (store.find(collection, &Filter::All).await?, stages),
    };

    apply(store, docs, rest).await
}

/// Apply stages to an in-memory document set
pub fn apply<'a>(
    store: &'a dyn DocumentStore,
    docs: Vec<Document>,
    stages: &'a [Stage],
) -> BoxFuture<'a, StoreResult<Vec<Document>>> {
    Box::pin(async move {
        let mut docs = docs;

        for stage in stages {
            docs = match stage {
                Stage::Match(filter) => docs.into_iter().filter(|d| filter.matches(d)).collect(),
                Stage::Lookup(lookup) => lookup_join(store, docs, lookup).await?,
                Stage::First(field) => {
                    for doc in docs.iter_mut() {
                        flatten_first(doc, field);
                    }
                    docs
                }
                Stage::Count(related) => {
                    for doc in docs.iter_mut() {
                        let count = count_related(store, doc, related).await?;
                        doc.insert(related.as_field.clone(), Value::from(count));
                    }
                    docs
                }
                Stage::Exists(related) => {
                    for doc in docs.iter_mut() {
                        let count = count_related(store, doc, related).await?;
                        doc.insert(related.as_field.clone(), Value::Bool(count > 0));
                    }
                    docs
                }
                Stage::Size { field, as_field } => {
                    for doc in docs.iter_mut() {
                        let len = doc.get(field).and_then(Value::as_array).map_or(0, Vec::len);
                        doc.insert(as_field.clone(), Value::from(len));
                    }
                    docs
                }
                Stage::Set(field, value) => {
                    for doc in docs.iter_mut() {
                        doc.insert(field.clone(), value.clone());
                    }
                    docs
                }
                Stage::Sort(specs) => {
                    sort_documents(&mut docs, specs);
                    docs
                }
                Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
                Stage::Limit(n) => docs.into_iter().take(*n).collect(),
                Stage::Project(fields) => docs
                    .into_iter()
                    .map(|mut doc| {
                        doc.retain(|k, _| k == ID_FIELD || fields.iter().any(|f| f == k));
                        doc
                    })
                    .collect(),
                Stage::ReplaceRoot(field) => docs
                    .into_iter()
                    .filter_map(|mut doc| match doc.remove(field) {
                        Some(Value::Object(inner)) => Some(inner),
                        _ => None,
                    })
                    .collect(),
            };
        }

        Ok(docs)
    })
}

/// References held by a field: a scalar yields one, an array yields each element
fn local_refs(doc: &Document, field: &str) -> Vec<Value> {
    match doc.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(value) => vec![value.clone()],
    }
}

async fn lookup_join(
    store: &dyn DocumentStore,
    docs: Vec<Document>,
    lookup: &Lookup,
) -> StoreResult<Vec<Document>> {
    let mut wanted: Vec<Value> = Vec::new();
    for doc in &docs {
        for value in local_refs(doc, &lookup.local_field) {
            if !wanted.contains(&value) {
                wanted.push(value);
            }
        }
    }

    let foreign = if wanted.is_empty() {
        Vec::new()
    } else {
        store
            .find(lookup.from, &Filter::In(lookup.foreign_field.clone(), wanted))
            .await?
    };

    let mut joined = Vec::with_capacity(docs.len());
    for mut doc in docs {
        // Reference order wins over store order, so array joins keep their sequence
        let mut matches = Vec::new();
        for value in local_refs(&doc, &lookup.local_field) {
            matches.extend(
                foreign
                    .iter()
                    .filter(|f| f.get(&lookup.foreign_field) == Some(&value))
                    .cloned(),
            );
        }

        let matches = apply(store, matches, &lookup.pipeline).await?;
        doc.insert(
            lookup.as_field.clone(),
            Value::Array(matches.into_iter().map(Value::Object).collect()),
        );
        joined.push(doc);
    }

    Ok(joined)
}

fn flatten_first(doc: &mut Document, field: &str) {
    let first = match doc.get_mut(field) {
        Some(Value::Array(items)) if items.is_empty() => None,
        Some(Value::Array(items)) => Some(items.swap_remove(0)),
        _ => return,
    };

    match first {
        Some(value) => {
            doc.insert(field.to_string(), value);
        }
        None => {
            doc.remove(field);
        }
    }
}

async fn count_related(store: &dyn DocumentStore, doc: &Document, related: &Related) -> StoreResult<u64> {
    let Some(local) = doc.get(&related.local_field).filter(|v| !v.is_null()).cloned() else {
        return Ok(0);
    };

    let filter = Filter::all_of(vec![
        Filter::Eq(related.foreign_field.clone(), local),
        related.filter.clone(),
    ]);
    store.count(related.from, &filter).await
}
