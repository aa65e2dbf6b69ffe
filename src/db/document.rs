/// Documents, collections, filters and update operators
use crate::db::ObjectId;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A stored record: a JSON object whose `_id` field holds its object id
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Named document collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Videos,
    Comments,
    Tweets,
    Likes,
    Playlists,
    Subscriptions,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Videos => "videos",
            Collection::Comments => "comments",
            Collection::Tweets => "tweets",
            Collection::Likes => "likes",
            Collection::Playlists => "playlists",
            Collection::Subscriptions => "subscriptions",
        }
    }
}

/// Current time in the fixed-width stored form
pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}

/// RFC 3339 with microseconds and a `Z` suffix, so lexical order is time order
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Serde adapter for timestamp fields on typed models
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}

/// Document predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document
    All,
    /// Field equals value
    Eq(String, Value),
    /// Field equals one of the values
    In(String, Vec<Value>),
    /// Array field contains the value
    Contains(String, Value),
    /// Case-insensitive substring match against any of the fields
    Text { fields: Vec<String>, term: String },
    /// Field is present and not null
    Exists(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn id(id: &ObjectId) -> Self {
        Filter::Eq(ID_FIELD.to_string(), id.into())
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::Contains(field.to_string(), value.into())
    }

    pub fn text(fields: &[&str], term: &str) -> Self {
        Filter::Text {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            term: term.to_string(),
        }
    }

    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Conjunction that collapses trivial cases
    pub fn all_of(mut filters: Vec<Filter>) -> Self {
        filters.retain(|f| *f != Filter::All);
        match filters.len() {
            0 => Filter::All,
            1 => filters.remove(0),
            _ => Filter::And(filters),
        }
    }

    /// The id this filter pins, when it is a plain `_id` equality
    pub fn pinned_id(&self) -> Option<&str> {
        match self {
            Filter::Eq(field, Value::String(id)) if field == ID_FIELD => Some(id),
            Filter::And(parts) => parts.iter().find_map(Filter::pinned_id),
            _ => None,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::In(field, values) => doc.get(field).map_or(false, |v| values.contains(v)),
            Filter::Contains(field, value) => match doc.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
            Filter::Text { fields, term } => {
                let needle = term.to_lowercase();
                fields.iter().any(|field| match doc.get(field) {
                    Some(Value::String(s)) => s.to_lowercase().contains(&needle),
                    _ => false,
                })
            }
            Filter::Exists(field) => doc.get(field).map_or(false, |v| !v.is_null()),
            Filter::And(parts) => parts.iter().all(|f| f.matches(doc)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(doc)),
            Filter::Not(inner) => !inner.matches(doc),
        }
    }
}

/// Field-level mutation applied by `update_one`
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, Value),
    Unset(String),
    /// Add to a numeric field, treating a missing field as zero
    Inc(String, i64),
    Push(String, Value),
    /// Push unless the array already holds the value
    AddToSet(String, Value),
    /// Remove every occurrence of the value from the array
    Pull(String, Value),
}

impl UpdateOp {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        UpdateOp::Set(field.to_string(), value.into())
    }

    pub fn apply(&self, doc: &mut Document) {
        match self {
            UpdateOp::Set(field, value) => {
                doc.insert(field.clone(), value.clone());
            }
            UpdateOp::Unset(field) => {
                doc.remove(field);
            }
            UpdateOp::Inc(field, by) => {
                let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
                doc.insert(field.clone(), Value::from(current.saturating_add(*by)));
            }
            UpdateOp::Push(field, value) => array_mut(doc, field).push(value.clone()),
            UpdateOp::AddToSet(field, value) => {
                let items = array_mut(doc, field);
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
            UpdateOp::Pull(field, value) => array_mut(doc, field).retain(|v| v != value),
        }
    }
}

fn array_mut<'a>(doc: &'a mut Document, field: &str) -> &'a mut Vec<Value> {
    let slot = doc.entry(field.to_string()).or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just made an array"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: &str, direction: SortDirection) -> Self {
        Self {
            field: field.to_string(),
            direction,
        }
    }

    pub fn newest_first() -> Self {
        Self::new(CREATED_AT, SortDirection::Descending)
    }
}

/// Total order over JSON values: missing/null < bool < number < string < other
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(_) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Stable multi-key sort; ties keep their incoming order
pub fn sort_documents(docs: &mut [Document], specs: &[SortSpec]) {
    docs.sort_by(|a, b| {
        for spec in specs {
            let ord = compare_values(a.get(&spec.field), b.get(&spec.field));
            let ord = match spec.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}
