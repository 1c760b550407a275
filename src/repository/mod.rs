//! Repository layer over a generic document store
//!
//! Persistence goes through the narrow [`DocumentStore`] contract (get,
//! equality query, merge/replace upsert, create-if-absent, delete, atomic
//! relative increment, all-or-nothing batch with preconditions). Typed repositories convert
//! documents to entity structs at this boundary and fail fast on shape
//! mismatches.

pub mod memory;
pub mod postgres;
pub mod reservations;
pub mod schedules;
pub mod users;
pub mod visit_types;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// Document collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    VisitTypes,
    Schedules,
    Reservations,
    Users,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::VisitTypes => "visitTypes",
            Collection::Schedules => "schedules",
            Collection::Reservations => "reservations",
            Collection::Users => "users",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Equality filter on a top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }

    fn matches(&self, data: &Value) -> bool {
        data.get(&self.field) == Some(&self.value)
    }
}

/// How a write combines with an existing document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Shallow merge of top-level fields; creates the document if absent
    Merge,
    /// Overwrite the whole document
    Replace,
}

/// Result of a relative increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// Applied; carries the new value
    Applied(i64),
    /// Not applied because the result would fall under the floor; carries
    /// the current value
    BelowFloor(i64),
    /// No such document
    Missing,
}

/// Condition a batch checks against the current state of one document
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    Exists,
    Absent,
    /// The document exists and a top-level field holds this value
    FieldEquals { field: String, value: Value },
}

impl Precondition {
    pub fn field_equals(field: &str, value: impl Into<Value>) -> Self {
        Precondition::FieldEquals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub(crate) fn holds(&self, current: Option<&Value>) -> bool {
        match (self, current) {
            (Precondition::Exists, doc) => doc.is_some(),
            (Precondition::Absent, doc) => doc.is_none(),
            (Precondition::FieldEquals { field, value }, Some(doc)) => doc.get(field) == Some(value),
            (Precondition::FieldEquals { .. }, None) => false,
        }
    }
}

/// One operation of a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    /// Abort the whole batch with `Conflict` unless the condition holds
    Check {
        collection: Collection,
        id: String,
        condition: Precondition,
    },
    Put {
        collection: Collection,
        id: String,
        data: Value,
        mode: WriteMode,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

/// Multi-document write committed as a unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, collection: Collection, id: &str, condition: Precondition) -> &mut Self {
        self.ops.push(BatchOp::Check {
            collection,
            id: id.to_string(),
            condition,
        });
        self
    }

    pub fn put(&mut self, collection: Collection, id: &str, data: Value, mode: WriteMode) -> &mut Self {
        self.ops.push(BatchOp::Put {
            collection,
            id: id.to_string(),
            data,
            mode,
        });
        self
    }

    pub fn delete(&mut self, collection: Collection, id: &str) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            collection,
            id: id.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Narrow document-store contract the booking logic relies on
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> AppResult<Option<Document>>;

    /// Documents whose fields equal every filter, ordered by id
    async fn query(&self, collection: Collection, filters: &[Filter]) -> AppResult<Vec<Document>>;

    async fn put(&self, collection: Collection, id: &str, data: Value, mode: WriteMode) -> AppResult<()>;

    /// Insert only if absent. Returns `false` when the id already exists.
    async fn create(&self, collection: Collection, id: &str, data: Value) -> AppResult<bool>;

    /// Returns `false` when nothing was deleted
    async fn delete(&self, collection: Collection, id: &str) -> AppResult<bool>;

    /// Add `delta` to an integer field server-side. With a `floor`, the
    /// update applies only if the result stays `>= floor`.
    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> AppResult<IncrementOutcome>;

    /// Apply every operation or none. Checks are evaluated in order against
    /// the state the batch has built so far; a failed check yields
    /// `Conflict` and nothing is written.
    async fn commit(&self, batch: WriteBatch) -> AppResult<()>;

    /// Connectivity check
    async fn ping(&self) -> AppResult<()>;
}

/// Main repository struct holding the store handle and typed accessors
#[derive(Clone)]
pub struct Repository {
    pub store: Arc<dyn DocumentStore>,
    pub visit_types: visit_types::VisitTypesRepository,
    pub schedules: schedules::SchedulesRepository,
    pub reservations: reservations::ReservationsRepository,
    pub users: users::UsersRepository,
}

impl Repository {
    /// Create a new repository over the given store
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            visit_types: visit_types::VisitTypesRepository::new(store.clone()),
            schedules: schedules::SchedulesRepository::new(store.clone()),
            reservations: reservations::ReservationsRepository::new(store.clone()),
            users: users::UsersRepository::new(store.clone()),
            store,
        }
    }
}

pub(crate) fn precondition_failed(collection: Collection, id: &str, condition: &Precondition) -> AppError {
    AppError::Conflict(format!(
        "{}/{} changed concurrently ({:?} no longer holds)",
        collection, id, condition
    ))
}

/// Convert a stored document into an entity
pub(crate) fn decode<T: DeserializeOwned>(collection: Collection, doc: Document) -> AppResult<T> {
    serde_json::from_value(doc.data).map_err(|e| {
        AppError::Internal(format!("Malformed {} document {}: {}", collection, doc.id, e))
    })
}

/// Convert an entity into a document body
pub(crate) fn encode<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(format!("Serialization failed: {}", e)))
}

/// Shallow merge used by backends implementing [`WriteMode::Merge`]
pub(crate) fn merge_into(target: &mut Value, patch: Value) {
    match patch {
        Value::Object(fields) if target.is_object() => {
            if let Some(existing) = target.as_object_mut() {
                existing.extend(fields);
            }
        }
        other => *target = other,
    }
}
