//! In-process document store
//!
//! Backs tests and database-less local runs. Writes to selected documents
//! can be made to fail, which is how partial-failure behavior is exercised.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    merge_into, precondition_failed, BatchOp, Collection, Document, DocumentStore, Filter,
    IncrementOutcome, WriteBatch, WriteMode,
};
use crate::error::{AppError, AppResult};

type Key = (Collection, String);

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<Key, Value>>,
    faults: RwLock<HashSet<Key>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write to this document fail
    pub async fn fail_writes_to(&self, collection: Collection, id: &str) {
        self.faults.write().await.insert((collection, id.to_string()));
    }

    pub async fn clear_faults(&self) {
        self.faults.write().await.clear();
    }

    /// Number of documents in a collection
    pub async fn count(&self, collection: Collection) -> usize {
        self.docs
            .read()
            .await
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }

    async fn check_fault(&self, collection: Collection, id: &str) -> AppResult<()> {
        if self.faults.read().await.contains(&(collection, id.to_string())) {
            return Err(AppError::Provider(format!(
                "write to {}/{} rejected",
                collection, id
            )));
        }
        Ok(())
    }
}

fn apply_put(docs: &mut BTreeMap<Key, Value>, key: Key, data: Value, mode: WriteMode) {
    if mode == WriteMode::Merge {
        if let Some(existing) = docs.get_mut(&key) {
            merge_into(existing, data);
            return;
        }
    }
    docs.insert(key, data);
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: Collection, id: &str) -> AppResult<Option<Document>> {
        let docs = self.docs.read().await;
        Ok(docs.get(&(collection, id.to_string())).map(|data| Document {
            id: id.to_string(),
            data: data.clone(),
        }))
    }

    async fn query(&self, collection: Collection, filters: &[Filter]) -> AppResult<Vec<Document>> {
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .filter(|((c, _), data)| *c == collection && filters.iter().all(|f| f.matches(data)))
            .map(|((_, id), data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect())
    }

    async fn put(&self, collection: Collection, id: &str, data: Value, mode: WriteMode) -> AppResult<()> {
        self.check_fault(collection, id).await?;
        let mut docs = self.docs.write().await;
        apply_put(&mut docs, (collection, id.to_string()), data, mode);
        Ok(())
    }

    async fn create(&self, collection: Collection, id: &str, data: Value) -> AppResult<bool> {
        self.check_fault(collection, id).await?;
        let mut docs = self.docs.write().await;
        let key = (collection, id.to_string());
        if docs.contains_key(&key) {
            return Ok(false);
        }
        docs.insert(key, data);
        Ok(true)
    }

    async fn delete(&self, collection: Collection, id: &str) -> AppResult<bool> {
        self.check_fault(collection, id).await?;
        Ok(self
            .docs
            .write()
            .await
            .remove(&(collection, id.to_string()))
            .is_some())
    }

    async fn increment(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> AppResult<IncrementOutcome> {
        self.check_fault(collection, id).await?;
        let mut docs = self.docs.write().await;
        let Some(doc) = docs.get_mut(&(collection, id.to_string())) else {
            return Ok(IncrementOutcome::Missing);
        };
        let current = doc.get(field).and_then(Value::as_i64).unwrap_or(0);
        let next = current + delta;
        if floor.is_some_and(|f| next < f) {
            return Ok(IncrementOutcome::BelowFloor(current));
        }
        match doc.as_object_mut() {
            Some(fields) => {
                fields.insert(field.to_string(), Value::from(next));
                Ok(IncrementOutcome::Applied(next))
            }
            None => Err(AppError::Internal(format!(
                "{}/{} is not an object document",
                collection, id
            ))),
        }
    }

    async fn commit(&self, batch: WriteBatch) -> AppResult<()> {
        let mut docs = self.docs.write().await;
        let mut staged = docs.clone();
        for op in batch.ops {
            match op {
                BatchOp::Check {
                    collection,
                    id,
                    condition,
                } => {
                    if !condition.holds(staged.get(&(collection, id.clone()))) {
                        return Err(precondition_failed(collection, &id, &condition));
                    }
                }
                BatchOp::Put {
                    collection,
                    id,
                    data,
                    mode,
                } => {
                    self.check_fault(collection, &id).await?;
                    apply_put(&mut staged, (collection, id), data, mode);
                }
                BatchOp::Delete { collection, id } => {
                    self.check_fault(collection, &id).await?;
                    staged.remove(&(collection, id));
                }
            }
        }
        *docs = staged;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Precondition;
    use serde_json::json;

    #[tokio::test]
    async fn merge_keeps_untouched_fields() {
        let store = MemoryDocumentStore::new();
        store
            .put(Collection::Users, "u1", json!({"email": "a@b.c", "role": "user"}), WriteMode::Merge)
            .await
            .unwrap();
        store
            .put(Collection::Users, "u1", json!({"role": "admin"}), WriteMode::Merge)
            .await
            .unwrap();
        let doc = store.get(Collection::Users, "u1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"email": "a@b.c", "role": "admin"}));

        store
            .put(Collection::Users, "u1", json!({"email": "x@y.z"}), WriteMode::Replace)
            .await
            .unwrap();
        let doc = store.get(Collection::Users, "u1").await.unwrap().unwrap();
        assert_eq!(doc.data, json!({"email": "x@y.z"}));
    }

    #[tokio::test]
    async fn create_is_insert_only() {
        let store = MemoryDocumentStore::new();
        assert!(store.create(Collection::Reservations, "r", json!({"n": 1})).await.unwrap());
        assert!(!store.create(Collection::Reservations, "r", json!({"n": 2})).await.unwrap());
        let doc = store.get(Collection::Reservations, "r").await.unwrap().unwrap();
        assert_eq!(doc.data["n"], 1);
    }

    #[tokio::test]
    async fn increment_respects_floor() {
        let store = MemoryDocumentStore::new();
        store
            .put(Collection::Schedules, "s", json!({"available_slots": 2}), WriteMode::Merge)
            .await
            .unwrap();

        let out = store
            .increment(Collection::Schedules, "s", "available_slots", -2, Some(0))
            .await
            .unwrap();
        assert_eq!(out, IncrementOutcome::Applied(0));

        let out = store
            .increment(Collection::Schedules, "s", "available_slots", -1, Some(0))
            .await
            .unwrap();
        assert_eq!(out, IncrementOutcome::BelowFloor(0));

        let out = store
            .increment(Collection::Schedules, "missing", "available_slots", -1, Some(0))
            .await
            .unwrap();
        assert_eq!(out, IncrementOutcome::Missing);
    }

    #[tokio::test]
    async fn query_filters_by_equality() {
        let store = MemoryDocumentStore::new();
        for (id, vt, active) in [("a", "x", true), ("b", "x", false), ("c", "y", true)] {
            store
                .put(Collection::Schedules, id, json!({"visit_type": vt, "active": active}), WriteMode::Merge)
                .await
                .unwrap();
        }
        let docs = store
            .query(
                Collection::Schedules,
                &[Filter::eq("visit_type", "x"), Filter::eq("active", true)],
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a");
    }

    #[tokio::test]
    async fn failed_batch_changes_nothing() {
        let store = MemoryDocumentStore::new();
        for id in ["a", "b", "c"] {
            store
                .put(Collection::VisitTypes, id, json!({"order": "0"}), WriteMode::Merge)
                .await
                .unwrap();
        }
        store.fail_writes_to(Collection::VisitTypes, "c").await;

        let mut batch = WriteBatch::new();
        for id in ["a", "b", "c"] {
            batch.put(Collection::VisitTypes, id, json!({"order": "9"}), WriteMode::Merge);
        }
        assert!(store.commit(batch).await.is_err());

        for id in ["a", "b", "c"] {
            let doc = store.get(Collection::VisitTypes, id).await.unwrap().unwrap();
            assert_eq!(doc.data["order"], "0");
        }
    }

    #[tokio::test]
    async fn failed_check_aborts_batch() {
        let store = MemoryDocumentStore::new();
        store
            .put(Collection::Schedules, "s", json!({"available_slots": 5}), WriteMode::Merge)
            .await
            .unwrap();

        let mut stale = WriteBatch::new();
        stale
            .check(Collection::Schedules, "s", Precondition::field_equals("available_slots", 6))
            .put(Collection::Schedules, "t", json!({"available_slots": 6}), WriteMode::Replace)
            .delete(Collection::Schedules, "s");
        let err = store.commit(stale).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.count(Collection::Schedules).await, 1);

        let mut taken = WriteBatch::new();
        taken.check(Collection::Schedules, "s", Precondition::Absent);
        assert!(matches!(store.commit(taken).await, Err(AppError::Conflict(_))));

        let mut fresh = WriteBatch::new();
        fresh
            .check(Collection::Schedules, "s", Precondition::field_equals("available_slots", 5))
            .check(Collection::Schedules, "t", Precondition::Absent)
            .put(Collection::Schedules, "t", json!({"available_slots": 5}), WriteMode::Replace)
            .delete(Collection::Schedules, "s");
        store.commit(fresh).await.unwrap();
        assert!(store.get(Collection::Schedules, "s").await.unwrap().is_none());
        assert!(store.get(Collection::Schedules, "t").await.unwrap().is_some());
    }
}
