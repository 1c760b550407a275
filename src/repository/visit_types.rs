//! Visit types repository

use std::sync::Arc;

use serde_json::{json, Value};

use super::{decode, encode, Collection, DocumentStore, WriteBatch, WriteMode};
use crate::{
    error::{AppError, AppResult},
    models::visit_type::VisitType,
};

const COLLECTION: Collection = Collection::VisitTypes;

#[derive(Clone)]
pub struct VisitTypesRepository {
    store: Arc<dyn DocumentStore>,
}

impl VisitTypesRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn find(&self, id: &str) -> AppResult<Option<VisitType>> {
        self.store
            .get(COLLECTION, id)
            .await?
            .map(|doc| decode(COLLECTION, doc))
            .transpose()
    }

    pub async fn get_by_id(&self, id: &str) -> AppResult<VisitType> {
        self.find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Visit type {} not found", id)))
    }

    /// All visit types in display order
    pub async fn list(&self) -> AppResult<Vec<VisitType>> {
        let mut rows = self
            .store
            .query(COLLECTION, &[])
            .await?
            .into_iter()
            .map(|doc| decode::<VisitType>(COLLECTION, doc))
            .collect::<AppResult<Vec<_>>>()?;
        rows.sort_by(|a, b| (a.position(), &a.name).cmp(&(b.position(), &b.name)));
        Ok(rows)
    }

    /// Insert a new visit type; `Conflict` if the id is taken
    pub async fn create(&self, visit_type: &VisitType) -> AppResult<()> {
        if !self.store.create(COLLECTION, &visit_type.id, encode(visit_type)?).await? {
            return Err(AppError::Conflict(format!(
                "Visit type {} already exists",
                visit_type.id
            )));
        }
        Ok(())
    }

    /// Merge fields into an existing visit type
    pub async fn merge(&self, id: &str, patch: Value) -> AppResult<VisitType> {
        self.get_by_id(id).await?;
        self.store.put(COLLECTION, id, patch, WriteMode::Merge).await?;
        self.get_by_id(id).await
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        if !self.store.delete(COLLECTION, id).await? {
            return Err(AppError::NotFound(format!("Visit type {} not found", id)));
        }
        Ok(())
    }

    /// Rewrite `order` for every id in one atomic batch
    pub async fn reorder(&self, ids: &[String]) -> AppResult<()> {
        let mut batch = WriteBatch::new();
        for (position, id) in ids.iter().enumerate() {
            batch.put(
                COLLECTION,
                id,
                json!({ "order": position.to_string() }),
                WriteMode::Merge,
            );
        }
        self.store.commit(batch).await
    }
}
