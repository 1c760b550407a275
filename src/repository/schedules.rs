//! Schedules repository

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::{
    decode, encode, Collection, DocumentStore, Filter, IncrementOutcome, Precondition, WriteBatch,
    WriteMode,
};
use crate::{
    dates::DATE_FORMAT,
    error::{AppError, AppResult},
    models::schedule::Schedule,
};

const COLLECTION: Collection = Collection::Schedules;
const SLOTS_FIELD: &str = "available_slots";

#[derive(Clone)]
pub struct SchedulesRepository {
    store: Arc<dyn DocumentStore>,
}

impl SchedulesRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Get a schedule by ID, if it exists
    pub async fn find(&self, id: &str) -> AppResult<Option<Schedule>> {
        self.store
            .get(COLLECTION, id)
            .await?
            .map(|doc| decode(COLLECTION, doc))
            .transpose()
    }

    /// Get a schedule by ID
    pub async fn get_by_id(&self, id: &str) -> AppResult<Schedule> {
        self.find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Schedule {} not found", id)))
    }

    /// List schedules matching the given equality filters, ordered by date
    /// then offered time
    pub async fn list(
        &self,
        visit_type: Option<&str>,
        date: Option<NaiveDate>,
        active: Option<bool>,
    ) -> AppResult<Vec<Schedule>> {
        let mut filters = Vec::new();
        if let Some(vt) = visit_type {
            filters.push(Filter::eq("visit_type", vt));
        }
        if let Some(d) = date {
            filters.push(Filter::eq("date", d.format(DATE_FORMAT).to_string()));
        }
        if let Some(a) = active {
            filters.push(Filter::eq("active", a));
        }

        let mut rows = self
            .store
            .query(COLLECTION, &filters)
            .await?
            .into_iter()
            .map(|doc| decode::<Schedule>(COLLECTION, doc))
            .collect::<AppResult<Vec<_>>>()?;
        rows.sort_by(|a, b| {
            (a.date, a.window.offered_time(), &a.id).cmp(&(b.date, b.window.offered_time(), &b.id))
        });
        Ok(rows)
    }

    /// Create or merge a schedule at its key
    pub async fn upsert(&self, schedule: &Schedule) -> AppResult<()> {
        self.store
            .put(COLLECTION, &schedule.id, encode(schedule)?, WriteMode::Merge)
            .await
    }

    /// Merge capacity and visibility changes into an existing schedule.
    /// Fields left as `None` are not written.
    pub async fn patch(
        &self,
        id: &str,
        available_slots: Option<u32>,
        active: Option<bool>,
    ) -> AppResult<Schedule> {
        let mut fields = Map::new();
        if let Some(slots) = available_slots {
            fields.insert(SLOTS_FIELD.to_string(), Value::from(slots));
        }
        if let Some(active) = active {
            fields.insert("active".to_string(), Value::from(active));
        }

        if !fields.is_empty() {
            let mut batch = WriteBatch::new();
            batch
                .check(COLLECTION, id, Precondition::Exists)
                .put(COLLECTION, id, Value::Object(fields), WriteMode::Merge);
            self.store.commit(batch).await.map_err(|e| match e {
                AppError::Conflict(_) => AppError::NotFound(format!("Schedule {} not found", id)),
                other => other,
            })?;
        }
        self.get_by_id(id).await
    }

    /// Move a schedule to another key in one batch.
    ///
    /// Fails with `Conflict` when the source capacity moved since `from` was
    /// read (a confirmation landed in between) or the target key is taken.
    pub async fn relocate(&self, from: &Schedule, to: &Schedule) -> AppResult<()> {
        let mut batch = WriteBatch::new();
        batch
            .check(
                COLLECTION,
                &from.id,
                Precondition::field_equals(SLOTS_FIELD, from.available_slots),
            )
            .check(COLLECTION, &to.id, Precondition::Absent)
            .put(COLLECTION, &to.id, encode(to)?, WriteMode::Replace)
            .delete(COLLECTION, &from.id);
        self.store.commit(batch).await
    }

    /// Toggle visibility
    pub async fn set_active(&self, id: &str, active: bool) -> AppResult<Schedule> {
        self.patch(id, None, Some(active)).await
    }

    /// Delete a schedule
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        if !self.store.delete(COLLECTION, id).await? {
            return Err(AppError::NotFound(format!("Schedule {} not found", id)));
        }
        Ok(())
    }

    /// Take `count` slots if at least that many remain. Returns the
    /// remaining capacity.
    pub async fn reserve_slots(&self, id: &str, count: u32) -> AppResult<u32> {
        match self
            .store
            .increment(COLLECTION, id, SLOTS_FIELD, -i64::from(count), Some(0))
            .await?
        {
            IncrementOutcome::Applied(left) => Ok(clamp_slots(left)),
            IncrementOutcome::BelowFloor(left) => Err(AppError::Capacity(format!(
                "Schedule {} has {} slot(s) left, {} requested",
                id, left, count
            ))),
            IncrementOutcome::Missing => Err(AppError::NotFound(format!("Schedule {} not found", id))),
        }
    }

    /// Give back slots taken by [`reserve_slots`](Self::reserve_slots)
    pub async fn release_slots(&self, id: &str, count: u32) -> AppResult<u32> {
        match self
            .store
            .increment(COLLECTION, id, SLOTS_FIELD, i64::from(count), None)
            .await?
        {
            IncrementOutcome::Applied(left) | IncrementOutcome::BelowFloor(left) => Ok(clamp_slots(left)),
            IncrementOutcome::Missing => Err(AppError::NotFound(format!("Schedule {} not found", id))),
        }
    }
}

fn clamp_slots(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
