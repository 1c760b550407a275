//! Reservations repository

use std::sync::Arc;

use super::{decode, encode, Collection, DocumentStore, Filter};
use crate::{error::AppResult, models::reservation::Reservation};

const COLLECTION: Collection = Collection::Reservations;

#[derive(Clone)]
pub struct ReservationsRepository {
    store: Arc<dyn DocumentStore>,
}

impl ReservationsRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn find(&self, id: &str) -> AppResult<Option<Reservation>> {
        self.store
            .get(COLLECTION, id)
            .await?
            .map(|doc| decode(COLLECTION, doc))
            .transpose()
    }

    /// Insert a reservation unless one with the same id exists.
    /// Returns `false` if it already existed.
    pub async fn create(&self, reservation: &Reservation) -> AppResult<bool> {
        self.store
            .create(COLLECTION, &reservation.id, encode(reservation)?)
            .await
    }

    /// Reservations of a user, newest first
    pub async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<Reservation>> {
        self.list(&[Filter::eq("user_id", user_id)]).await
    }

    /// Reservations, optionally restricted to one schedule, newest first
    pub async fn list_by_schedule(&self, schedule_id: Option<&str>) -> AppResult<Vec<Reservation>> {
        match schedule_id {
            Some(id) => self.list(&[Filter::eq("schedule_id", id)]).await,
            None => self.list(&[]).await,
        }
    }

    async fn list(&self, filters: &[Filter]) -> AppResult<Vec<Reservation>> {
        let mut rows = self
            .store
            .query(COLLECTION, filters)
            .await?
            .into_iter()
            .map(|doc| decode::<Reservation>(COLLECTION, doc))
            .collect::<AppResult<Vec<_>>>()?;
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}
