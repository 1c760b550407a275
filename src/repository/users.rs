//! Users repository

use std::sync::Arc;

use serde_json::json;

use super::{decode, encode, Collection, DocumentStore, WriteMode};
use crate::{
    error::{AppError, AppResult},
    models::user::{Role, User},
};

const COLLECTION: Collection = Collection::Users;

#[derive(Clone)]
pub struct UsersRepository {
    store: Arc<dyn DocumentStore>,
}

impl UsersRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn find(&self, id: &str) -> AppResult<Option<User>> {
        self.store
            .get(COLLECTION, id)
            .await?
            .map(|doc| decode(COLLECTION, doc))
            .transpose()
    }

    pub async fn get_by_id(&self, id: &str) -> AppResult<User> {
        self.find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    /// Insert a user unless one already exists; returns the stored record
    pub async fn create_if_absent(&self, user: &User) -> AppResult<User> {
        if self.store.create(COLLECTION, &user.id, encode(user)?).await? {
            return Ok(user.clone());
        }
        self.get_by_id(&user.id).await
    }

    pub async fn set_role(&self, id: &str, role: Role) -> AppResult<User> {
        self.get_by_id(id).await?;
        self.store
            .put(COLLECTION, id, json!({ "role": role }), WriteMode::Merge)
            .await?;
        self.get_by_id(id).await
    }

    pub async fn set_stripe_customer(&self, id: &str, customer_id: &str) -> AppResult<()> {
        self.store
            .put(
                COLLECTION,
                id,
                json!({ "stripe_customer_id": customer_id }),
                WriteMode::Merge,
            )
            .await
    }
}
