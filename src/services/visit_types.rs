//! Visit type catalog service, kept in sync with payment-provider products

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde_json::Value;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::visit_type::{slugify, CreateVisitType, UpdateVisitType, VisitType},
    repository::Repository,
    services::payments::{NewProduct, PaymentProvider, ProductUpdate},
};

#[derive(Clone)]
pub struct VisitTypesService {
    repository: Repository,
    payments: Arc<dyn PaymentProvider>,
    currency: String,
}

impl VisitTypesService {
    pub fn new(repository: Repository, payments: Arc<dyn PaymentProvider>, currency: String) -> Self {
        Self {
            repository,
            payments,
            currency,
        }
    }

    /// Catalog in display order; inactive entries only on request
    pub async fn list(&self, include_inactive: bool) -> AppResult<Vec<VisitType>> {
        let rows = self.repository.visit_types.list().await?;
        Ok(rows
            .into_iter()
            .filter(|vt| include_inactive || vt.active)
            .collect())
    }

    pub async fn get(&self, id: &str) -> AppResult<VisitType> {
        self.repository.visit_types.get_by_id(id).await
    }

    /// Create a visit type and its payment product
    pub async fn create(&self, data: &CreateVisitType) -> AppResult<VisitType> {
        data.validate()?;
        let unit_amount = minor_units(data.price)?;

        let id = slugify(&data.name);
        if id.is_empty() {
            return Err(AppError::Validation(
                "name must contain at least one letter or digit".to_string(),
            ));
        }
        if self.repository.visit_types.find(&id).await?.is_some() {
            return Err(AppError::Conflict(format!("Visit type {} already exists", id)));
        }

        let position = self.repository.visit_types.list().await?.len();

        let product = self
            .payments
            .create_product(&NewProduct {
                name: data.name.clone(),
                description: data.description.clone(),
                unit_amount,
                currency: self.currency.clone(),
                metadata: vec![("visit_type_id".to_string(), id.clone())],
            })
            .await?;

        let visit_type = VisitType {
            id,
            name: data.name.clone(),
            description: data.description.clone(),
            price: data.price,
            frequency: data.frequency.clone(),
            features: data.features.clone(),
            active: data.active,
            order: position.to_string(),
            stripe_product_id: Some(product.product_id),
            stripe_price_id: Some(product.price_id),
        };

        if let Err(e) = self.repository.visit_types.create(&visit_type).await {
            // Lost a race on the id or the write failed: archive the new product
            if let Some(product_id) = &visit_type.stripe_product_id {
                if let Err(cleanup) = self.payments.deactivate_product(product_id).await {
                    tracing::warn!(product_id = %product_id, "Failed to archive orphan product: {}", cleanup);
                }
            }
            return Err(e);
        }

        tracing::info!(visit_type = %visit_type.id, "Visit type created");
        Ok(visit_type)
    }

    /// Merge changes into a visit type, syncing name, description and price
    /// with its payment product
    pub async fn update(&self, id: &str, patch: &UpdateVisitType) -> AppResult<VisitType> {
        patch.validate()?;
        let current = self.repository.visit_types.get_by_id(id).await?;

        let price_changed = patch.price.map_or(false, |p| p != current.price);
        let unit_amount = match patch.price {
            Some(price) if price_changed => Some(minor_units(price)?),
            Some(price) => {
                minor_units(price)?;
                None
            }
            None => None,
        };
        let name_changed = patch.name.as_ref().map_or(false, |n| *n != current.name);
        let description_changed = patch
            .description
            .as_ref()
            .map_or(false, |d| *d != current.description);

        let mut fields = serde_json::to_value(patch)
            .map_err(|e| AppError::Internal(format!("Serialization failed: {}", e)))?;

        if let Some(product_id) = &current.stripe_product_id {
            if price_changed || name_changed || description_changed {
                let updated = self
                    .payments
                    .update_product(&ProductUpdate {
                        product_id: product_id.clone(),
                        name: patch.name.clone().filter(|_| name_changed),
                        description: patch.description.clone().filter(|_| description_changed),
                        unit_amount,
                        currency: self.currency.clone(),
                        current_price_id: current.stripe_price_id.clone(),
                    })
                    .await?;
                if let (Some(price_id), Some(obj)) = (updated.price_id, fields.as_object_mut()) {
                    obj.insert("stripe_price_id".to_string(), Value::String(price_id));
                }
            }
        }

        let visit_type = self.repository.visit_types.merge(id, fields).await?;
        tracing::info!(visit_type = %id, price_changed, "Visit type updated");
        Ok(visit_type)
    }

    /// Remove a visit type; its payment product is archived, not deleted
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let current = self.repository.visit_types.get_by_id(id).await?;
        if let Some(product_id) = &current.stripe_product_id {
            self.payments.deactivate_product(product_id).await?;
        }
        self.repository.visit_types.delete(id).await?;
        tracing::info!(visit_type = %id, "Visit type deleted");
        Ok(())
    }

    /// Rewrite the display order of the catalog in one atomic batch
    pub async fn reorder(&self, ids: &[String]) -> AppResult<Vec<VisitType>> {
        if ids.is_empty() {
            return Err(AppError::Validation("ids must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(AppError::Validation(format!("Visit type {} listed twice", dup)));
        }
        for id in ids {
            self.repository.visit_types.get_by_id(id).await?;
        }

        self.repository.visit_types.reorder(ids).await?;
        tracing::info!(count = ids.len(), "Visit types reordered");
        self.repository.visit_types.list().await
    }
}

/// Price in minor currency units
fn minor_units(price: Decimal) -> AppResult<i64> {
    if price.is_sign_negative() {
        return Err(AppError::Validation("price must not be negative".to_string()));
    }
    price
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.round().to_i64())
        .ok_or_else(|| AppError::Validation("price is out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Collection, MemoryDocumentStore};
    use crate::services::payments::{CreatedProduct, MockPaymentProvider, UpdatedProduct};
    use mockall::predicate::eq;

    fn new_visit(name: &str, price: Decimal) -> CreateVisitType {
        CreateVisitType {
            name: name.into(),
            description: "Walk among the butterflies".into(),
            price,
            frequency: "every Saturday".into(),
            features: vec!["guide".into()],
            active: true,
        }
    }

    fn product_mock() -> MockPaymentProvider {
        let mut payments = MockPaymentProvider::new();
        payments.expect_create_product().returning(|p| {
            let id = p.metadata[0].1.clone();
            Ok(CreatedProduct {
                product_id: format!("prod_{}", id),
                price_id: format!("price_{}", id),
            })
        });
        payments
    }

    fn service_with(store: Arc<MemoryDocumentStore>, payments: MockPaymentProvider) -> VisitTypesService {
        VisitTypesService::new(Repository::new(store), Arc::new(payments), "eur".into())
    }

    #[tokio::test]
    async fn create_links_product_and_appends_to_order() {
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_create_product()
            .withf(|p| p.unit_amount == 1250 && p.currency == "eur" && p.name == "Guided Tour")
            .times(1)
            .returning(|_| {
                Ok(CreatedProduct {
                    product_id: "prod_1".into(),
                    price_id: "price_1".into(),
                })
            });
        let service = service_with(Arc::new(MemoryDocumentStore::new()), payments);

        let vt = service.create(&new_visit("Guided Tour", Decimal::new(1250, 2))).await.unwrap();
        assert_eq!(vt.id, "guided-tour");
        assert_eq!(vt.order, "0");
        assert_eq!(vt.stripe_price_id.as_deref(), Some("price_1"));
    }

    #[tokio::test]
    async fn duplicate_name_conflicts_without_new_product() {
        let mut payments = MockPaymentProvider::new();
        payments.expect_create_product().times(1).returning(|_| {
            Ok(CreatedProduct {
                product_id: "prod_1".into(),
                price_id: "price_1".into(),
            })
        });
        let service = service_with(Arc::new(MemoryDocumentStore::new()), payments);

        service.create(&new_visit("Guided Tour", Decimal::new(10, 0))).await.unwrap();
        let err = service
            .create(&new_visit("guided   tour", Decimal::new(10, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn negative_price_is_rejected() {
        let service = service_with(Arc::new(MemoryDocumentStore::new()), MockPaymentProvider::new());
        let err = service.create(&new_visit("Tour", Decimal::new(-1, 0))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn oversized_price_is_a_validation_error() {
        assert_eq!(minor_units(Decimal::new(1250, 2)).unwrap(), 1250);
        assert!(matches!(minor_units(Decimal::MAX), Err(AppError::Validation(_))));
        assert!(matches!(
            minor_units(Decimal::from(i64::MAX)),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn oversized_price_is_rejected_before_provider_calls() {
        let store = Arc::new(MemoryDocumentStore::new());
        let service = service_with(store.clone(), product_mock());
        let err = service.create(&new_visit("Tour", Decimal::MAX)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        service.create(&new_visit("Tour", Decimal::new(10, 0))).await.unwrap();
        let err = service
            .update(
                "tour",
                &UpdateVisitType {
                    price: Some(Decimal::MAX),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(service.get("tour").await.unwrap().price, Decimal::new(10, 0));
    }

    #[tokio::test]
    async fn price_change_stores_new_price() {
        let mut payments = product_mock();
        payments
            .expect_update_product()
            .withf(|u| {
                u.product_id == "prod_tour"
                    && u.unit_amount == Some(1500)
                    && u.current_price_id.as_deref() == Some("price_tour")
                    && u.name.is_none()
            })
            .times(1)
            .returning(|_| {
                Ok(UpdatedProduct {
                    price_id: Some("price_new".into()),
                })
            });
        let service = service_with(Arc::new(MemoryDocumentStore::new()), payments);
        service.create(&new_visit("Tour", Decimal::new(10, 0))).await.unwrap();

        let updated = service
            .update(
                "tour",
                &UpdateVisitType {
                    price: Some(Decimal::new(15, 0)),
                    frequency: Some("daily".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price, Decimal::new(15, 0));
        assert_eq!(updated.frequency, "daily");
        assert_eq!(updated.stripe_price_id.as_deref(), Some("price_new"));
        assert_eq!(updated.name, "Tour");
    }

    #[tokio::test]
    async fn unchanged_catalog_fields_skip_provider() {
        let service = service_with(Arc::new(MemoryDocumentStore::new()), product_mock());
        service.create(&new_visit("Tour", Decimal::new(10, 0))).await.unwrap();

        let updated = service
            .update(
                "tour",
                &UpdateVisitType {
                    price: Some(Decimal::new(1000, 2)),
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.active);
        assert!(service.list(false).await.unwrap().is_empty());
        assert_eq!(service.list(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_archives_product() {
        let mut payments = product_mock();
        payments
            .expect_deactivate_product()
            .with(eq("prod_tour"))
            .times(1)
            .returning(|_| Ok(()));
        let store = Arc::new(MemoryDocumentStore::new());
        let service = service_with(store.clone(), payments);
        service.create(&new_visit("Tour", Decimal::new(10, 0))).await.unwrap();

        service.delete("tour").await.unwrap();
        assert_eq!(store.count(Collection::VisitTypes).await, 0);
        assert!(matches!(service.delete("tour").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn reorder_is_all_or_nothing() {
        let store = Arc::new(MemoryDocumentStore::new());
        let service = service_with(store.clone(), product_mock());
        for name in ["Alpha", "Beta", "Gamma"] {
            service.create(&new_visit(name, Decimal::new(5, 0))).await.unwrap();
        }
        let new_order: Vec<String> = ["gamma", "alpha", "beta"].iter().map(|s| s.to_string()).collect();

        store.fail_writes_to(Collection::VisitTypes, "beta").await;
        assert!(service.reorder(&new_order).await.is_err());
        let unchanged: Vec<(String, String)> = service
            .list(true)
            .await
            .unwrap()
            .into_iter()
            .map(|vt| (vt.id, vt.order))
            .collect();
        assert_eq!(
            unchanged,
            vec![
                ("alpha".to_string(), "0".to_string()),
                ("beta".to_string(), "1".to_string()),
                ("gamma".to_string(), "2".to_string()),
            ]
        );

        store.clear_faults().await;
        let reordered = service.reorder(&new_order).await.unwrap();
        let ids: Vec<&str> = reordered.iter().map(|vt| vt.id.as_str()).collect();
        assert_eq!(ids, vec!["gamma", "alpha", "beta"]);
    }

    #[tokio::test]
    async fn reorder_rejects_unknown_and_duplicate_ids() {
        let service = service_with(Arc::new(MemoryDocumentStore::new()), product_mock());
        service.create(&new_visit("Alpha", Decimal::new(5, 0))).await.unwrap();

        assert!(matches!(
            service.reorder(&["alpha".into(), "ghost".into()]).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.reorder(&["alpha".into(), "alpha".into()]).await,
            Err(AppError::Validation(_))
        ));
    }
}
