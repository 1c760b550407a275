//! Users service: account materialization and role management

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::user::{IdentityClaims, Role, User},
    repository::Repository,
    services::payments::PaymentProvider,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    payments: Arc<dyn PaymentProvider>,
    bootstrap_admins: Vec<String>,
}

impl UsersService {
    pub fn new(
        repository: Repository,
        payments: Arc<dyn PaymentProvider>,
        bootstrap_admins: Vec<String>,
    ) -> Self {
        Self {
            repository,
            payments,
            bootstrap_admins,
        }
    }

    /// Stored user for a verified identity, created on first sign-in
    pub async fn ensure_user(&self, claims: &IdentityClaims) -> AppResult<User> {
        if let Some(user) = self.repository.users.find(&claims.sub).await? {
            return Ok(user);
        }

        let role = if self
            .bootstrap_admins
            .iter()
            .any(|email| email.eq_ignore_ascii_case(&claims.email))
        {
            Role::Admin
        } else {
            Role::User
        };

        let user = User {
            id: claims.sub.clone(),
            email: claims.email.clone(),
            display_name: claims.name.clone(),
            role,
            stripe_customer_id: None,
        };
        let stored = self.repository.users.create_if_absent(&user).await?;
        tracing::info!(user_id = %stored.id, role = ?stored.role, "User created on first sign-in");
        Ok(stored)
    }

    /// Stored user for an identity, failing unless it is an administrator
    pub async fn require_admin(&self, claims: &IdentityClaims) -> AppResult<User> {
        let user = self.ensure_user(claims).await?;
        user.require_admin()?;
        Ok(user)
    }

    pub async fn get(&self, id: &str) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// Change another user's role
    pub async fn set_role(&self, actor: &User, id: &str, role: Role) -> AppResult<User> {
        actor.require_admin()?;
        if actor.id == id {
            return Err(AppError::BusinessRule(
                "Administrators cannot change their own role".to_string(),
            ));
        }
        let user = self.repository.users.set_role(id, role).await?;
        tracing::info!(user_id = %id, role = ?role, by = %actor.id, "User role changed");
        Ok(user)
    }

    /// Payment-provider customer id of a user, created on first use
    pub async fn ensure_customer(&self, user: &User) -> AppResult<String> {
        if let Some(existing) = &user.stripe_customer_id {
            return Ok(existing.clone());
        }
        let customer_id = self.payments.create_customer(&user.email, &user.id).await?;
        self.repository
            .users
            .set_stripe_customer(&user.id, &customer_id)
            .await?;
        Ok(customer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryDocumentStore;
    use crate::services::payments::MockPaymentProvider;

    fn claims(sub: &str, email: &str) -> IdentityClaims {
        IdentityClaims {
            sub: sub.into(),
            email: email.into(),
            name: Some("Visitor".into()),
            exp: 0,
            iat: 0,
        }
    }

    fn service(payments: MockPaymentProvider) -> UsersService {
        UsersService::new(
            Repository::new(Arc::new(MemoryDocumentStore::new())),
            Arc::new(payments),
            vec!["Director@Papilio.org".into()],
        )
    }

    #[tokio::test]
    async fn first_sign_in_creates_a_plain_user() {
        let service = service(MockPaymentProvider::new());
        let user = service.ensure_user(&claims("u1", "visitor@example.org")).await.unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.display_name.as_deref(), Some("Visitor"));

        let again = service.ensure_user(&claims("u1", "visitor@example.org")).await.unwrap();
        assert_eq!(again, user);
        assert!(matches!(
            service.require_admin(&claims("u1", "visitor@example.org")).await,
            Err(AppError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn bootstrap_admin_is_promoted() {
        let service = service(MockPaymentProvider::new());
        let admin = service.require_admin(&claims("a1", "director@papilio.org")).await.unwrap();
        assert!(admin.is_admin());
    }

    #[tokio::test]
    async fn role_changes_need_another_admin() {
        let service = service(MockPaymentProvider::new());
        let admin = service.ensure_user(&claims("a1", "director@papilio.org")).await.unwrap();
        let user = service.ensure_user(&claims("u1", "visitor@example.org")).await.unwrap();

        assert!(matches!(
            service.set_role(&user, "u1", Role::Admin).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            service.set_role(&admin, "a1", Role::User).await,
            Err(AppError::BusinessRule(_))
        ));

        let promoted = service.set_role(&admin, "u1", Role::Admin).await.unwrap();
        assert!(promoted.is_admin());
        assert!(matches!(
            service.set_role(&admin, "ghost", Role::Admin).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn customer_is_created_once() {
        let mut payments = MockPaymentProvider::new();
        payments
            .expect_create_customer()
            .times(1)
            .returning(|_, _| Ok("cus_123".to_string()));
        let service = service(payments);

        let user = service.ensure_user(&claims("u1", "visitor@example.org")).await.unwrap();
        assert_eq!(service.ensure_customer(&user).await.unwrap(), "cus_123");

        let reloaded = service.get("u1").await.unwrap();
        assert_eq!(reloaded.stripe_customer_id.as_deref(), Some("cus_123"));
        assert_eq!(service.ensure_customer(&reloaded).await.unwrap(), "cus_123");
    }
}
