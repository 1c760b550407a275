//! User model and identity-provider token claims

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Account role. Only an admin can change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Stored user record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    /// Stable identifier issued by the identity provider
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    pub stripe_customer_id: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require admin privileges
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Administrator privileges required".to_string()))
        }
    }
}

/// Role change request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateRole {
    pub role: Role,
}

/// JWT claims issued by the identity provider.
///
/// Carries identity only; authorization comes from the stored [`User`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl IdentityClaims {
    /// Sign these claims (used by tests and local tooling)
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and verify a token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn claims(exp_offset: Duration) -> IdentityClaims {
        let now = Utc::now();
        IdentityClaims {
            sub: "uid-1".into(),
            email: "visitor@example.org".into(),
            name: Some("Visitor".into()),
            exp: (now + exp_offset).timestamp(),
            iat: now.timestamp(),
        }
    }

    #[test]
    fn token_roundtrip_and_wrong_secret() {
        let token = claims(Duration::hours(1)).create_token("secret").unwrap();
        let parsed = IdentityClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.sub, "uid-1");
        assert!(IdentityClaims::from_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = claims(Duration::hours(-2)).create_token("secret").unwrap();
        assert!(IdentityClaims::from_token(&token, "secret").is_err());
    }

    #[test]
    fn require_admin_checks_role() {
        let mut user = User {
            id: "u".into(),
            email: "u@example.org".into(),
            display_name: None,
            role: Role::User,
            stripe_customer_id: None,
        };
        assert!(matches!(user.require_admin(), Err(AppError::Authorization(_))));
        user.role = Role::Admin;
        assert!(user.require_admin().is_ok());
    }
}
