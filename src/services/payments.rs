//! Payment provider integration
//!
//! [`PaymentProvider`] is the narrow contract the booking logic uses;
//! [`StripeClient`] implements it over the Stripe REST API with form-encoded
//! requests (no SDK).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::{
    config::PaymentConfig,
    error::{AppError, AppResult},
};

/// Maximum age of a webhook signature timestamp, in seconds
pub const WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Shortest checkout session lifetime Stripe accepts
pub const CHECKOUT_MIN_LIFETIME: Duration = Duration::from_secs(30 * 60);
/// Longest checkout session lifetime Stripe accepts
pub const CHECKOUT_MAX_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Session lifetime the provider will honor for a requested payment window
pub fn checkout_lifetime(requested: Duration) -> Duration {
    requested.clamp(CHECKOUT_MIN_LIFETIME, CHECKOUT_MAX_LIFETIME)
}

/// Product to create, with its initial price
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    /// Price in minor currency units
    pub unit_amount: i64,
    pub currency: String,
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedProduct {
    pub product_id: String,
    pub price_id: String,
}

/// Changes to an existing product. A new price is created only when
/// `unit_amount` differs from the current price.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductUpdate {
    pub product_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit_amount: Option<i64>,
    pub currency: String,
    pub current_price_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedProduct {
    /// Set when a new price replaced the previous one
    pub price_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckoutSession {
    pub price_id: String,
    pub customer_id: Option<String>,
    pub quantity: u32,
    pub metadata: Vec<(String, String)>,
    pub return_url: String,
    /// Unix time after which the session can no longer be paid
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedCheckoutSession {
    pub session_id: String,
    pub url: Option<String>,
    pub client_secret: Option<String>,
}

/// Checkout session as reported by the provider
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// open, complete or expired
    pub status: Option<String>,
    /// paid, unpaid or no_payment_required
    pub payment_status: Option<String>,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.status.as_deref() == Some("complete") && self.payment_status.as_deref() == Some("paid")
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_customer(&self, email: &str, user_id: &str) -> AppResult<String>;

    async fn create_product(&self, product: &NewProduct) -> AppResult<CreatedProduct>;

    async fn update_product(&self, update: &ProductUpdate) -> AppResult<UpdatedProduct>;

    /// Archive a product; products are never hard-deleted
    async fn deactivate_product(&self, product_id: &str) -> AppResult<()>;

    async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> AppResult<CreatedCheckoutSession>;

    async fn retrieve_checkout_session(&self, session_id: &str) -> AppResult<CheckoutSession>;
}

/// Stripe REST client
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(config: &PaymentConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            secret_key: config.secret_key.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> AppResult<Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Payment provider request failed: {}", e)))?;
        read_body(response).await
    }

    async fn get(&self, path: &str) -> AppResult<Value> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Payment provider request failed: {}", e)))?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> AppResult<Value> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(body);
    }
    let message = body["error"]["message"]
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| format!("Payment provider returned {}", status));
    Err(AppError::Provider(message))
}

fn string_field(body: &Value, field: &str) -> AppResult<String> {
    body[field]
        .as_str()
        .map(String::from)
        .ok_or_else(|| AppError::Provider(format!("Payment provider response missing {}", field)))
}

fn form(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn push_metadata(form: &mut Vec<(String, String)>, metadata: &[(String, String)]) {
    for (k, v) in metadata {
        form.push((format!("metadata[{}]", k), v.clone()));
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(&self, email: &str, user_id: &str) -> AppResult<String> {
        let body = self
            .post_form(
                "/v1/customers",
                &form(&[("email", email), ("metadata[user_id]", user_id)]),
            )
            .await?;
        string_field(&body, "id")
    }

    async fn create_product(&self, product: &NewProduct) -> AppResult<CreatedProduct> {
        let amount = product.unit_amount.to_string();
        let mut params = form(&[
            ("name", product.name.as_str()),
            ("default_price_data[unit_amount]", amount.as_str()),
            ("default_price_data[currency]", product.currency.as_str()),
        ]);
        // Stripe rejects empty descriptions
        if !product.description.is_empty() {
            params.push(("description".into(), product.description.clone()));
        }
        push_metadata(&mut params, &product.metadata);

        let body = self.post_form("/v1/products", &params).await?;
        Ok(CreatedProduct {
            product_id: string_field(&body, "id")?,
            price_id: string_field(&body, "default_price")?,
        })
    }

    async fn update_product(&self, update: &ProductUpdate) -> AppResult<UpdatedProduct> {
        let mut new_price = None;

        if let Some(amount) = update.unit_amount {
            let current_amount = match &update.current_price_id {
                Some(price_id) => self.get(&format!("/v1/prices/{}", price_id)).await?["unit_amount"].as_i64(),
                None => None,
            };
            if current_amount != Some(amount) {
                let amount = amount.to_string();
                let created = self
                    .post_form(
                        "/v1/prices",
                        &form(&[
                            ("product", update.product_id.as_str()),
                            ("unit_amount", amount.as_str()),
                            ("currency", update.currency.as_str()),
                        ]),
                    )
                    .await?;
                new_price = Some(string_field(&created, "id")?);
            }
        }

        let mut params = Vec::new();
        if let Some(name) = &update.name {
            params.push(("name".to_string(), name.clone()));
        }
        if let Some(description) = update.description.as_ref().filter(|d| !d.is_empty()) {
            params.push(("description".to_string(), description.clone()));
        }
        if let Some(price_id) = &new_price {
            params.push(("default_price".to_string(), price_id.clone()));
        }
        if !params.is_empty() {
            self.post_form(&format!("/v1/products/{}", update.product_id), &params)
                .await?;
        }

        if let (Some(_), Some(old)) = (&new_price, &update.current_price_id) {
            self.post_form(&format!("/v1/prices/{}", old), &form(&[("active", "false")]))
                .await?;
        }

        Ok(UpdatedProduct { price_id: new_price })
    }

    async fn deactivate_product(&self, product_id: &str) -> AppResult<()> {
        self.post_form(
            &format!("/v1/products/{}", product_id),
            &form(&[("active", "false")]),
        )
        .await?;
        Ok(())
    }

    async fn create_checkout_session(
        &self,
        session: &NewCheckoutSession,
    ) -> AppResult<CreatedCheckoutSession> {
        let quantity = session.quantity.to_string();
        let expires_at = session.expires_at.to_string();
        let mut params = form(&[
            ("ui_mode", "embedded"),
            ("mode", "payment"),
            ("line_items[0][price]", session.price_id.as_str()),
            ("line_items[0][quantity]", quantity.as_str()),
            ("return_url", session.return_url.as_str()),
            ("expires_at", expires_at.as_str()),
        ]);
        if let Some(customer) = &session.customer_id {
            params.push(("customer".into(), customer.clone()));
        }
        push_metadata(&mut params, &session.metadata);

        let body = self.post_form("/v1/checkout/sessions", &params).await?;
        Ok(CreatedCheckoutSession {
            session_id: string_field(&body, "id")?,
            url: body["url"].as_str().map(String::from),
            client_secret: body["client_secret"].as_str().map(String::from),
        })
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> AppResult<CheckoutSession> {
        let body = self
            .get(&format!("/v1/checkout/sessions/{}", session_id))
            .await?;
        serde_json::from_value(body)
            .map_err(|e| AppError::Provider(format!("Unexpected checkout session shape: {}", e)))
    }
}

/// Verify a `Stripe-Signature` header (HMAC-SHA256 over `{t}.{payload}`)
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.trim().strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err("Invalid Stripe-Signature header");
    }

    if secret.is_empty() {
        return Err("Webhook secret is not configured");
    }

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    let within_tolerance = now
        .checked_sub(ts)
        .map(i64::unsigned_abs)
        .is_some_and(|age| age <= WEBHOOK_TOLERANCE_SECS);
    if !within_tolerance {
        return Err("Webhook timestamp outside tolerance");
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err("Webhook signature mismatch")
    }
}
