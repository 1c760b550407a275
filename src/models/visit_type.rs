//! Visit type catalog model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// A bookable category of visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VisitType {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Price per person in major currency units
    #[schema(value_type = String, example = "12.50")]
    pub price: Decimal,
    /// Recurrence label shown on the card (e.g. "every Saturday")
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub features: Vec<String>,
    pub active: bool,
    /// Display position, string-encoded integer
    pub order: String,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: Option<String>,
}

impl VisitType {
    /// Numeric display position; unparseable values sort last
    pub fn position(&self) -> i64 {
        self.order.trim().parse().unwrap_or(i64::MAX)
    }
}

/// Create visit type request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateVisitType {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[schema(value_type = String, example = "12.50")]
    pub price: Decimal,
    #[serde(default)]
    pub frequency: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Update visit type request (merge semantics)
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateVisitType {
    #[validate(length(min = 1, max = 120))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Reorder request: visit type ids in their new display order
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReorderVisitTypes {
    pub ids: Vec<String>,
}

/// Catalog listing parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct VisitTypeQuery {
    /// Include inactive visit types (admins only)
    #[serde(default)]
    pub include_inactive: bool,
}

fn default_active() -> bool {
    true
}

/// Document id derived from a visit type name
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Visita Guidata  -- Farfalle!"), "visita-guidata-farfalle");
        assert_eq!(slugify("  School trip 2025 "), "school-trip-2025");
        assert_eq!(slugify("Città è bella"), "citt-bella");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn position_parses_order() {
        let mut vt = VisitType {
            id: "a".into(),
            name: "A".into(),
            description: String::new(),
            price: Decimal::new(1000, 2),
            frequency: String::new(),
            features: vec![],
            active: true,
            order: "3".into(),
            stripe_product_id: None,
            stripe_price_id: None,
        };
        assert_eq!(vt.position(), 3);
        vt.order = "x".into();
        assert_eq!(vt.position(), i64::MAX);
    }
}
