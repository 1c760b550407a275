//! Papilio reservation server
//!
//! REST JSON backend for a butterfly park and botanical garden: visit type
//! catalog, schedule generation, availability search and paid reservations
//! with a slot ledger that never oversells.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod dates;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
