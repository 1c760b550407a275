//! Visitor availability search

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::{
    dates::{self, today_in},
    error::{AppError, AppResult},
    models::schedule::{AvailabilityQuery, OfferedSlot},
    repository::Repository,
};

#[derive(Clone)]
pub struct AvailabilityService {
    repository: Repository,
    timezone: Tz,
}

impl AvailabilityService {
    pub fn new(repository: Repository, timezone: Tz) -> Self {
        Self { repository, timezone }
    }

    /// Offerable slots for a visit type, from today (in the park's
    /// timezone) onwards
    pub async fn search(&self, query: &AvailabilityQuery) -> AppResult<Vec<OfferedSlot>> {
        self.search_on(query, today_in(self.timezone)).await
    }

    /// Same as [`search`](Self::search) with an explicit "today"
    pub async fn search_on(
        &self,
        query: &AvailabilityQuery,
        today: NaiveDate,
    ) -> AppResult<Vec<OfferedSlot>> {
        let visit_type = query.visit_type.trim();
        if visit_type.is_empty() {
            return Err(AppError::Validation("visit_type is required".to_string()));
        }
        if query.party_size == 0 {
            return Err(AppError::Validation("party_size must be at least 1".to_string()));
        }
        let date = match query.date.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(dates::parse_date(Some(raw), "date")?),
            _ => None,
        };

        let slots: Vec<OfferedSlot> = self
            .repository
            .schedules
            .list(Some(visit_type), date, Some(true))
            .await?
            .iter()
            .filter(|s| s.can_host(query.party_size))
            .filter(|s| s.date >= today)
            .map(OfferedSlot::from)
            .collect();

        tracing::debug!(
            visit_type,
            party_size = query.party_size,
            results = slots.len(),
            "Availability search"
        );
        Ok(slots)
    }
}
