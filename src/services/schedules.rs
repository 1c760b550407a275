//! Schedules service: individual and bulk generation, admin edits

use serde_json::Value;

use crate::{
    dates::{self, bulk_key, enumerate_dates, individual_key},
    error::{AppError, AppResult},
    models::schedule::{
        BulkScheduleResult, CreateBulkSchedule, CreateIndividualSchedule, Schedule,
        ScheduleQuery, ScheduleWindow, UpdateSchedule,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct SchedulesService {
    repository: Repository,
}

impl SchedulesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get(&self, id: &str) -> AppResult<Schedule> {
        self.repository.schedules.get_by_id(id).await
    }

    /// Admin listing, ordered by date then offered time
    pub async fn list(&self, query: &ScheduleQuery) -> AppResult<Vec<Schedule>> {
        let from = optional_date(query.from.as_deref(), "from")?;
        let to = optional_date(query.to.as_deref(), "to")?;
        let visit_type = query.visit_type.as_deref().filter(|v| !v.trim().is_empty());

        let rows = self.repository.schedules.list(visit_type, None, None).await?;
        Ok(rows
            .into_iter()
            .filter(|s| from.map_or(true, |f| s.date >= f))
            .filter(|s| to.map_or(true, |t| s.date <= t))
            .collect())
    }

    /// Create or merge a single-slot schedule at its deterministic key
    pub async fn create_individual(&self, data: &CreateIndividualSchedule) -> AppResult<Schedule> {
        let visit_type = required_text(data.visit_type.as_deref(), "visit_type")?;
        let date = dates::parse_date(data.date.as_deref(), "date")?;
        let time = dates::parse_time(data.time.as_deref(), "time")?;
        let available_slots = parse_slot_count(&data.available_slots)?;

        let schedule = Schedule {
            id: individual_key(visit_type, date, time),
            visit_type: visit_type.to_string(),
            date,
            window: ScheduleWindow::Individual { time },
            available_slots,
            active: data.active,
        };
        self.repository.schedules.upsert(&schedule).await?;

        tracing::info!(
            schedule_id = %schedule.id,
            available_slots,
            "Individual schedule saved"
        );
        Ok(schedule)
    }

    /// Create or merge one schedule per calendar day of an inclusive range.
    ///
    /// Days are written one by one; the first failed write stops the run and
    /// earlier days stay persisted. Resubmitting the same range is safe.
    pub async fn create_bulk(&self, data: &CreateBulkSchedule) -> AppResult<BulkScheduleResult> {
        let visit_type = required_text(data.visit_type.as_deref(), "visit_type")?;
        let start_date = dates::parse_date(data.start_date.as_deref(), "start_date")?;
        let end_date = dates::parse_date(data.end_date.as_deref(), "end_date")?;
        let start_time = dates::parse_time(data.start_time.as_deref(), "start_time")?;
        let end_time = dates::parse_time(data.end_time.as_deref(), "end_time")?;
        let available_slots = parse_slot_count(&data.available_slots)?;

        if start_date > end_date {
            return Err(AppError::Validation(
                "start_date must be on or before end_date".to_string(),
            ));
        }
        if start_time >= end_time {
            return Err(AppError::Validation(
                "start_time must be before end_time".to_string(),
            ));
        }

        let days = enumerate_dates(start_date, end_date);
        let total = days.len();
        let mut schedule_ids = Vec::with_capacity(total);

        for date in days {
            let schedule = Schedule {
                id: bulk_key(visit_type, date, start_time, end_time),
                visit_type: visit_type.to_string(),
                date,
                window: ScheduleWindow::Bulk { start_time, end_time },
                available_slots,
                active: data.active,
            };

            if let Err(e) = self.repository.schedules.upsert(&schedule).await {
                tracing::warn!(
                    schedule_id = %schedule.id,
                    written = schedule_ids.len(),
                    total,
                    "Bulk schedule generation interrupted: {}",
                    e
                );
                return Err(AppError::Provider(format!(
                    "Failed to write schedule for {}: {} of {} day(s) written ({})",
                    date.format(dates::DATE_FORMAT),
                    schedule_ids.len(),
                    total,
                    e
                )));
            }
            schedule_ids.push(schedule.id);
        }

        tracing::info!(
            visit_type,
            days = total,
            available_slots,
            "Bulk schedules saved"
        );
        Ok(BulkScheduleResult { schedule_ids })
    }

    /// Edit a schedule through the single-slot form.
    ///
    /// Capacity and visibility changes are merged in place. When the date or
    /// time changes, or a bulk-generated day is edited, the schedule becomes
    /// an individual slot stored at the key of its new date and time: a
    /// bulk day is detached from the rest of its range. A move fails with
    /// `Conflict` if another schedule holds that key or a booking took slots
    /// while the edit was in flight.
    pub async fn edit_existing(&self, id: &str, patch: &UpdateSchedule) -> AppResult<Schedule> {
        let current = self.repository.schedules.get_by_id(id).await?;

        let date = match patch.date.as_deref() {
            Some(raw) => dates::parse_date(Some(raw), "date")?,
            None => current.date,
        };
        let time = match patch.time.as_deref() {
            Some(raw) => dates::parse_time(Some(raw), "time")?,
            None => current.window.offered_time(),
        };
        let available_slots = patch.available_slots.as_ref().map(parse_slot_count).transpose()?;

        let key = individual_key(&current.visit_type, date, time);
        if key == current.id {
            return self
                .repository
                .schedules
                .patch(id, available_slots, patch.active)
                .await;
        }

        let moved = Schedule {
            id: key,
            visit_type: current.visit_type.clone(),
            date,
            window: ScheduleWindow::Individual { time },
            available_slots: available_slots.unwrap_or(current.available_slots),
            active: patch.active.unwrap_or(current.active),
        };
        self.repository.schedules.relocate(&current, &moved).await?;

        tracing::info!(
            from = %current.id,
            to = %moved.id,
            detached = current.window.is_bulk(),
            "Schedule moved to a new key"
        );
        Ok(moved)
    }

    pub async fn set_active(&self, id: &str, active: bool) -> AppResult<Schedule> {
        let schedule = self.repository.schedules.set_active(id, active).await?;
        tracing::info!(schedule_id = %id, active, "Schedule visibility changed");
        Ok(schedule)
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.repository.schedules.delete(id).await?;
        tracing::info!(schedule_id = %id, "Schedule deleted");
        Ok(())
    }
}

/// Capacity from a form value: a non-negative integer, as a JSON number or
/// a numeric string
pub fn parse_slot_count(value: &Value) -> AppResult<u32> {
    let invalid = || AppError::Validation("available_slots must be a non-negative integer".to_string());
    match value {
        Value::Null => Err(AppError::Validation("available_slots is required".to_string())),
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(invalid),
        Value::String(s) => s.trim().parse::<u32>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn required_text<'a>(value: Option<&'a str>, field: &str) -> AppResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", field))),
    }
}

fn optional_date(value: Option<&str>, field: &str) -> AppResult<Option<chrono::NaiveDate>> {
    match value {
        Some(raw) if !raw.trim().is_empty() => dates::parse_date(Some(raw), field).map(Some),
        _ => Ok(None),
    }
}
