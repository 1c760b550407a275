//! Schedule models (individual and bulk-generated visit slots)

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::dates::hhmm;

/// Time window of a schedule, discriminated by `mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleWindow {
    /// A single slot starting at `time`
    Individual {
        #[serde(with = "hhmm")]
        #[schema(value_type = String, example = "10:00")]
        time: NaiveTime,
    },
    /// One day of a batch generated over a date range
    Bulk {
        #[serde(with = "hhmm")]
        #[schema(value_type = String, example = "09:00")]
        start_time: NaiveTime,
        #[serde(with = "hhmm")]
        #[schema(value_type = String, example = "12:00")]
        end_time: NaiveTime,
    },
}

impl ScheduleWindow {
    /// Time offered to visitors: the slot time, or the start of a bulk window
    pub fn offered_time(&self) -> NaiveTime {
        match *self {
            ScheduleWindow::Individual { time } => time,
            ScheduleWindow::Bulk { start_time, .. } => start_time,
        }
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, ScheduleWindow::Bulk { .. })
    }
}

/// A bookable slot for a visit type, carrying its remaining capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Schedule {
    /// Deterministic key derived from visit type, date and time(s)
    pub id: String,
    pub visit_type: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub window: ScheduleWindow,
    pub available_slots: u32,
    pub active: bool,
}

impl Schedule {
    /// Whether visitors may book `party_size` people on this schedule
    pub fn can_host(&self, party_size: u32) -> bool {
        self.active && self.available_slots >= party_size
    }
}

/// Visitor-facing shape of a schedule; bulk windows are flattened to a
/// single start time
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OfferedSlot {
    pub schedule_id: String,
    pub visit_type: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "09:00")]
    pub time: NaiveTime,
    pub available_slots: u32,
}

impl From<&Schedule> for OfferedSlot {
    fn from(s: &Schedule) -> Self {
        Self {
            schedule_id: s.id.clone(),
            visit_type: s.visit_type.clone(),
            date: s.date,
            time: s.window.offered_time(),
            available_slots: s.available_slots,
        }
    }
}

/// Create individual schedule request
///
/// Fields are optional at the wire level so missing values surface as
/// validation errors instead of deserialization rejections.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateIndividualSchedule {
    pub visit_type: Option<String>,
    /// Date (YYYY-MM-DD)
    pub date: Option<String>,
    /// Time (HH:MM)
    pub time: Option<String>,
    /// Non-negative integer, as a number or a numeric string
    #[schema(value_type = Object)]
    pub available_slots: serde_json::Value,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Create bulk schedule request (one schedule per day of the range)
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateBulkSchedule {
    pub visit_type: Option<String>,
    /// First day (YYYY-MM-DD)
    pub start_date: Option<String>,
    /// Last day, inclusive (YYYY-MM-DD)
    pub end_date: Option<String>,
    /// Window start (HH:MM)
    pub start_time: Option<String>,
    /// Window end (HH:MM)
    pub end_time: Option<String>,
    #[schema(value_type = Object)]
    pub available_slots: serde_json::Value,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Edit request for an existing schedule through the single-slot form
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateSchedule {
    pub date: Option<String>,
    pub time: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub available_slots: Option<serde_json::Value>,
    pub active: Option<bool>,
}

/// Toggle request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetScheduleActive {
    pub active: bool,
}

/// Result of a bulk generation
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkScheduleResult {
    /// Ids of the schedules written, in date order
    pub schedule_ids: Vec<String>,
}

/// Admin listing filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ScheduleQuery {
    pub visit_type: Option<String>,
    /// From this date, inclusive (YYYY-MM-DD)
    pub from: Option<String>,
    /// Until this date, inclusive (YYYY-MM-DD)
    pub to: Option<String>,
}

/// Visitor availability search
#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
pub struct AvailabilityQuery {
    pub visit_type: String,
    /// Restrict to one day (YYYY-MM-DD)
    pub date: Option<String>,
    #[serde(default = "default_party_size")]
    pub party_size: u32,
}

fn default_active() -> bool {
    true
}

fn default_party_size() -> u32 {
    1
}
