//! Recurring schedule overrides
//!
//! A weekday override is stored as one concrete row per matching date in the
//! schedule's range, keyed on (schedule, date, room, practitioner) so that
//! repeating an expansion updates rows in place.

use crate::errors::{AppError, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Parse a weekday name, full or three-letter, in any case
pub fn parse_weekday(raw: &str) -> Result<Weekday> {
    // chrono accepts both "mon" and "monday" case-insensitively
    raw.trim().parse::<Weekday>().map_err(|_| AppError::Validation {
        message: format!("'{}' is not a weekday", raw),
        field: Some("weekday".to_string()),
    })
}

/// Every date in `[start, end]` falling on `weekday`, ascending
pub fn expand_weekday(start: NaiveDate, end: NaiveDate, weekday: Weekday) -> Vec<NaiveDate> {
    if end < start {
        return Vec::new();
    }

    let offset = (7 + weekday.num_days_from_monday() as i64 - start.weekday().num_days_from_monday() as i64) % 7;
    let mut dates = Vec::new();
    let mut current = start + Duration::days(offset);
    while current <= end {
        dates.push(current);
        current += Duration::days(7);
    }
    dates
}

/// Body of `POST /schedules`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CreateScheduleRequest {
    pub fn check_range(&self) -> Result<()> {
        if self.end_date < self.start_date {
            return Err(AppError::Validation {
                message: "endDate must not be before startDate".to_string(),
                field: Some("endDate".to_string()),
            });
        }
        Ok(())
    }
}

/// Body of `POST /schedules/{id}/overrides/weekday`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WeekdayOverrideRequest {
    pub weekday: String,
    #[validate(range(min = 1, max = 99))]
    pub room_number: i32,
    pub practitioner_id: Uuid,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub is_available: bool,
    /// Narrows the schedule's range
    pub from: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

/// One concrete override ready to be upserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSlot {
    pub schedule_id: Uuid,
    pub date: NaiveDate,
    pub room_number: i32,
    pub practitioner_id: Uuid,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_available: bool,
}

impl WeekdayOverrideRequest {
    /// Expand the request over a schedule's date range
    pub fn expand(&self, schedule_id: Uuid, start: NaiveDate, end: NaiveDate) -> Result<Vec<OverrideSlot>> {
        let weekday = parse_weekday(&self.weekday)?;

        if let (Some(start_time), Some(end_time)) = (self.start_time, self.end_time) {
            if end_time <= start_time {
                return Err(AppError::Validation {
                    message: "endTime must be after startTime".to_string(),
                    field: Some("endTime".to_string()),
                });
            }
        }

        let start = self.from.map_or(start, |from| from.max(start));
        let end = self.until.map_or(end, |until| until.min(end));

        Ok(expand_weekday(start, end, weekday)
            .into_iter()
            .map(|date| OverrideSlot {
                schedule_id,
                date,
                room_number: self.room_number,
                practitioner_id: self.practitioner_id,
                start_time: self.start_time,
                end_time: self.end_time,
                is_available: self.is_available,
            })
            .collect())
    }
}
