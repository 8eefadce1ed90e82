//! Expands a reminder's wall-clock schedule into UTC instants.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use crate::models::reminder::ReminderRow;

pub const TIME_FORMAT: &str = "%H:%M";
/// Upper bound on the span a single expansion may cover.
const MAX_SPAN_DAYS: i64 = 400;

/// Parsed, ready-to-expand view of a reminder.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub reminder_id: Uuid,
    pub user_id: Uuid,
    pub times: Vec<NaiveTime>,
    pub days_of_week: Vec<u32>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub utc_offset_minutes: i32,
    pub active: bool,
}

impl Schedule {
    pub fn from_row(row: &ReminderRow) -> Result<Self> {
        let times = row
            .times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t, TIME_FORMAT)
                    .with_context(|| format!("Reminder {} has invalid time '{t}'", row.id))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            reminder_id: row.id,
            user_id: row.user_id,
            times,
            days_of_week: row
                .days_of_week
                .iter()
                .filter_map(|d| u32::try_from(*d).ok())
                .collect(),
            start_date: row.start_date,
            end_date: row.end_date,
            utc_offset_minutes: row.utc_offset_minutes,
            active: row.active,
        })
    }

    fn runs_on(&self, date: NaiveDate) -> bool {
        if date < self.start_date {
            return false;
        }
        if self.end_date.is_some_and(|end| date > end) {
            return false;
        }
        self.days_of_week.is_empty()
            || self
                .days_of_week
                .contains(&date.weekday().num_days_from_monday())
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        (instant.naive_utc() + Duration::minutes(self.utc_offset_minutes as i64)).date()
    }

    /// Every scheduled instant in `(from, to]`, ascending.
    pub fn occurrences_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        if !self.active || to <= from {
            return Vec::new();
        }
        let to = to.min(from + Duration::days(MAX_SPAN_DAYS));

        let offset = Duration::minutes(self.utc_offset_minutes as i64);
        let mut out = Vec::new();
        let mut date = self.local_date(from);
        let last = self.local_date(to);

        while date <= last {
            if self.runs_on(date) {
                for time in &self.times {
                    let instant = Utc.from_utc_datetime(&(date.and_time(*time) - offset));
                    if instant > from && instant <= to {
                        out.push(instant);
                    }
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        out.sort();
        out
    }

    /// First scheduled instant strictly after `after`, looking ahead up to `horizon`.
    pub fn next_after(&self, after: DateTime<Utc>, horizon: Duration) -> Option<DateTime<Utc>> {
        self.occurrences_between(after, after + horizon)
            .into_iter()
            .next()
    }

    pub fn is_occurrence(&self, instant: DateTime<Utc>) -> bool {
        self.occurrences_between(instant - Duration::seconds(1), instant)
            .contains(&instant)
    }
}
