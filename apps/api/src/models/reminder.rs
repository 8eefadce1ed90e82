use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReminderRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub instructions: Option<String>,
    /// Wall-clock `HH:MM` times, sorted ascending.
    pub times: Vec<String>,
    /// 0 = Monday .. 6 = Sunday. Empty means every day.
    pub days_of_week: Vec<i16>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub utc_offset_minutes: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DoseRow {
    pub id: Uuid,
    pub reminder_id: Uuid,
    pub user_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
    pub status: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    Due,
    Taken,
    Skipped,
}

impl DoseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoseStatus::Due => "due",
            DoseStatus::Taken => "taken",
            DoseStatus::Skipped => "skipped",
        }
    }
}
