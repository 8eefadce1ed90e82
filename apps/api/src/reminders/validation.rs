use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer};

use crate::errors::AppError;
use crate::models::reminder::ReminderRow;
use crate::reminders::schedule::TIME_FORMAT;

const MAX_MEDICATION_NAME_LEN: usize = 120;
const MAX_DOSAGE_LEN: usize = 60;
const MAX_INSTRUCTIONS_LEN: usize = 500;
const MAX_TIMES: usize = 12;
const MIN_OFFSET_MINUTES: i32 = -720;
const MAX_OFFSET_MINUTES: i32 = 840;

/// Body of `POST /api/v1/reminders`.
#[derive(Debug, Deserialize)]
pub struct CreateReminderRequest {
    pub medication_name: String,
    #[serde(default)]
    pub dosage: String,
    pub instructions: Option<String>,
    pub times: Vec<String>,
    #[serde(default)]
    pub days_of_week: Vec<i16>,
    /// Defaults to today (UTC) when absent.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Body of `PATCH /api/v1/reminders/:id`. `null` clears nullable fields.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateReminderRequest {
    pub medication_name: Option<String>,
    pub dosage: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub instructions: Option<Option<String>>,
    pub times: Option<Vec<String>>,
    pub days_of_week: Option<Vec<i16>>,
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<NaiveDate>>,
    pub utc_offset_minutes: Option<i32>,
    pub active: Option<bool>,
}

/// Distinguishes an explicit `null` (Some(None)) from an absent field (None).
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Complete reminder fields, validated and normalized before persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderDraft {
    pub medication_name: String,
    pub dosage: String,
    pub instructions: Option<String>,
    pub times: Vec<String>,
    pub days_of_week: Vec<i16>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub utc_offset_minutes: i32,
    pub active: bool,
}

impl ReminderDraft {
    pub fn from_create(req: CreateReminderRequest, today: NaiveDate) -> Self {
        Self {
            medication_name: req.medication_name,
            dosage: req.dosage,
            instructions: req.instructions,
            times: req.times,
            days_of_week: req.days_of_week,
            start_date: req.start_date.unwrap_or(today),
            end_date: req.end_date,
            utc_offset_minutes: req.utc_offset_minutes,
            active: req.active,
        }
    }

    pub fn from_row(row: &ReminderRow) -> Self {
        Self {
            medication_name: row.medication_name.clone(),
            dosage: row.dosage.clone(),
            instructions: row.instructions.clone(),
            times: row.times.clone(),
            days_of_week: row.days_of_week.clone(),
            start_date: row.start_date,
            end_date: row.end_date,
            utc_offset_minutes: row.utc_offset_minutes,
            active: row.active,
        }
    }

    pub fn apply(mut self, update: UpdateReminderRequest) -> Self {
        if let Some(v) = update.medication_name {
            self.medication_name = v;
        }
        if let Some(v) = update.dosage {
            self.dosage = v;
        }
        if let Some(v) = update.instructions {
            self.instructions = v;
        }
        if let Some(v) = update.times {
            self.times = v;
        }
        if let Some(v) = update.days_of_week {
            self.days_of_week = v;
        }
        if let Some(v) = update.start_date {
            self.start_date = v;
        }
        if let Some(v) = update.end_date {
            self.end_date = v;
        }
        if let Some(v) = update.utc_offset_minutes {
            self.utc_offset_minutes = v;
        }
        if let Some(v) = update.active {
            self.active = v;
        }
        self
    }

    pub fn validate(self) -> Result<Self, AppError> {
        let medication_name = self.medication_name.trim().to_string();
        if medication_name.is_empty() {
            return Err(AppError::Validation(
                "medication_name cannot be empty".to_string(),
            ));
        }
        check_len("medication_name", &medication_name, MAX_MEDICATION_NAME_LEN)?;

        let dosage = self.dosage.trim().to_string();
        check_len("dosage", &dosage, MAX_DOSAGE_LEN)?;

        let instructions = self
            .instructions
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty());
        if let Some(i) = &instructions {
            check_len("instructions", i, MAX_INSTRUCTIONS_LEN)?;
        }

        let times = normalize_times(&self.times)?;
        let days_of_week = normalize_days(&self.days_of_week)?;

        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(AppError::Validation(
                    "end_date cannot be before start_date".to_string(),
                ));
            }
        }

        if !(MIN_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&self.utc_offset_minutes) {
            return Err(AppError::Validation(format!(
                "utc_offset_minutes must be between {MIN_OFFSET_MINUTES} and {MAX_OFFSET_MINUTES}"
            )));
        }

        Ok(Self {
            medication_name,
            dosage,
            instructions,
            times,
            days_of_week,
            ..self
        })
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Parses `H:MM`/`HH:MM`, re-renders as zero-padded `HH:MM`, sorts and dedups.
fn normalize_times(raw: &[String]) -> Result<Vec<String>, AppError> {
    let mut parsed = raw
        .iter()
        .map(|t| {
            NaiveTime::parse_from_str(t.trim(), TIME_FORMAT).map_err(|_| {
                AppError::Validation(format!("invalid time '{t}', expected HH:MM"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    parsed.sort();
    parsed.dedup();

    if parsed.is_empty() {
        return Err(AppError::Validation(
            "at least one reminder time is required".to_string(),
        ));
    }
    if parsed.len() > MAX_TIMES {
        return Err(AppError::Validation(format!(
            "at most {MAX_TIMES} reminder times are allowed"
        )));
    }
    Ok(parsed
        .into_iter()
        .map(|t| t.format(TIME_FORMAT).to_string())
        .collect())
}

fn normalize_days(raw: &[i16]) -> Result<Vec<i16>, AppError> {
    if let Some(bad) = raw.iter().find(|d| !(0..=6).contains(*d)) {
        return Err(AppError::Validation(format!(
            "invalid day_of_week {bad}, expected 0 (Monday) to 6 (Sunday)"
        )));
    }
    let mut days = raw.to_vec();
    days.sort_unstable();
    days.dedup();
    // All seven days is the same as "every day".
    if days.len() == 7 {
        days.clear();
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    fn create(times: &[&str]) -> CreateReminderRequest {
        CreateReminderRequest {
            medication_name: "  Metformin ".into(),
            dosage: "500 mg".into(),
            instructions: Some("   ".into()),
            times: times.iter().map(|t| t.to_string()).collect(),
            days_of_week: vec![],
            start_date: None,
            end_date: None,
            utc_offset_minutes: 0,
            active: true,
        }
    }

    #[test]
    fn test_create_normalizes_fields() {
        let draft = ReminderDraft::from_create(create(&["20:00", "8:00", "08:00"]), today())
            .validate()
            .unwrap();
        assert_eq!(draft.medication_name, "Metformin");
        assert_eq!(draft.times, vec!["08:00", "20:00"]);
        assert_eq!(draft.instructions, None);
        assert_eq!(draft.start_date, today());
    }

    #[test]
    fn test_times_required_and_parsed() {
        assert!(ReminderDraft::from_create(create(&[]), today())
            .validate()
            .is_err());
        assert!(ReminderDraft::from_create(create(&["25:00"]), today())
            .validate()
            .is_err());
        assert!(ReminderDraft::from_create(create(&["noon"]), today())
            .validate()
            .is_err());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut req = create(&["08:00"]);
        req.end_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert!(ReminderDraft::from_create(req, today()).validate().is_err());
    }

    #[test]
    fn test_days_normalized() {
        let mut req = create(&["08:00"]);
        req.days_of_week = vec![4, 0, 4];
        let draft = ReminderDraft::from_create(req, today()).validate().unwrap();
        assert_eq!(draft.days_of_week, vec![0, 4]);

        let mut req = create(&["08:00"]);
        req.days_of_week = (0..7).collect();
        let draft = ReminderDraft::from_create(req, today()).validate().unwrap();
        assert!(draft.days_of_week.is_empty());

        let mut req = create(&["08:00"]);
        req.days_of_week = vec![7];
        assert!(ReminderDraft::from_create(req, today()).validate().is_err());
    }

    #[test]
    fn test_offset_bounds() {
        let mut req = create(&["08:00"]);
        req.utc_offset_minutes = 900;
        assert!(ReminderDraft::from_create(req, today()).validate().is_err());
    }

    #[test]
    fn test_update_null_clears_end_date() {
        let mut req = create(&["08:00"]);
        req.end_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        let draft = ReminderDraft::from_create(req, today()).validate().unwrap();

        let update: UpdateReminderRequest =
            serde_json::from_str(r#"{"end_date": null, "dosage": "850 mg"}"#).unwrap();
        let updated = draft.apply(update).validate().unwrap();
        assert_eq!(updated.end_date, None);
        assert_eq!(updated.dosage, "850 mg");
    }

    #[test]
    fn test_update_absent_fields_unchanged() {
        let draft = ReminderDraft::from_create(create(&["08:00"]), today())
            .validate()
            .unwrap();
        let update: UpdateReminderRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(draft.clone().apply(update).validate().unwrap(), draft);
    }
}
