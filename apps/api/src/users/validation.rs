use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::errors::AppError;
use crate::reminders::validation::double_option;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_LIST_ITEMS: usize = 50;
const MAX_LIST_ITEM_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 32;
const MAX_CONTACT_LEN: usize = 200;

const GENDERS: &[&str] = &["male", "female", "other", "prefer_not_to_say"];
const BLOOD_GROUPS: &[&str] = &["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

/// Body of `PATCH /api/v1/profile`. Absent fields are left unchanged;
/// an explicit `null` clears a nullable field.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdateRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub blood_group: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub height_cm: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub weight_kg: Option<Option<f64>>,
    pub allergies: Option<Vec<String>>,
    pub chronic_conditions: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub emergency_contact: Option<Option<String>>,
}

/// Validated, normalized profile changes ready for the repository.
/// Outer `None` keeps the stored value, `Some(None)` clears it.
#[derive(Debug, Default, PartialEq)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub gender: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub blood_group: Option<Option<String>>,
    pub height_cm: Option<Option<f64>>,
    pub weight_kg: Option<Option<f64>>,
    pub allergies: Option<Vec<String>>,
    pub chronic_conditions: Option<Vec<String>>,
    pub emergency_contact: Option<Option<String>>,
}

/// Validates the value of a nullable patch field, passing absence and `null` through.
fn patch<T, U>(
    field: Option<Option<T>>,
    check: impl FnOnce(T) -> Result<U, AppError>,
) -> Result<Option<Option<U>>, AppError> {
    match field {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(value)) => check(value).map(|v| Some(Some(v))),
    }
}

/// Blank free text clears the field like `null` does.
fn blank_to_null(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(|v| v.filter(|s| !s.trim().is_empty()))
}

impl ProfileUpdateRequest {
    pub fn validate(self, today: NaiveDate) -> Result<ProfileChanges, AppError> {
        let name = self.name.as_deref().map(validate_name).transpose()?;

        let date_of_birth = patch(self.date_of_birth, |dob| {
            if dob > today {
                return Err(AppError::Validation(
                    "date_of_birth cannot be in the future".to_string(),
                ));
            }
            if today.year() - dob.year() > 150 {
                return Err(AppError::Validation(
                    "date_of_birth is not plausible".to_string(),
                ));
            }
            Ok(dob)
        })?;

        let gender = patch(self.gender, |g| {
            let g = g.trim().to_lowercase();
            if GENDERS.contains(&g.as_str()) {
                Ok(g)
            } else {
                Err(AppError::Validation(format!(
                    "gender must be one of: {}",
                    GENDERS.join(", ")
                )))
            }
        })?;

        let phone = patch(blank_to_null(self.phone), |p| {
            bounded_text("phone", &p, MAX_PHONE_LEN)
        })?;

        let blood_group = patch(self.blood_group, |b| {
            let b = b.trim().to_uppercase();
            if BLOOD_GROUPS.contains(&b.as_str()) {
                Ok(b)
            } else {
                Err(AppError::Validation(format!(
                    "blood_group must be one of: {}",
                    BLOOD_GROUPS.join(", ")
                )))
            }
        })?;

        let height_cm = patch(self.height_cm, |h| in_range("height_cm", h, 30.0, 300.0))?;
        let weight_kg = patch(self.weight_kg, |w| in_range("weight_kg", w, 1.0, 700.0))?;

        let allergies = self
            .allergies
            .map(|l| normalize_list("allergies", l))
            .transpose()?;
        let chronic_conditions = self
            .chronic_conditions
            .map(|l| normalize_list("chronic_conditions", l))
            .transpose()?;

        let emergency_contact = patch(blank_to_null(self.emergency_contact), |c| {
            bounded_text("emergency_contact", &c, MAX_CONTACT_LEN)
        })?;

        Ok(ProfileChanges {
            name,
            date_of_birth,
            gender,
            phone,
            blood_group,
            height_cm,
            weight_kg,
            allergies,
            chronic_conditions,
            emergency_contact,
        })
    }
}

/// Trims and lowercases; rejects anything that is not shaped like `local@domain.tld`.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid || email.len() > 254 {
        return Err(AppError::Validation("a valid email is required".to_string()));
    }
    Ok(email)
}

pub fn validate_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Whole years between `dob` and `today`.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

fn bounded_text(field: &str, raw: &str, max: usize) -> Result<String, AppError> {
    let value = raw.trim();
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_string())
}

fn in_range(field: &str, value: f64, min: f64, max: f64) -> Result<f64, AppError> {
    if !value.is_finite() || value < min || value > max {
        return Err(AppError::Validation(format!(
            "{field} must be between {min} and {max}"
        )));
    }
    Ok(value)
}

/// Trims entries, drops empties, dedups case-insensitively keeping first spelling.
fn normalize_list(field: &str, items: Vec<String>) -> Result<Vec<String>, AppError> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if item.chars().count() > MAX_LIST_ITEM_LEN {
            return Err(AppError::Validation(format!(
                "{field} entries must be at most {MAX_LIST_ITEM_LEN} characters"
            )));
        }
        if out.iter().any(|existing| existing.eq_ignore_ascii_case(item)) {
            continue;
        }
        out.push(item.to_string());
    }
    if out.len() > MAX_LIST_ITEMS {
        return Err(AppError::Validation(format!(
            "{field} can hold at most {MAX_LIST_ITEMS} entries"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@Example.COM ").unwrap(), "jane@example.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email("a@@b.com").is_err());
        assert!(normalize_email("@b.com").is_err());
        assert!(normalize_email("a b@c.com").is_err());
    }

    #[test]
    fn test_empty_update_is_noop() {
        let changes = ProfileUpdateRequest::default().validate(today()).unwrap();
        assert_eq!(changes, ProfileChanges::default());
    }

    #[test]
    fn test_blood_group_normalized() {
        let req = ProfileUpdateRequest {
            blood_group: Some(Some(" ab+ ".into())),
            ..Default::default()
        };
        assert_eq!(
            req.validate(today()).unwrap().blood_group,
            Some(Some("AB+".to_string()))
        );
    }

    #[test]
    fn test_invalid_blood_group() {
        let req = ProfileUpdateRequest {
            blood_group: Some(Some("C+".into())),
            ..Default::default()
        };
        assert!(req.validate(today()).is_err());
    }

    #[test]
    fn test_future_birth_date_rejected() {
        let req = ProfileUpdateRequest {
            date_of_birth: Some(NaiveDate::from_ymd_opt(2030, 1, 1)),
            ..Default::default()
        };
        assert!(req.validate(today()).is_err());
    }

    #[test]
    fn test_height_out_of_range() {
        let req = ProfileUpdateRequest {
            height_cm: Some(Some(12.0)),
            ..Default::default()
        };
        let err = req.validate(today()).unwrap_err();
        assert!(err.to_string().contains("height_cm"));
    }

    #[test]
    fn test_list_normalization() {
        let req = ProfileUpdateRequest {
            allergies: Some(vec![
                " Peanuts ".into(),
                "".into(),
                "peanuts".into(),
                "Penicillin".into(),
            ]),
            ..Default::default()
        };
        let changes = req.validate(today()).unwrap();
        assert_eq!(
            changes.allergies.unwrap(),
            vec!["Peanuts".to_string(), "Penicillin".to_string()]
        );
    }

    #[test]
    fn test_list_too_long() {
        let req = ProfileUpdateRequest {
            chronic_conditions: Some((0..51).map(|i| format!("condition {i}")).collect()),
            ..Default::default()
        };
        assert!(req.validate(today()).is_err());
    }

    #[test]
    fn test_null_clears_and_absent_keeps() {
        let req: ProfileUpdateRequest = serde_json::from_str(
            r#"{"date_of_birth": null, "phone": "  ", "gender": "Female"}"#,
        )
        .unwrap();
        let changes = req.validate(today()).unwrap();
        assert_eq!(changes.date_of_birth, Some(None));
        assert_eq!(changes.phone, Some(None));
        assert_eq!(changes.gender, Some(Some("female".to_string())));
        assert_eq!(changes.blood_group, None);
        assert_eq!(changes.height_cm, None);
    }

    #[test]
    fn test_name_blank_rejected() {
        assert!(validate_name("   ").is_err());
        assert_eq!(validate_name("  Ana ").unwrap(), "Ana");
    }

    #[test]
    fn test_age_on_birthday_boundary() {
        let dob = NaiveDate::from_ymd_opt(1990, 6, 16).unwrap();
        assert_eq!(age_on(dob, today()), 33);
        let dob = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        assert_eq!(age_on(dob, today()), 34);
    }
}
