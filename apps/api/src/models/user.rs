use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Full `users` row. Never serialized directly: it carries the password hash.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub google_sub: Option<String>,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub blood_group: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub allergies: Vec<String>,
    pub chronic_conditions: Vec<String>,
    pub emergency_contact: Option<String>,
    pub avatar_key: Option<String>,
    pub avatar_content_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User model safe for client responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub has_password: bool,
    pub google_linked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRow> for PublicUser {
    fn from(row: &UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email.clone(),
            name: row.name.clone(),
            has_password: row.password_hash.is_some(),
            google_linked: row.google_sub.is_some(),
            created_at: row.created_at,
        }
    }
}

/// Health profile as returned by `GET /api/v1/profile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub blood_group: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub allergies: Vec<String>,
    pub chronic_conditions: Vec<String>,
    pub emergency_contact: Option<String>,
    pub has_avatar: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for Profile {
    fn from(row: UserRow) -> Self {
        Self {
            has_avatar: row.avatar_key.is_some(),
            id: row.id,
            email: row.email,
            name: row.name,
            date_of_birth: row.date_of_birth,
            gender: row.gender,
            phone: row.phone,
            blood_group: row.blood_group,
            height_cm: row.height_cm,
            weight_kg: row.weight_kg,
            allergies: row.allergies,
            chronic_conditions: row.chronic_conditions,
            emergency_contact: row.emergency_contact,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
