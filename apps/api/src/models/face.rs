use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct FaceDescriptorRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: Option<String>,
    pub descriptor: Vec<f64>,
    pub created_at: DateTime<Utc>,
}

/// Enrollment metadata; the vector itself never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct FaceEnrollment {
    pub id: Uuid,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FaceDescriptorRow> for FaceEnrollment {
    fn from(row: FaceDescriptorRow) -> Self {
        Self {
            id: row.id,
            label: row.label,
            created_at: row.created_at,
        }
    }
}
