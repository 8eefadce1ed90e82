use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::reminder::{DoseRow, DoseStatus, ReminderRow};
use crate::reminders::repo::{DoseRepo, ReminderRepo};
use crate::reminders::schedule::Schedule;
use crate::reminders::validation::{CreateReminderRequest, ReminderDraft, UpdateReminderRequest};
use crate::state::AppState;

const DEFAULT_UPCOMING_HOURS: i64 = 24;
const MAX_UPCOMING_HOURS: i64 = 168;
const DEFAULT_DOSE_LIMIT: i64 = 50;
const MAX_DOSE_LIMIT: i64 = 500;
/// How far ahead `next_dose_at` looks.
const NEXT_DOSE_HORIZON_DAYS: i64 = 31;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ReminderView {
    #[serde(flatten)]
    pub reminder: ReminderRow,
    pub next_dose_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingQuery {
    pub hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UpcomingDose {
    pub reminder_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RecordDoseRequest {
    pub scheduled_for: DateTime<Utc>,
    pub status: DoseStatus,
}

#[derive(Debug, Deserialize)]
pub struct DoseListQuery {
    pub limit: Option<i64>,
}

fn to_view(row: ReminderRow, now: DateTime<Utc>) -> ReminderView {
    let next_dose_at = Schedule::from_row(&row)
        .ok()
        .and_then(|s| s.next_after(now, Duration::days(NEXT_DOSE_HORIZON_DAYS)));
    ReminderView {
        reminder: row,
        next_dose_at,
    }
}

async fn load_owned(state: &AppState, id: Uuid, user_id: Uuid) -> Result<ReminderRow, AppError> {
    ReminderRepo::get(&state.db, id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reminder {id} not found")))
}

// ────────────────────────────────────────────────────────────────────────────
// CRUD
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/reminders
pub async fn handle_create_reminder(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateReminderRequest>,
) -> Result<(StatusCode, Json<ReminderView>), AppError> {
    let now = Utc::now();
    let draft = ReminderDraft::from_create(req, now.date_naive()).validate()?;
    let row = ReminderRepo::create(&state.db, user.user_id, &draft).await?;
    tracing::info!("Created reminder {} for user {}", row.id, user.user_id);
    Ok((StatusCode::CREATED, Json(to_view(row, now))))
}

/// GET /api/v1/reminders
pub async fn handle_list_reminders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ReminderView>>, AppError> {
    let now = Utc::now();
    let rows = ReminderRepo::list_for_user(&state.db, user.user_id).await?;
    Ok(Json(rows.into_iter().map(|r| to_view(r, now)).collect()))
}

/// GET /api/v1/reminders/:id
pub async fn handle_get_reminder(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ReminderView>, AppError> {
    let row = load_owned(&state, id, user.user_id).await?;
    Ok(Json(to_view(row, Utc::now())))
}

/// PATCH /api/v1/reminders/:id
pub async fn handle_update_reminder(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateReminderRequest>,
) -> Result<Json<ReminderView>, AppError> {
    let existing = load_owned(&state, id, user.user_id).await?;
    let draft = ReminderDraft::from_row(&existing).apply(req).validate()?;
    let row = ReminderRepo::update(&state.db, id, user.user_id, &draft)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reminder {id} not found")))?;
    Ok(Json(to_view(row, Utc::now())))
}

/// DELETE /api/v1/reminders/:id
pub async fn handle_delete_reminder(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !ReminderRepo::delete(&state.db, id, user.user_id).await? {
        return Err(AppError::NotFound(format!("Reminder {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Schedule & doses
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/reminders/upcoming?hours=N
pub async fn handle_upcoming(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<UpcomingQuery>,
) -> Result<Json<Vec<UpcomingDose>>, AppError> {
    let hours = query.hours.unwrap_or(DEFAULT_UPCOMING_HOURS);
    if !(1..=MAX_UPCOMING_HOURS).contains(&hours) {
        return Err(AppError::Validation(format!(
            "hours must be between 1 and {MAX_UPCOMING_HOURS}"
        )));
    }

    let now = Utc::now();
    let rows = ReminderRepo::list_for_user(&state.db, user.user_id).await?;
    Ok(Json(upcoming_doses(&rows, now, now + Duration::hours(hours))))
}

/// Upcoming doses across `rows` in `(from, to]`, sorted by time.
pub fn upcoming_doses(
    rows: &[ReminderRow],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<UpcomingDose> {
    let mut doses: Vec<UpcomingDose> = rows
        .iter()
        .filter_map(|row| Schedule::from_row(row).ok().map(|s| (row, s)))
        .flat_map(|(row, schedule)| {
            schedule
                .occurrences_between(from, to)
                .into_iter()
                .map(move |scheduled_for| UpcomingDose {
                    reminder_id: row.id,
                    medication_name: row.medication_name.clone(),
                    dosage: row.dosage.clone(),
                    scheduled_for,
                })
        })
        .collect();
    doses.sort_by_key(|d| d.scheduled_for);
    doses
}

/// POST /api/v1/reminders/:id/doses
pub async fn handle_record_dose(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<RecordDoseRequest>,
) -> Result<Json<DoseRow>, AppError> {
    if req.status == DoseStatus::Due {
        return Err(AppError::Validation(
            "status must be 'taken' or 'skipped'".to_string(),
        ));
    }

    let row = load_owned(&state, id, user.user_id).await?;
    let schedule = Schedule::from_row(&row)?;
    if !schedule.is_occurrence(req.scheduled_for) {
        return Err(AppError::UnprocessableEntity(format!(
            "{} is not a scheduled time for this reminder",
            req.scheduled_for
        )));
    }

    let dose = DoseRepo::upsert(&state.db, id, user.user_id, req.scheduled_for, req.status).await?;
    Ok(Json(dose))
}

/// GET /api/v1/reminders/:id/doses?limit=N
pub async fn handle_list_doses(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<DoseListQuery>,
) -> Result<Json<Vec<DoseRow>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DOSE_LIMIT)
        .clamp(1, MAX_DOSE_LIMIT);
    load_owned(&state, id, user.user_id).await?;
    let doses = DoseRepo::list_for_reminder(&state.db, id, user.user_id, limit).await?;
    Ok(Json(doses))
}

/// GET /api/v1/reminders/due
pub async fn handle_list_due(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<DoseRow>>, AppError> {
    let doses = DoseRepo::list_due_for_user(&state.db, user.user_id).await?;
    Ok(Json(doses))
}
