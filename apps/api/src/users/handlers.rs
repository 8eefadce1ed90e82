use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use tracing::info;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::user::Profile;
use crate::state::AppState;
use crate::users::avatar::{avatar_key, classify_upload, delete_avatar, get_avatar, put_avatar};
use crate::users::repo::UserRepo;
use crate::users::validation::ProfileUpdateRequest;

const AVATAR_FIELD: &str = "avatar";

/// GET /api/v1/profile
pub async fn handle_get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Profile>, AppError> {
    let row = UserRepo::get_by_id(&state.db, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    Ok(Json(row.into()))
}

/// PATCH /api/v1/profile
pub async fn handle_update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<Profile>, AppError> {
    let changes = req.validate(Utc::now().date_naive())?;
    let row = UserRepo::update_profile(&state.db, user.user_id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    Ok(Json(row.into()))
}

/// PUT /api/v1/profile/avatar
///
/// Multipart upload with a single `avatar` file field.
pub async fn handle_upload_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<Profile>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read avatar: {e}")))?;
        upload = Some((content_type, data));
        break;
    }

    let (content_type, data) = upload
        .ok_or_else(|| AppError::Validation(format!("missing '{AVATAR_FIELD}' file field")))?;
    let kind = classify_upload(content_type.as_deref(), &data, state.config.max_avatar_bytes)?;

    let key = avatar_key(user.user_id, kind);
    put_avatar(&state.s3, &state.config.s3_bucket, &key, kind, data).await?;

    let previous = UserRepo::set_avatar(&state.db, user.user_id, &key, kind.content_type()).await?;
    if let Some(previous) = previous.filter(|p| *p != key) {
        delete_avatar(&state.s3, &state.config.s3_bucket, &previous).await;
    }

    let row = UserRepo::get_by_id(&state.db, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    Ok(Json(row.into()))
}

/// GET /api/v1/profile/avatar
pub async fn handle_get_avatar(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let row = UserRepo::get_by_id(&state.db, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    let key = row
        .avatar_key
        .ok_or_else(|| AppError::NotFound("No avatar uploaded".to_string()))?;
    let content_type = row
        .avatar_content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let data = get_avatar(&state.s3, &state.config.s3_bucket, &key).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}

/// DELETE /api/v1/profile
///
/// Removes the account and everything hanging off it.
pub async fn handle_delete_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, AppError> {
    let row = UserRepo::delete(&state.db, user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    if let Some(key) = row.avatar_key {
        delete_avatar(&state.s3, &state.config.s3_bucket, &key).await;
    }

    info!("Deleted account {}", user.user_id);
    Ok(StatusCode::NO_CONTENT)
}
