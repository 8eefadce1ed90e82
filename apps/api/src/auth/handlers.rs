use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::face::{
    find_best_match, validate_descriptor, FaceMatch, MAX_DESCRIPTORS_PER_USER,
};
use crate::auth::google::GoogleAuthError;
use crate::auth::password::{
    hash_password, validate_password_policy, verify_against_dummy, verify_password,
};
use crate::auth::repo::{FaceDescriptorRepo, RefreshTokenRepo};
use crate::auth::tokens::{create_access_token, generate_refresh_token, hash_refresh_token};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::face::FaceEnrollment;
use crate::models::token::RefreshTokenRow;
use crate::models::user::{PublicUser, UserRow};
use crate::state::AppState;
use crate::users::repo::{NewUser, UserRepo};
use crate::users::validation::{normalize_email, validate_name};

const INVALID_LOGIN: &str = "Invalid email or password";
const FACE_NOT_RECOGNIZED: &str = "Face not recognized";
const MAX_LABEL_LEN: usize = 60;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    pub credential: String,
}

#[derive(Debug, Deserialize)]
pub struct FaceEnrollRequest {
    pub descriptor: Vec<f64>,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FaceLoginRequest {
    pub descriptor: Vec<f64>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

#[derive(Debug, Serialize)]
pub struct FaceLoginResponse {
    #[serde(flatten)]
    pub session: AuthResponse,
    pub distance: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Session helpers
// ────────────────────────────────────────────────────────────────────────────

/// Issues an access token plus a stored (hashed) refresh token.
async fn issue_tokens(state: &AppState, user: &UserRow) -> Result<TokenResponse, AppError> {
    let ttl = state.config.access_token_ttl_secs;
    let access_token = create_access_token(user.id, &user.email, &state.config.jwt_secret, ttl)?;

    let (raw_refresh, refresh_hash) = generate_refresh_token();
    let expires_at = Utc::now() + Duration::days(state.config.refresh_token_ttl_days);
    RefreshTokenRepo::create(&state.db, &refresh_hash, user.id, expires_at).await?;

    Ok(TokenResponse {
        access_token,
        refresh_token: raw_refresh,
        token_type: "Bearer",
        expires_in: ttl,
    })
}

async fn issue_session(state: &AppState, user: &UserRow) -> Result<AuthResponse, AppError> {
    Ok(AuthResponse {
        user: PublicUser::from(user),
        tokens: issue_tokens(state, user).await?,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Password auth
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/auth/register
#[tracing::instrument(skip(state, req))]
pub async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let name = validate_name(&req.name)?;
    let email = normalize_email(&req.email)?;
    validate_password_policy(&req.password)?;

    let password_hash = hash_password(&req.password)?;
    let user = UserRepo::create(
        &state.db,
        NewUser {
            email: &email,
            name: &name,
            password_hash: Some(&password_hash),
            google_sub: None,
        },
    )
    .await?
    .ok_or_else(|| AppError::Conflict("An account with this email already exists".to_string()))?;

    info!("Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(issue_session(&state, &user).await?)))
}

/// POST /api/v1/auth/login
#[tracing::instrument(skip(state, req))]
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let invalid = || AppError::InvalidCredentials(INVALID_LOGIN.to_string());

    let email = normalize_email(&req.email).map_err(|_| invalid())?;
    let user = UserRepo::get_by_email(&state.db, &email).await?;

    // Unknown emails and Google-only accounts still pay for one hash check.
    let Some((user, password_hash)) = user.and_then(|u| {
        let hash = u.password_hash.clone()?;
        Some((u, hash))
    }) else {
        verify_against_dummy(&req.password);
        return Err(invalid());
    };
    if !verify_password(&req.password, &password_hash)? {
        return Err(invalid());
    }

    Ok(Json(issue_session(&state, &user).await?))
}

/// POST /api/v1/auth/refresh
///
/// Rotates the refresh token: the presented one is consumed.
#[tracing::instrument(skip(state, req))]
pub async fn handle_refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let invalid = || AppError::InvalidCredentials("Invalid refresh token".to_string());
    let token_hash = hash_refresh_token(req.refresh_token.trim());

    let token_row = RefreshTokenRepo::get_by_hash(&state.db, &token_hash)
        .await?
        .ok_or_else(invalid)?;

    // Consumed whether valid or expired; losing the race means someone else rotated it.
    let consumed = RefreshTokenRepo::delete(&state.db, &token_hash).await?;
    let user_id = check_refresh(&token_row, consumed, Utc::now())?;

    let user = UserRepo::get_by_id(&state.db, user_id)
        .await?
        .ok_or_else(invalid)?;

    Ok(Json(issue_tokens(&state, &user).await?))
}

/// Outcome of presenting a refresh token whose row was found. `consumed` is
/// whether this request deleted the row; only the request that did may rotate.
pub fn check_refresh(
    row: &RefreshTokenRow,
    consumed: bool,
    now: DateTime<Utc>,
) -> Result<Uuid, AppError> {
    if !consumed {
        return Err(AppError::InvalidCredentials(
            "Invalid refresh token".to_string(),
        ));
    }
    if row.expires_at < now {
        return Err(AppError::InvalidCredentials(
            "Refresh token expired".to_string(),
        ));
    }
    Ok(row.user_id)
}

/// POST /api/v1/auth/logout
#[tracing::instrument(skip(state, req))]
pub async fn handle_logout(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    let token_hash = hash_refresh_token(req.refresh_token.trim());
    RefreshTokenRepo::delete(&state.db, &token_hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/auth/me
pub async fn handle_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let row = UserRepo::get_by_id(&state.db, user.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(PublicUser::from(&row)))
}

// ────────────────────────────────────────────────────────────────────────────
// Google sign-in
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/auth/google
///
/// Just-in-time provisioning:
/// 1. A user already linked to this Google subject → that user
/// 2. A user with the token's email → link the subject, return that user
/// 3. Otherwise create a password-less user
#[tracing::instrument(skip(state, req))]
pub async fn handle_google_login(
    State(state): State<AppState>,
    Json(req): Json<GoogleLoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if !state.google.is_configured() {
        return Err(AppError::NotFound(
            "Google sign-in is not configured".to_string(),
        ));
    }
    if req.credential.trim().is_empty() {
        return Err(AppError::Validation("credential is required".to_string()));
    }

    let identity = state
        .google
        .verify(req.credential.trim())
        .await
        .map_err(|e| match e {
            GoogleAuthError::NotConfigured => {
                AppError::NotFound("Google sign-in is not configured".to_string())
            }
            GoogleAuthError::Http(e) => {
                AppError::Internal(anyhow::anyhow!("Google token verification failed: {e}"))
            }
            other => {
                tracing::debug!("Google token rejected: {other}");
                AppError::InvalidCredentials("Invalid Google credential".to_string())
            }
        })?;

    let user = if let Some(user) = UserRepo::get_by_google_sub(&state.db, &identity.sub).await? {
        user
    } else if let Some(user) = UserRepo::get_by_email(&state.db, &identity.email).await? {
        info!("Linking existing user {} to Google account", user.id);
        UserRepo::link_google(&state.db, user.id, &identity.sub).await?
    } else {
        let name = identity
            .name
            .clone()
            .unwrap_or_else(|| default_name_for(&identity.email));
        let name = validate_name(&name).unwrap_or_else(|_| default_name_for(&identity.email));
        let user = UserRepo::create(
            &state.db,
            NewUser {
                email: &identity.email,
                name: &name,
                password_hash: None,
                google_sub: Some(&identity.sub),
            },
        )
        .await?
        .ok_or_else(|| AppError::Conflict("Account already exists".to_string()))?;
        info!("Provisioned user {} from Google sign-in", user.id);
        user
    };

    Ok(Json(issue_session(&state, &user).await?))
}

/// Local part of the email, used when Google gives no display name.
fn default_name_for(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    local.chars().take(crate::users::validation::MAX_NAME_LEN).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Face identification
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/auth/face/enroll
pub async fn handle_face_enroll(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<FaceEnrollRequest>,
) -> Result<(StatusCode, Json<FaceEnrollment>), AppError> {
    validate_descriptor(&req.descriptor)?;
    let label = req
        .label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.chars().take(MAX_LABEL_LEN).collect::<String>());

    let row = FaceDescriptorRepo::create_capped(
        &state.db,
        user.user_id,
        label.as_deref(),
        &req.descriptor,
        MAX_DESCRIPTORS_PER_USER,
    )
    .await?
    .ok_or_else(|| {
        AppError::Conflict(format!(
            "At most {MAX_DESCRIPTORS_PER_USER} face descriptors can be enrolled"
        ))
    })?;
    info!("Enrolled face descriptor {} for user {}", row.id, user.user_id);
    Ok((StatusCode::CREATED, Json(row.into())))
}

/// GET /api/v1/auth/face
pub async fn handle_face_list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<FaceEnrollment>>, AppError> {
    let rows = FaceDescriptorRepo::list_for_user(&state.db, user.user_id).await?;
    Ok(Json(rows.into_iter().map(FaceEnrollment::from).collect()))
}

/// DELETE /api/v1/auth/face
pub async fn handle_face_delete(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, AppError> {
    let removed = FaceDescriptorRepo::delete_for_user(&state.db, user.user_id).await?;
    info!("Removed {removed} face descriptor(s) for user {}", user.user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/auth/face/login
///
/// With `email`: 1:1 verification against that user's descriptors.
/// Without: 1:N identification across every enrolled descriptor.
#[tracing::instrument(skip(state, req))]
pub async fn handle_face_login(
    State(state): State<AppState>,
    Json(req): Json<FaceLoginRequest>,
) -> Result<Json<FaceLoginResponse>, AppError> {
    validate_descriptor(&req.descriptor)?;
    let not_recognized = || AppError::InvalidCredentials(FACE_NOT_RECOGNIZED.to_string());

    let candidates = match req.email.as_deref() {
        Some(email) => {
            let email = normalize_email(email).map_err(|_| not_recognized())?;
            let user = UserRepo::get_by_email(&state.db, &email)
                .await?
                .ok_or_else(not_recognized)?;
            FaceDescriptorRepo::list_for_user(&state.db, user.id).await?
        }
        None => FaceDescriptorRepo::list_all(&state.db).await?,
    };

    let FaceMatch {
        user_id, distance, ..
    } = find_best_match(
        &req.descriptor,
        &candidates,
        state.config.face_match_threshold,
    )
    .ok_or_else(not_recognized)?;

    let user = UserRepo::get_by_id(&state.db, user_id)
        .await?
        .ok_or_else(not_recognized)?;
    info!(
        "Face login for user {} (distance {:.3}, {} candidates)",
        user.id,
        distance,
        candidates.len()
    );

    Ok(Json(FaceLoginResponse {
        session: issue_session(&state, &user).await?,
        distance,
    }))
}
