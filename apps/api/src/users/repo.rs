use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::user::UserRow;
use crate::users::validation::ProfileChanges;

/// Fields for a new account. Exactly one of `password_hash` / `google_sub` is usually set.
pub struct NewUser<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub password_hash: Option<&'a str>,
    pub google_sub: Option<&'a str>,
}

pub struct UserRepo;

impl UserRepo {
    /// Inserts a user. Returns `None` when the email (or Google subject) is already taken.
    pub async fn create(pool: &PgPool, new_user: NewUser<'_>) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, name, password_hash, google_sub)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_user.email)
        .bind(new_user.name)
        .bind(new_user.password_hash)
        .bind(new_user.google_sub)
        .fetch_optional(pool)
        .await
        .context("Failed to create user")
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get user by id")
    }

    pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await
            .context("Failed to get user by email")
    }

    pub async fn get_by_google_sub(pool: &PgPool, sub: &str) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE google_sub = $1")
            .bind(sub)
            .fetch_optional(pool)
            .await
            .context("Failed to get user by Google subject")
    }

    pub async fn link_google(pool: &PgPool, id: Uuid, sub: &str) -> Result<UserRow> {
        sqlx::query_as::<_, UserRow>(
            "UPDATE users SET google_sub = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(sub)
        .fetch_one(pool)
        .await
        .context("Failed to link Google account")
    }

    /// Applies a partial update. Each nullable column takes a "set" flag so an
    /// explicit `null` can clear it while absent fields keep their stored value.
    pub async fn update_profile(
        pool: &PgPool,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET
                name               = COALESCE($2, name),
                date_of_birth      = CASE WHEN $3  THEN $4  ELSE date_of_birth END,
                gender             = CASE WHEN $5  THEN $6  ELSE gender END,
                phone              = CASE WHEN $7  THEN $8  ELSE phone END,
                blood_group        = CASE WHEN $9  THEN $10 ELSE blood_group END,
                height_cm          = CASE WHEN $11 THEN $12 ELSE height_cm END,
                weight_kg          = CASE WHEN $13 THEN $14 ELSE weight_kg END,
                allergies          = COALESCE($15, allergies),
                chronic_conditions = COALESCE($16, chronic_conditions),
                emergency_contact  = CASE WHEN $17 THEN $18 ELSE emergency_contact END,
                updated_at         = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(changes.date_of_birth.is_some())
        .bind(changes.date_of_birth.flatten())
        .bind(changes.gender.is_some())
        .bind(changes.gender.clone().flatten())
        .bind(changes.phone.is_some())
        .bind(changes.phone.clone().flatten())
        .bind(changes.blood_group.is_some())
        .bind(changes.blood_group.clone().flatten())
        .bind(changes.height_cm.is_some())
        .bind(changes.height_cm.flatten())
        .bind(changes.weight_kg.is_some())
        .bind(changes.weight_kg.flatten())
        .bind(&changes.allergies)
        .bind(&changes.chronic_conditions)
        .bind(changes.emergency_contact.is_some())
        .bind(changes.emergency_contact.clone().flatten())
        .fetch_optional(pool)
        .await
        .context("Failed to update profile")
    }

    /// Stores the new avatar key and returns the previous one, if any.
    pub async fn set_avatar(
        pool: &PgPool,
        id: Uuid,
        key: &str,
        content_type: &str,
    ) -> Result<Option<String>> {
        let previous: Option<Option<String>> = sqlx::query_scalar(
            r#"
            UPDATE users u SET
                avatar_key = $2,
                avatar_content_type = $3,
                updated_at = NOW()
            FROM (SELECT id, avatar_key FROM users WHERE id = $1 FOR UPDATE) old
            WHERE u.id = old.id
            RETURNING old.avatar_key
            "#,
        )
        .bind(id)
        .bind(key)
        .bind(content_type)
        .fetch_optional(pool)
        .await
        .context("Failed to set avatar")?;
        Ok(previous.flatten())
    }

    /// Deletes the user; dependent rows cascade. Returns the deleted row.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<UserRow>> {
        sqlx::query_as::<_, UserRow>("DELETE FROM users WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to delete user")
    }
}
