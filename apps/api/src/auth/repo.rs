use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::face::FaceDescriptorRow;
use crate::models::token::RefreshTokenRow;

pub struct RefreshTokenRepo;

impl RefreshTokenRepo {
    pub async fn create(
        pool: &PgPool,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await
        .context("Failed to create refresh token")?;
        Ok(())
    }

    pub async fn get_by_hash(pool: &PgPool, hash: &str) -> Result<Option<RefreshTokenRow>> {
        sqlx::query_as::<_, RefreshTokenRow>(
            "SELECT token_hash, user_id, expires_at, created_at FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(hash)
        .fetch_optional(pool)
        .await
        .context("Failed to get refresh token")
    }

    /// Returns whether a row was removed.
    pub async fn delete(pool: &PgPool, hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(hash)
            .execute(pool)
            .await
            .context("Failed to delete refresh token")?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct FaceDescriptorRepo;

impl FaceDescriptorRepo {
    /// Inserts a descriptor unless the user already has `max`. Returns `None` at the cap.
    ///
    /// The user row is locked for the transaction so concurrent enrollments for
    /// one user are counted one after another.
    pub async fn create_capped(
        pool: &PgPool,
        user_id: Uuid,
        label: Option<&str>,
        descriptor: &[f64],
        max: i64,
    ) -> Result<Option<FaceDescriptorRow>> {
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to lock user for enrollment")?;

        let row = sqlx::query_as::<_, FaceDescriptorRow>(
            r#"
            INSERT INTO face_descriptors (id, user_id, label, descriptor)
            SELECT $1::uuid, $2::uuid, $3::text, $4::double precision[]
            WHERE (SELECT COUNT(*) FROM face_descriptors WHERE user_id = $2) < $5
            RETURNING id, user_id, label, descriptor, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(label)
        .bind(descriptor)
        .bind(max)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to store face descriptor")?;

        tx.commit().await.context("Failed to commit enrollment")?;
        Ok(row)
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<FaceDescriptorRow>> {
        sqlx::query_as::<_, FaceDescriptorRow>(
            "SELECT id, user_id, label, descriptor, created_at FROM face_descriptors WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list face descriptors")
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<FaceDescriptorRow>> {
        sqlx::query_as::<_, FaceDescriptorRow>(
            "SELECT id, user_id, label, descriptor, created_at FROM face_descriptors ORDER BY created_at",
        )
        .fetch_all(pool)
        .await
        .context("Failed to load face descriptors")
    }

    pub async fn delete_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM face_descriptors WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await
            .context("Failed to delete face descriptors")?;
        Ok(result.rows_affected())
    }
}
