use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::reminder::{DoseRow, DoseStatus, ReminderRow};
use crate::reminders::validation::ReminderDraft;

pub struct ReminderRepo;

impl ReminderRepo {
    pub async fn create(pool: &PgPool, user_id: Uuid, draft: &ReminderDraft) -> Result<ReminderRow> {
        sqlx::query_as::<_, ReminderRow>(
            r#"
            INSERT INTO reminders
                (id, user_id, medication_name, dosage, instructions, times,
                 days_of_week, start_date, end_date, utc_offset_minutes, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&draft.medication_name)
        .bind(&draft.dosage)
        .bind(&draft.instructions)
        .bind(&draft.times)
        .bind(&draft.days_of_week)
        .bind(draft.start_date)
        .bind(draft.end_date)
        .bind(draft.utc_offset_minutes)
        .bind(draft.active)
        .fetch_one(pool)
        .await
        .context("Failed to create reminder")
    }

    pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<ReminderRow>> {
        sqlx::query_as::<_, ReminderRow>(
            "SELECT * FROM reminders WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list reminders")
    }

    pub async fn list_active(pool: &PgPool) -> Result<Vec<ReminderRow>> {
        sqlx::query_as::<_, ReminderRow>(
            "SELECT * FROM reminders WHERE active AND (end_date IS NULL OR end_date >= CURRENT_DATE - 1)",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list active reminders")
    }

    /// Scoped to the owner; another user's reminder reads as missing.
    pub async fn get(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<ReminderRow>> {
        sqlx::query_as::<_, ReminderRow>("SELECT * FROM reminders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .context("Failed to get reminder")
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        draft: &ReminderDraft,
    ) -> Result<Option<ReminderRow>> {
        sqlx::query_as::<_, ReminderRow>(
            r#"
            UPDATE reminders SET
                medication_name    = $3,
                dosage             = $4,
                instructions       = $5,
                times              = $6,
                days_of_week       = $7,
                start_date         = $8,
                end_date           = $9,
                utc_offset_minutes = $10,
                active             = $11,
                updated_at         = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&draft.medication_name)
        .bind(&draft.dosage)
        .bind(&draft.instructions)
        .bind(&draft.times)
        .bind(&draft.days_of_week)
        .bind(draft.start_date)
        .bind(draft.end_date)
        .bind(draft.utc_offset_minutes)
        .bind(draft.active)
        .fetch_optional(pool)
        .await
        .context("Failed to update reminder")
    }

    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await
            .context("Failed to delete reminder")?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct DoseRepo;

impl DoseRepo {
    /// Records the outcome for one occurrence, overwriting any earlier status.
    pub async fn upsert(
        pool: &PgPool,
        reminder_id: Uuid,
        user_id: Uuid,
        scheduled_for: DateTime<Utc>,
        status: DoseStatus,
    ) -> Result<DoseRow> {
        sqlx::query_as::<_, DoseRow>(
            r#"
            INSERT INTO reminder_doses (id, reminder_id, user_id, scheduled_for, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (reminder_id, scheduled_for)
            DO UPDATE SET status = EXCLUDED.status, recorded_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(reminder_id)
        .bind(user_id)
        .bind(scheduled_for)
        .bind(status.as_str())
        .fetch_one(pool)
        .await
        .context("Failed to record dose")
    }

    /// Inserts a `due` row unless the occurrence already has one. Returns whether it was new.
    pub async fn insert_due(
        pool: &PgPool,
        reminder_id: Uuid,
        user_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO reminder_doses (id, reminder_id, user_id, scheduled_for, status)
            VALUES ($1, $2, $3, $4, 'due')
            ON CONFLICT (reminder_id, scheduled_for) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(reminder_id)
        .bind(user_id)
        .bind(scheduled_for)
        .execute(pool)
        .await
        .context("Failed to insert due dose")?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_reminder(
        pool: &PgPool,
        reminder_id: Uuid,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<DoseRow>> {
        sqlx::query_as::<_, DoseRow>(
            r#"
            SELECT * FROM reminder_doses
            WHERE reminder_id = $1 AND user_id = $2
            ORDER BY scheduled_for DESC
            LIMIT $3
            "#,
        )
        .bind(reminder_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list doses")
    }

    pub async fn list_due_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<DoseRow>> {
        sqlx::query_as::<_, DoseRow>(
            "SELECT * FROM reminder_doses WHERE user_id = $1 AND status = 'due' ORDER BY scheduled_for",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list due doses")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_user, setup_db};
    use chrono::{NaiveDate, TimeZone};

    fn draft() -> ReminderDraft {
        ReminderDraft {
            medication_name: "Metformin".into(),
            dosage: "500 mg".into(),
            instructions: None,
            times: vec!["08:00".into(), "20:00".into()],
            days_of_week: vec![],
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            utc_offset_minutes: 0,
            active: true,
        }
    }

    #[tokio::test]
    #[ignore = "requires Docker for the Postgres container"]
    async fn test_reminder_hidden_from_other_users() -> Result<()> {
        let (pool, _container) = setup_db().await?;
        let owner = insert_user(&pool, "owner@example.com").await?;
        let other = insert_user(&pool, "other@example.com").await?;
        let reminder = ReminderRepo::create(&pool, owner.id, &draft()).await?;

        assert!(ReminderRepo::get(&pool, reminder.id, other.id).await?.is_none());
        assert!(ReminderRepo::update(&pool, reminder.id, other.id, &draft())
            .await?
            .is_none());
        assert!(!ReminderRepo::delete(&pool, reminder.id, other.id).await?);

        assert!(ReminderRepo::get(&pool, reminder.id, owner.id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires Docker for the Postgres container"]
    async fn test_due_dose_recorded_once_per_instant() -> Result<()> {
        let (pool, _container) = setup_db().await?;
        let user = insert_user(&pool, "sweep@example.com").await?;
        let reminder = ReminderRepo::create(&pool, user.id, &draft()).await?;
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();

        assert!(DoseRepo::insert_due(&pool, reminder.id, user.id, at).await?);
        assert!(!DoseRepo::insert_due(&pool, reminder.id, user.id, at).await?);

        // A recorded outcome is not reset by a later sweep.
        DoseRepo::upsert(&pool, reminder.id, user.id, at, DoseStatus::Taken).await?;
        assert!(!DoseRepo::insert_due(&pool, reminder.id, user.id, at).await?);

        let doses = DoseRepo::list_for_reminder(&pool, reminder.id, user.id, 10).await?;
        assert_eq!(doses.len(), 1);
        assert!(DoseRepo::list_due_for_user(&pool, user.id).await?.is_empty());
        Ok(())
    }
}
