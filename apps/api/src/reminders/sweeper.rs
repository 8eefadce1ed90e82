use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::reminder::ReminderRow;
use crate::reminders::repo::{DoseRepo, ReminderRepo};
use crate::reminders::schedule::Schedule;

/// One occurrence that became due during a sweep window.
#[derive(Debug, Clone, PartialEq)]
pub struct DueDose {
    pub reminder_id: Uuid,
    pub user_id: Uuid,
    pub scheduled_for: DateTime<Utc>,
}

/// Spawn the reminder sweeper.
///
/// Every `interval_secs` it expands all active reminders over the window since
/// the previous tick and records a `due` dose for each occurrence.
pub fn start(pool: PgPool, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_loop(pool, interval_secs.max(1)).await;
    })
}

async fn run_loop(pool: PgPool, interval_secs: u64) {
    tracing::info!("Reminder sweeper started (every {interval_secs}s)");

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_tick = Utc::now() - Duration::seconds(interval_secs as i64);

    loop {
        interval.tick().await;
        let now = Utc::now();
        match sweep(&pool, last_tick, now).await {
            Ok(0) => {}
            Ok(n) => tracing::info!("Reminder sweep recorded {n} due dose(s)"),
            Err(e) => {
                // Keep the window open so the next tick retries it.
                tracing::error!("Reminder sweep failed: {e:#}");
                continue;
            }
        }
        last_tick = now;
    }
}

async fn sweep(pool: &PgPool, from: DateTime<Utc>, to: DateTime<Utc>) -> anyhow::Result<usize> {
    let reminders = ReminderRepo::list_active(pool).await?;
    let due = collect_due(&reminders, from, to);

    let mut inserted = 0;
    for dose in &due {
        if DoseRepo::insert_due(pool, dose.reminder_id, dose.user_id, dose.scheduled_for).await? {
            tracing::info!(
                reminder_id = %dose.reminder_id,
                user_id = %dose.user_id,
                "Medication dose due at {}",
                dose.scheduled_for
            );
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Occurrences in `(from, to]` across `reminders`, skipping unparseable rows.
pub fn collect_due(reminders: &[ReminderRow], from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DueDose> {
    let mut due = Vec::new();
    for row in reminders {
        let schedule = match Schedule::from_row(row) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Skipping reminder in sweep: {e:#}");
                continue;
            }
        };
        due.extend(
            schedule
                .occurrences_between(from, to)
                .into_iter()
                .map(|scheduled_for| DueDose {
                    reminder_id: schedule.reminder_id,
                    user_id: schedule.user_id,
                    scheduled_for,
                }),
        );
    }
    due.sort_by_key(|d| d.scheduled_for);
    due
}
