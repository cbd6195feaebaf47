use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use sea_orm::DbErr;
use sea_orm::TransactionTrait;
use tokio::time::sleep;

use crate::alerts::track::purge_alerts_before;
use crate::gtfs::schedule::load_schedule;
use crate::gtfs::sync::Sync;
use crate::observations::purge_observations_before;
use crate::ContextData;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::db::error::DbError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] crate::gtfs::schedule::ScheduleError),

    #[error("Sync error: {0}")]
    Sync(#[from] crate::gtfs::sync::GtfsSyncError),
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Swaps in a freshly loaded schedule
pub async fn reload_schedule(ctx: &ContextData) -> Result<()> {
    let schedule = load_schedule(&ctx.config.database_path, ctx.config.timezone).await?;
    *ctx.schedule.write().await = Arc::new(schedule);
    Ok(())
}

/// Imports new static data, and reloads the schedule if there was any.
/// Returns the number of records imported.
pub async fn sync_and_reload(ctx: &ContextData, force_reload: bool) -> Result<u64> {
    log::info!("Checking for new data");

    let new_records = Sync::sync(&ctx.db, &ctx.config.database_path, &ctx.config.gtfs_url).await?;

    // The schedule only needs to be reloaded if there is new data
    if new_records > 0 || force_reload {
        reload_schedule(ctx).await?;
    }

    Ok(new_records)
}

/// Deletes observations and alerts older than the retention window.
/// Returns the number of (observations, alerts) deleted.
pub async fn purge(
    db: &impl TransactionTrait,
    now: DateTime<Utc>,
    retention_days: i64,
    timezone: &chrono_tz::Tz,
) -> Result<(u64, u64)> {
    let cutoff = now - Duration::days(retention_days);
    let cutoff_date = cutoff.with_timezone(timezone).date_naive();

    let tx = db.begin().await?;
    let observations = purge_observations_before(&tx, &cutoff_date).await?;
    let alerts = purge_alerts_before(&tx, cutoff).await?;
    tx.commit().await?;

    Ok((observations, alerts))
}

/// Minutes to wait from `current_minute` until the next `maintenance_minute`
pub fn minutes_until(current_minute: u32, maintenance_minute: u32) -> u32 {
    if current_minute < maintenance_minute {
        maintenance_minute - current_minute
    } else {
        1440 /* minutes in a day */ - current_minute + maintenance_minute
    }
}

/// Runs forever, doing maintenance at the maintenance window time
pub async fn keep_maintained(ctx: &ContextData) -> Result<()> {
    loop {
        let timezone = ctx.schedule.read().await.timezone;
        let local_now = Utc::now().with_timezone(&timezone);
        let current_minute = local_now.hour() * 60 + local_now.minute();
        let wait_time = minutes_until(current_minute, ctx.config.maintenance_minute);

        log::info!("Waiting {} minutes for maintenance window", wait_time);
        sleep(tokio::time::Duration::from_secs(wait_time as u64 * 60)).await;

        log::info!("Starting maintenance");

        // A failed sync keeps the current schedule, the next window retries
        if let Err(e) = sync_and_reload(ctx, false).await {
            log::error!("Error syncing static data: {}", e);
        }

        match purge(&ctx.db, Utc::now(), ctx.config.retention_days, &timezone).await {
            Ok((observations, alerts)) => log::info!(
                "Purged {} observations and {} alerts",
                observations,
                alerts
            ),
            Err(e) => log::error!("Error purging old data: {}", e),
        }

        log::info!("Maintenance done");
    }
}
