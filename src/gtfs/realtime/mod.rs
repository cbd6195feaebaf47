mod error;
mod vehicle;

use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
pub use error::Error;
use sea_orm::{DatabaseConnection, TransactionTrait};
use tokio::time::sleep;

pub use self::vehicle::observation_from_entity;
use self::error::RtResult;
use super::structure::realtime::FeedMessage;
use crate::observations::upsert_observation;
use crate::ContextData;

/// Stores every usable vehicle position of one feed fetch.
/// Returns the number of observations written.
pub async fn process_feed(
    db: &DatabaseConnection,
    feed: &FeedMessage,
    timezone: &Tz,
    polled_at: DateTime<Utc>,
) -> RtResult<usize> {
    let tx = db.begin().await?;
    let mut count = 0;

    for entity in &feed.entity {
        if entity.is_deleted == Some(true) {
            continue;
        }

        let observation = match observation_from_entity(entity, timezone, polled_at) {
            Ok(Some(observation)) => observation,
            Ok(None) => continue,
            Err(e) => {
                log::warn!("Error reading entity {}: {}", entity.id, e);
                continue;
            }
        };

        upsert_observation(&tx, &observation).await?;
        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}

pub async fn monitor_vehicles(ctx: &ContextData) -> RtResult<()> {
    log::info!("Vehicle monitor is running");

    let interval = Duration::from_secs(ctx.config.vehicle_poll_seconds);
    let mut last_update_time = None;

    loop {
        let feed = match ctx.client.get_vehicle_positions().await {
            Ok(feed) => feed,
            Err(e) => {
                log::error!("Error getting vehicle positions: {}", e);
                sleep(interval).await;
                continue;
            }
        };

        if feed.header.timestamp.is_some() && feed.header.timestamp <= last_update_time {
            log::debug!("No new vehicle positions");
            sleep(interval).await;
            continue;
        }

        let timezone = ctx.schedule.read().await.timezone;

        log::debug!("Start processing {} entities", feed.entity.len());
        match process_feed(&ctx.db, &feed, &timezone, Utc::now()).await {
            Ok(count) => {
                log::debug!("End processing - {} observations", count);
                last_update_time = feed.header.timestamp;
            }
            Err(e) => log::error!("Error storing vehicle positions: {}", e),
        }

        sleep(interval).await;
    }
}
