use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::db::error::{DbError, DbResult};
use crate::entity::alerts;
use crate::entity::prelude::*;
use crate::ContextData;

const START_DATE_FORMAT: &str = "%B %d, %Y %I:%M %p";

/// One alert as published by the alert feed
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawAlert {
    #[serde(rename = "AlertStatus")]
    pub status: String,
    #[serde(rename = "Routes", default)]
    pub routes: Vec<String>,
    #[serde(rename = "Title")]
    pub title: String,
    /// Local time, e.g. "March 03, 2024 06:30 AM"
    #[serde(rename = "StartDateFormatted")]
    pub start_date: Option<String>,
    pub id: i64,
}

/// An alert as it applies to one route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub alert_id: i64,
    pub route_id: String,
    pub title: String,
    pub status: String,
    pub start_date: Option<DateTime<Utc>>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl TryFrom<alerts::Model> for Alert {
    type Error = DbError;

    fn try_from(m: alerts::Model) -> Result<Self, Self::Error> {
        let timestamp = |secs: i64| {
            DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| DbError::InvalidValue(format!("Timestamp {}", secs)))
        };

        Ok(Alert {
            alert_id: m.alert_id,
            route_id: m.route_id,
            title: m.title,
            status: m.status,
            start_date: m.start_date.map(timestamp).transpose()?,
            first_seen: timestamp(m.first_seen)?,
            last_seen: timestamp(m.last_seen)?,
        })
    }
}

pub fn parse_start_date(start_date: &str, timezone: &Tz) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(start_date.trim(), START_DATE_FORMAT).ok()?;
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// One row per route the alert names
pub fn fan_out(raw: &RawAlert, timezone: &Tz, now: DateTime<Utc>) -> Vec<Alert> {
    let start_date = raw.start_date.as_deref().and_then(|s| {
        let parsed = parse_start_date(s, timezone);
        if parsed.is_none() {
            log::warn!("Alert {} has an unreadable start date: {}", raw.id, s);
        }
        parsed
    });

    raw.routes
        .iter()
        .map(|route_id| Alert {
            alert_id: raw.id,
            route_id: route_id.clone(),
            title: raw.title.clone(),
            status: raw.status.clone(),
            start_date,
            first_seen: now,
            last_seen: now,
        })
        .collect()
}

/// Inserts the alert, or only bumps `last_seen` when it was seen before
pub async fn upsert_alert(db: &impl ConnectionTrait, alert: &Alert) -> DbResult<()> {
    use alerts::Column;

    let model = alerts::ActiveModel {
        id: NotSet,
        alert_id: Set(alert.alert_id),
        route_id: Set(alert.route_id.clone()),
        title: Set(alert.title.clone()),
        status: Set(alert.status.clone()),
        start_date: Set(alert.start_date.map(|d| d.timestamp())),
        first_seen: Set(alert.first_seen.timestamp()),
        last_seen: Set(alert.last_seen.timestamp()),
    };

    Alerts::insert(model)
        .on_conflict(
            OnConflict::columns([Column::AlertId, Column::RouteId, Column::Title])
                .update_column(Column::LastSeen)
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(())
}

/// Every stored alert, oldest first
pub async fn stored_alerts(db: &impl ConnectionTrait) -> DbResult<Vec<Alert>> {
    let rows = Alerts::find()
        .order_by_asc(alerts::Column::FirstSeen)
        .order_by_asc(alerts::Column::Id)
        .all(db)
        .await?;

    let mut result = vec![];
    for row in rows {
        match Alert::try_from(row) {
            Ok(alert) => result.push(alert),
            Err(e) => log::warn!("Skipping stored alert: {}", e),
        }
    }
    Ok(result)
}

/// Deletes alerts not seen since `cutoff`
pub async fn purge_alerts_before(db: &impl ConnectionTrait, cutoff: DateTime<Utc>) -> DbResult<u64> {
    let result = Alerts::delete_many()
        .filter(alerts::Column::LastSeen.lt(cutoff.timestamp()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Stores one fetch of the alert feed. Returns the number of route alerts written.
pub async fn process_alerts(
    db: &impl TransactionTrait,
    raw_alerts: &[RawAlert],
    timezone: &Tz,
    now: DateTime<Utc>,
) -> DbResult<usize> {
    let tx = db.begin().await?;
    let mut count = 0;
    for raw in raw_alerts {
        for alert in fan_out(raw, timezone, now) {
            upsert_alert(&tx, &alert).await?;
            count += 1;
        }
    }
    tx.commit().await?;
    Ok(count)
}

/// Stores one fetch of the alert feed, reading start dates in the current schedule's timezone
pub async fn store_alert_fetch(
    ctx: &ContextData,
    raw_alerts: &[RawAlert],
    now: DateTime<Utc>,
) -> DbResult<usize> {
    let timezone = ctx.schedule.read().await.timezone;
    process_alerts(&ctx.db, raw_alerts, &timezone, now).await
}

pub async fn track_alerts(ctx: &ContextData) -> DbResult<()> {
    log::info!("Alert tracker is running");

    let interval = Duration::from_secs(ctx.config.alert_poll_seconds);

    loop {
        match ctx.client.get_alerts().await {
            Ok(raw_alerts) => match store_alert_fetch(ctx, &raw_alerts, Utc::now()).await {
                Ok(count) => log::debug!("Updated {} alerts", count),
                Err(e) => log::error!("Error storing alerts: {}", e),
            },
            Err(e) => log::error!("Error getting alerts: {}", e),
        }

        sleep(interval).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::db;

    fn raw_alert() -> RawAlert {
        serde_json::from_str(
            r#"{
                "AlertStatus": "Active",
                "Routes": ["72-VIC", "70-VIC"],
                "Title": "Victoria: the 715am Route #72 departure on March 3 has been cancelled",
                "StartDateFormatted": "March 03, 2024 06:30 AM",
                "id": 4411
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_fan_out() {
        let now = DateTime::<Utc>::from_timestamp(1_709_400_000, 0).unwrap();
        let alerts = fan_out(&raw_alert(), &chrono_tz::America::Vancouver, now);

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].route_id, "72-VIC");
        assert_eq!(alerts[1].route_id, "70-VIC");
        // 06:30 PST
        assert_eq!(alerts[0].start_date.unwrap().timestamp(), 1_709_476_200);
        assert_eq!(alerts[0].first_seen, now);
    }

    #[test]
    fn test_unreadable_start_date() {
        let mut raw = raw_alert();
        raw.start_date = Some("soon".to_string());
        let alerts = fan_out(&raw, &chrono_tz::UTC, Utc::now());
        assert_eq!(alerts[0].start_date, None);
    }

    #[tokio::test]
    async fn test_upsert_bumps_last_seen() {
        let (_dir, db) = db().await;
        let first = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        let second = DateTime::<Utc>::from_timestamp(2_800, 0).unwrap();

        let raw = [raw_alert()];
        assert_eq!(process_alerts(&db, &raw, &chrono_tz::UTC, first).await.unwrap(), 2);
        assert_eq!(process_alerts(&db, &raw, &chrono_tz::UTC, second).await.unwrap(), 2);

        let stored = stored_alerts(&db).await.unwrap();
        assert_eq!(stored.len(), 2);
        for alert in &stored {
            assert_eq!(alert.first_seen, first);
            assert_eq!(alert.last_seen, second);
        }

        let cutoff = DateTime::<Utc>::from_timestamp(3_000, 0).unwrap();
        assert_eq!(purge_alerts_before(&db, cutoff).await.unwrap(), 2);
        assert!(stored_alerts(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_uses_reloaded_timezone() {
        let (_dir, ctx) = crate::test_utils::ctx().await;
        let now = DateTime::<Utc>::from_timestamp(1_709_400_000, 0).unwrap();

        // Starts out in UTC, then the schedule is replaced
        *ctx.schedule.write().await = std::sync::Arc::new(crate::gtfs::schedule::Schedule::empty(
            chrono_tz::America::Vancouver,
        ));
        assert_eq!(store_alert_fetch(&ctx, &[raw_alert()], now).await.unwrap(), 2);

        let stored = stored_alerts(&ctx.db).await.unwrap();
        // 06:30 PST
        assert_eq!(stored[0].start_date.unwrap().timestamp(), 1_709_476_200);
    }
}
