extern crate derive_builder;

mod alerts;
mod config;
mod db;
mod departures;
mod entities;
mod entity;
mod error;
mod feed;
mod gtfs;
mod maintenance;
mod observations;
mod predict;

#[cfg(test)]
mod test_utils;

use std::env;
use std::sync::Arc;

use actix_web::{get, middleware::Logger, post, web, App, HttpResponse, HttpServer, Responder};
use chrono::{DateTime, NaiveDate, Utc};
use feed::FeedClient;

use config::Config;
use error::{BelievabilityError, BelievabilityResult};
use entities::BlocksResponse;
use gtfs::schedule::Schedule;
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::json;
use tokio::{select, sync::RwLock};

use crate::{
    alerts::track_alerts, db::util::open_seaorm, gtfs::realtime::monitor_vehicles,
    gtfs::utils::parse_gtfs_date, maintenance::sync_and_reload,
};

#[derive(Clone)]
pub struct ContextData {
    client: FeedClient,
    db: DatabaseConnection,
    /// Replaced whole when new static data is imported
    schedule: Arc<RwLock<Arc<Schedule>>>,
    config: Arc<Config>,
}

impl ContextData {
    async fn current_schedule(&self) -> Arc<Schedule> {
        self.schedule.read().await.clone()
    }
}

#[derive(Deserialize)]
struct ServiceQuery {
    /// YYYYMMDD, defaults to today's local date
    date: Option<String>,
    /// Unix seconds, defaults to now
    at: Option<i64>,
}

#[derive(Deserialize)]
struct DeparturesQuery {
    route: String,
    direction: u8,
    stop: String,
    date: Option<String>,
    at: Option<i64>,
    limit: Option<usize>,
}

fn resolve_service_time(
    schedule: &Schedule,
    date: Option<&str>,
    at: Option<i64>,
) -> BelievabilityResult<(NaiveDate, DateTime<Utc>)> {
    let now = match at {
        Some(at) => DateTime::<Utc>::from_timestamp(at, 0)
            .ok_or_else(|| BelievabilityError::bad_request(format!("Invalid time: {}", at)))?,
        None => Utc::now(),
    };
    let service_date = match date {
        Some(date) => parse_gtfs_date(date)
            .map_err(|_| BelievabilityError::bad_request(format!("Invalid date: {}", date)))?,
        None => now.with_timezone(&schedule.timezone).date_naive(),
    };
    Ok((service_date, now))
}

#[get("/ok")]
async fn ok() -> BelievabilityResult<impl Responder> {
    Ok(HttpResponse::Ok().finish())
}

#[get("/blocks")]
async fn get_blocks(
    query: web::Query<ServiceQuery>,
    ctx: web::Data<ContextData>,
) -> BelievabilityResult<impl Responder> {
    let schedule = ctx.current_schedule().await;
    let (service_date, now) = resolve_service_time(&schedule, query.date.as_deref(), query.at)?;

    let predictions = departures::evaluate(&ctx.db, &schedule, &service_date, now).await?;

    Ok(web::Json(BlocksResponse::from(&predictions)))
}

#[get("/departures")]
async fn get_departures(
    query: web::Query<DeparturesQuery>,
    ctx: web::Data<ContextData>,
) -> BelievabilityResult<impl Responder> {
    if query.direction > 1 {
        return Err(BelievabilityError::bad_request("direction must be 0 or 1"));
    }

    let schedule = ctx.current_schedule().await;
    let (service_date, now) = resolve_service_time(&schedule, query.date.as_deref(), query.at)?;

    let predictions = departures::evaluate(&ctx.db, &schedule, &service_date, now).await?;
    let stop_departures = departures::stop_departures(
        &schedule,
        &predictions,
        &query.route,
        query.direction,
        &query.stop,
        now,
        query.limit.unwrap_or(10),
    )?;

    let response = web::Json(json!({
        "departures": stop_departures,
    }));
    Ok(response)
}

#[post("/management/gtfs/sync")]
async fn sync_gtfs(ctx: web::Data<ContextData>) -> BelievabilityResult<impl Responder> {
    let new_records = sync_and_reload(&ctx, true).await?;
    let response = web::Json(json!({
        "newRecords": new_records,
    }));
    Ok(response)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::try_init().ok();

    log::debug!("Debug logging enabled");

    dotenvy::from_filename(".env").ok();

    let config = Config::from_env()?;

    let client = FeedClient::new(&config.vehicle_positions_url, &config.alerts_url)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let db = open_seaorm(&config.database_path)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    log::info!("Migrating database");
    Migrator::up(&db, None)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let default_timezone = config.timezone.unwrap_or(chrono_tz::UTC);
    let ctx = ContextData {
        client,
        db,
        schedule: Arc::new(RwLock::new(Arc::new(Schedule::empty(default_timezone)))),
        config: Arc::new(config),
    };

    // Serve from what was imported before if the feed can't be reached
    if let Err(e) = sync_and_reload(&ctx, true).await {
        log::error!("Initial sync failed: {}", e);
        maintenance::reload_schedule(&ctx).await?;
    }

    let vehicles_ctx = ctx.clone();
    let vehicles = monitor_vehicles(&vehicles_ctx);

    let alerts_ctx = ctx.clone();
    let alerts = track_alerts(&alerts_ctx);

    let maintenance_ctx = ctx.clone();
    let maintenance = maintenance::keep_maintained(&maintenance_ctx);

    let listen_address = ctx.config.listen_address.clone();
    let allow_origin = ctx.config.allow_origin.clone();

    log::info!("Starting server at {}", listen_address);

    let server = HttpServer::new(move || {
        let logger = Logger::default();

        let mut cors = actix_cors::Cors::default()
            .allowed_methods(vec!["GET"])
            .allowed_headers(vec!["accept"]);

        if let Some(allowed_origin) = &allow_origin {
            if allowed_origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(allowed_origin);
            }
        }

        App::new()
            .wrap(logger)
            .wrap(cors)
            .app_data(web::Data::new(ctx.clone()))
            .service(ok)
            .service(get_blocks)
            .service(get_departures)
            .service(sync_gtfs)
    })
    .bind(listen_address)?
    .run();

    select! {
        res = server => {
            log::info!("Server stopped");
            res?;
            Ok::<_, std::io::Error>(())
        },
        res = vehicles => {
            log::info!("Vehicle monitor stopped");
            res?;
            Ok(())
        }
        res = alerts => {
            log::info!("Alert tracker stopped");
            res.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            Ok(())
        }
        res = maintenance => {
            log::info!("Maintenance loop stopped");
            res?;
            Ok::<_, std::io::Error>(())
        }
    }?;

    Ok(())
}
