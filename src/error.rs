use actix_web::{HttpResponse, ResponseError};
use reqwest::StatusCode;
use serde_json::json;

use crate::feed::FeedError;
use crate::gtfs::schedule::ScheduleError;
use crate::gtfs::utils::DateError;
use crate::predict::PredictError;
use crate::{db::error::DbError, gtfs::sync::GtfsSyncError};

#[derive(thiserror::Error, Debug)]
pub enum BelievabilityError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("GTFS sync error: {0}")]
    GtfsSync(#[from] GtfsSyncError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Prediction error: {0}")]
    Predict(#[from] PredictError),

    #[error("Date error: {0}")]
    Date(#[from] DateError),

    #[error("Maintenance error: {0}")]
    Maintenance(#[from] crate::maintenance::Error),

    #[error("Error response: {0} {1}")]
    Response(u16, String),
}

impl BelievabilityError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        BelievabilityError::Response(400, message.into())
    }
}

impl ResponseError for BelievabilityError {
    fn error_response(&self) -> actix_web::HttpResponse<actix_web::body::BoxBody> {
        match self {
            BelievabilityError::Response(_, message) => {
                HttpResponse::build(self.status_code()).json(json!({ "error": message }))
            }
            other => {
                log::error!("{}", other);
                actix_web::HttpResponse::InternalServerError().finish()
            }
        }
    }

    fn status_code(&self) -> reqwest::StatusCode {
        match self {
            BelievabilityError::Response(status, _) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type BelievabilityResult<T> = Result<T, BelievabilityError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            BelievabilityError::bad_request("bad date").status_code(),
            StatusCode::BAD_REQUEST
        );
        let engine_error = BelievabilityError::Predict(PredictError::UnknownStopSequence {
            trip_id: "t1".to_string(),
            stop_sequence: 9,
        });
        assert_eq!(engine_error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            engine_error.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
