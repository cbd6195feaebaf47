#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Feed error: {0}")]
    Feed(#[from] crate::feed::FeedError),

    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::db::error::DbError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid date: {0}")]
    DateFormat(#[from] crate::gtfs::utils::DateError),
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, e)
    }
}

pub type RtResult<T> = Result<T, Error>;
