#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("Query error: {0}")]
    Query(#[from] sea_orm::DbErr),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

pub type DbResult<T> = Result<T, DbError>;
