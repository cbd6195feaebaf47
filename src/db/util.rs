use std::ops::Deref;

use rusqlite::{params_from_iter, ParamsFromIter};
use sea_orm::sea_query::{sea_value_to_json_value, QueryStatementWriter, SqliteQueryBuilder};
use sea_orm::{DatabaseConnection, DbErr, SqlxSqliteConnector};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous},
    SqlitePool,
};

pub async fn open_seaorm(db_path: &str) -> Result<DatabaseConnection, DbErr> {
    // Create via sqlx so we can customise the options
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        // the ingestion loops and the api share the file
        .busy_timeout(std::time::Duration::from_secs(10))
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePool::connect_with(options)
        .await
        .map_err(|e| DbErr::Conn(sea_orm::RuntimeErr::SqlxError(e)))?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

pub fn open_rusqlite(db_path: &str) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(10))?;
    // rusqlite is used for bulk imports and reads, FKs only slow those down
    conn.pragma_update(None, "foreign_keys", "OFF")?;

    Ok(conn)
}

pub trait SeaRusqliteAdapter {
    /// Prepares a sea query for use with rusqlite
    fn prepare<'conn>(
        &self,
        db: &'conn rusqlite::Connection,
    ) -> Result<SeaRusqlitePrepared<'conn>, rusqlite::Error>;
}

impl<Q: QueryStatementWriter> SeaRusqliteAdapter for Q {
    fn prepare<'conn>(
        &self,
        db: &'conn rusqlite::Connection,
    ) -> Result<SeaRusqlitePrepared<'conn>, rusqlite::Error> {
        let (sql, values) = self.build(SqliteQueryBuilder);

        log::trace!("Prepared SQL: {}", sql);

        let json_values: Vec<_> = values
            .into_iter()
            .map(|v| sea_value_to_json_value(&v))
            .collect();

        Ok(SeaRusqlitePrepared {
            statement: db.prepare_cached(&sql)?,
            params: params_from_iter(json_values),
        })
    }
}

pub struct SeaRusqlitePrepared<'conn> {
    pub statement: rusqlite::CachedStatement<'conn>,
    pub params: ParamsFromIter<Vec<serde_json::Value>>,
}

impl<'conn> Deref for SeaRusqlitePrepared<'conn> {
    type Target = rusqlite::CachedStatement<'conn>;

    fn deref(&self) -> &Self::Target {
        &self.statement
    }
}

impl<'conn> SeaRusqlitePrepared<'conn> {
    pub fn execute(&mut self) -> Result<usize, rusqlite::Error> {
        self.statement.execute(self.params.clone())
    }

    pub fn query(&mut self) -> Result<rusqlite::Rows<'_>, rusqlite::Error> {
        self.statement.query(self.params.clone())
    }

    pub fn query_row<T, F>(&mut self, f: F) -> Result<T, rusqlite::Error>
    where
        F: FnOnce(&rusqlite::Row) -> Result<T, rusqlite::Error>,
    {
        self.statement.query_row(self.params.clone(), f)
    }
}
