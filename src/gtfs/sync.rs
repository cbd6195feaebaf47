use std::path::Path;

use crate::entity::prelude::*;
use async_zip::{base::read::mem::ZipFileReader, error::ZipError};
use itertools::Itertools;
use rusqlite::vtab::csvtab;
use sea_orm::{
    sea_query::{self, Alias, Expr, OnConflict, Query, SqliteQueryBuilder},
    ActiveModelTrait, DatabaseConnection, EntityName, EntityTrait, Iden, IntoActiveModel,
    Iterable, QueryOrder, Set,
};
use tempfile::TempDir;
use tokio::{
    fs::File,
    io::{self, AsyncWriteExt},
    task,
};
use tokio_util::compat::FuturesAsyncReadCompatExt;

use crate::{
    db::util::open_rusqlite,
    entity::{
        gtfs_agency, gtfs_calendar, gtfs_calendar_dates, gtfs_routes, gtfs_stop_times,
        gtfs_trips, import,
    },
};

#[derive(thiserror::Error, Debug)]
pub enum GtfsSyncError {
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Zip error: {0}")]
    BadZipFile(#[from] async_zip::error::ZipError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DbError(#[from] sea_orm::DbErr),

    #[error("Database query error: {0}")]
    DbPrepareError(#[from] sea_query::error::Error),

    #[error("CSV Import error: {0}")]
    CsvImportError(#[from] rusqlite::Error),

    #[error("CSV header error: {0}")]
    CsvHeaderError(#[from] csv::Error),

    #[error("Import task failed: {0}")]
    TaskError(#[from] task::JoinError),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type GtfsSyncResult<T> = Result<T, GtfsSyncError>;

// Order is important!
const FILE_NAMES: [&str; 6] = [
    "agency.txt",
    "calendar.txt",
    "calendar_dates.txt",
    "routes.txt",
    "trips.txt",
    "stop_times.txt",
];

trait ImportEx {
    async fn get_last_import(db: &DatabaseConnection) -> GtfsSyncResult<Option<import::Model>>;
}

impl ImportEx for Import {
    async fn get_last_import(db: &DatabaseConnection) -> GtfsSyncResult<Option<import::Model>> {
        use import::Column::*;

        let found = Import::find().order_by_desc(Id).one(db).await?;
        Ok(found)
    }
}

pub async fn get_gtfs_files_from_zip(
    url: &str,
    if_modified_since: Option<String>,
) -> GtfsSyncResult<Option<(Option<String>, TempDir)>> {
    let resp = reqwest::get(url).await?.error_for_status()?;

    let last_modified = resp
        .headers()
        .get("last-modified")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    // Compared here rather than sent as If-Modified-Since, not every host honours it
    if last_modified.is_some() && if_modified_since == last_modified {
        return Ok(None);
    }

    // The central directory is at the end of the zip, so the whole body is needed
    let bytes = resp.bytes().await?;

    let zip_reader = ZipFileReader::new(bytes.into()).await?;

    let tmp_dir = TempDir::new()?;

    for i in 0..usize::MAX {
        let entry = match zip_reader.reader_with_entry(i).await {
            Ok(entry) => entry,
            Err(ZipError::EntryIndexOutOfBounds) => break,
            Err(e) => return Err(e.into()),
        };

        let filename = entry.entry().filename().as_str()?;

        if !FILE_NAMES.contains(&filename) {
            continue;
        }

        let path = tmp_dir.path().join(filename);
        let mut reader = entry.compat();

        let mut file = File::create(path).await?;
        io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
    }

    Ok(Some((last_modified, tmp_dir)))
}

/// Column names from the header record of a GTFS csv
fn read_csv_header(path: &Path) -> GtfsSyncResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)?;

    Ok(reader
        .headers()?
        .iter()
        .map(|c| c.trim_start_matches('\u{feff}').to_string())
        .collect())
}

/// A column definition for the csvtab schema, which is itself quoted in single quotes
fn schema_column(index: usize, name: &str) -> String {
    match name.is_empty() {
        true => format!("\"unnamed_{index}\""),
        false => format!("\"{}\"", name.replace('"', "\"\"").replace('\'', "''")),
    }
}

macro_rules! insert_from_csv {
    ($import_id:expr, $header:expr, $mod:ident, $id_cols:expr) => {
        {
            use $mod::*;

            let table_name = Entity::default().table_name().to_string();
            let csv_table_name = format!("{}_{}", table_name, $import_id);

            // Table columns without the id/import_id, limited to what the file has
            let csv_columns = Column::iter()
                .filter(|c| !["id", "import_id"].contains(&c.to_string().as_str()))
                .filter(|c| $header.contains(&c.to_string()))
                .collect_vec();

            // import_id at the end so we can select in the same order
            let all_columns = csv_columns.clone().into_iter()
                .chain([Column::ImportId])
                .collect_vec();

            let unique_cols = $id_cols
                .iter()
                .map(|c| Alias::new(c.to_string())).collect_vec();

            let mut csv_data = Query::select();
            for column in &csv_columns {
                // csvtab yields empty strings for empty cells
                let name = column.to_string();
                csv_data.expr_as(Expr::cust(format!("NULLIF(\"{name}\", '')")), Alias::new(name));
            }
            let csv_data = csv_data
                .expr_as(Expr::value($import_id), Alias::new("import_id")) // must come after cols
                .from(Alias::new(csv_table_name.clone()))
                // sqlite docs on select/insert upserts:
                // to avoid a parsing ambiguity, the SELECT statement should always contain a WHERE clause,
                // even if that clause is simply "WHERE true"
                .and_where(Expr::cust("true"))
                .to_owned();

            let insert = Query::insert()
                .into_table(Entity)
                .columns(all_columns.clone())
                .select_from(csv_data)?
                .on_conflict(
                    OnConflict::columns(unique_cols)
                        .update_columns(all_columns)
                        .to_owned()
                )
                .to_owned();

            (csv_table_name, insert.to_string(SqliteQueryBuilder))
        }
    };
}

macro_rules! delete_previous_imports {
    ($import_id:expr, $mod:ident) => {{
        use $mod::*;

        Query::delete()
            .from_table(Entity)
            .and_where(Expr::col(Column::ImportId).lt($import_id))
            .to_string(SqliteQueryBuilder)
    }};
}

pub(crate) struct SyncState {
    pub import_id: i64,
    pub file_dir: TempDir,
    pub db_path: String,
}

pub(crate) fn import_csvs(state: &SyncState) -> GtfsSyncResult<u64> {
    let SyncState {
        import_id,
        file_dir,
        db_path,
    } = state;

    // Rusqlite is used directly for its csv import functionality
    let mut conn = open_rusqlite(db_path)?;
    csvtab::load_module(&conn)?;

    // All files or none, so a bad feed leaves the previous import in place
    let db = conn.transaction()?;

    let dir_path = file_dir.path();

    let mut insert_count = 0;

    for filename in &FILE_NAMES {
        let i_id = *import_id;

        // Rows from older imports go whether or not this feed has the file
        let cleanup_sql = match *filename {
            "agency.txt" => delete_previous_imports!(i_id, gtfs_agency),
            "calendar.txt" => delete_previous_imports!(i_id, gtfs_calendar),
            "calendar_dates.txt" => delete_previous_imports!(i_id, gtfs_calendar_dates),
            "routes.txt" => delete_previous_imports!(i_id, gtfs_routes),
            "trips.txt" => delete_previous_imports!(i_id, gtfs_trips),
            "stop_times.txt" => delete_previous_imports!(i_id, gtfs_stop_times),
            other => unreachable!("FILE_NAMES out of sync with cleanup code: {}", other),
        };
        db.execute_batch(&cleanup_sql)?;

        let file_path = dir_path.join(filename);
        if !file_path.exists() {
            log::warn!("{} is missing from the feed", filename);
            continue;
        }
        let path = file_path
            .to_str()
            .ok_or_else(|| GtfsSyncError::InvalidPath(file_path.display().to_string()))?
            .to_string();
        let header = read_csv_header(&file_path)?;
        // Declared so the column names don't carry a byte order mark or quotes
        let schema = header
            .iter()
            .enumerate()
            .map(|(i, c)| schema_column(i, c))
            .join(", ");

        let (csv_table_name, update_from_csv) = match *filename {
            "agency.txt" => insert_from_csv!(i_id, header, gtfs_agency, ["agency_id"]),
            "calendar.txt" => insert_from_csv!(i_id, header, gtfs_calendar, ["service_id"]),
            "calendar_dates.txt" => {
                insert_from_csv!(i_id, header, gtfs_calendar_dates, ["service_id", "date"])
            }
            "routes.txt" => insert_from_csv!(i_id, header, gtfs_routes, ["route_id"]),
            "trips.txt" => insert_from_csv!(i_id, header, gtfs_trips, ["trip_id"]),
            "stop_times.txt" => {
                insert_from_csv!(i_id, header, gtfs_stop_times, ["trip_id", "stop_sequence"])
            }
            other => unreachable!("FILE_NAMES out of sync with insert code: {}", other),
        };

        let statement = format!(
            "
            CREATE VIRTUAL TABLE temp.{csv_table_name} USING csv(filename='{path}', header=yes, schema='CREATE TABLE x({schema})');
            {update_from_csv};
        "
        );

        log::trace!("{}", statement);

        db.execute_batch(&statement)?;
        let changes = db.changes();
        log::debug!("Imported {} rows from {}", changes, filename);
        insert_count += changes;

        db.execute_batch(&format!("DROP TABLE temp.{csv_table_name};"))?;
    }

    db.commit()?;

    Ok(insert_count)
}

pub struct Sync<'a> {
    db: &'a DatabaseConnection,
    db_path: &'a str,
    url: &'a str,
}

impl<'a> Sync<'a> {
    async fn do_sync(&self) -> GtfsSyncResult<u64> {
        log::debug!("Syncing GTFS data...");

        let last_import = Import::get_last_import(self.db).await?;

        let prev_last_modified = last_import.and_then(|i| i.file_last_modified);

        let (last_modified, tmp_dir) =
            match get_gtfs_files_from_zip(self.url, prev_last_modified).await? {
                Some((last_modified, tmp_dir)) => (last_modified, tmp_dir),
                None => {
                    log::debug!("No new GTFS data available");
                    return Ok(0);
                }
            };

        log::debug!("GTFS files extracted to {:?}", tmp_dir.path());

        let new_import = import::ActiveModel {
            ..Default::default()
        }
        .insert(self.db)
        .await?;

        let state = SyncState {
            import_id: new_import.id,
            file_dir: tmp_dir,
            db_path: self.db_path.to_string(),
        };
        let record_count = task::spawn_blocking(move || import_csvs(&state)).await??;

        log::info!("Imported {} GTFS records", record_count);

        // Only recorded once the import succeeded, so a failed one is retried
        let mut this_import = new_import.into_active_model();
        this_import.file_last_modified = Set(last_modified);
        this_import.save(self.db).await?;

        Ok(record_count)
    }

    /// Imports the feed at `url` if it changed since the last import.
    /// Returns the number of records written.
    pub async fn sync(
        db: &'a DatabaseConnection,
        db_path: &'a str,
        url: &'a str,
    ) -> GtfsSyncResult<u64> {
        Self { db, db_path, url }.do_sync().await
    }
}
