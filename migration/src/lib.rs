pub use sea_orm_migration::prelude::*;

pub mod raw;

use crate::raw::*;

pub struct Migrator;

sql_migration!("000001_gtfs_tables");
sql_migration!("000002_vehicle_updates");
sql_migration!("000003_alerts");

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Sql000001GtfsTables::boxed(),
            Sql000002VehicleUpdates::boxed(),
            Sql000003Alerts::boxed(),
        ]
    }
}
