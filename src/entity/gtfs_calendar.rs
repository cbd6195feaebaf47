use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "gtfs_calendar")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub import_id: i64,
    #[sea_orm(unique)]
    pub service_id: String,
    pub monday: Option<i32>,
    pub tuesday: Option<i32>,
    pub wednesday: Option<i32>,
    pub thursday: Option<i32>,
    pub friday: Option<i32>,
    pub saturday: Option<i32>,
    pub sunday: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
