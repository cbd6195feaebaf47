use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vehicle_updates")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub start_date: String,
    pub trip_id: String,
    pub route_id: Option<String>,
    pub direction_id: Option<i32>,
    #[sea_orm(column_type = "Double")]
    pub lat: f64,
    #[sea_orm(column_type = "Double")]
    pub lon: f64,
    #[sea_orm(column_type = "Double")]
    pub speed: f64,
    pub stop_sequence: i32,
    pub stop_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub vehicle_status: i32,
    pub observed_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
