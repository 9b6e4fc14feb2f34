//! Charging session entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "charging_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub port_id: String,
    pub station_id: String,
    pub vehicle_id: String,
    pub user_id: String,

    /// Pending, Active, Completing, Closed, Aborted
    pub state: String,

    pub started_at: DateTimeUtc,

    #[sea_orm(nullable)]
    pub ended_at: Option<DateTimeUtc>,

    pub energy_kwh: f64,
    pub duration_secs: i64,

    #[sea_orm(nullable)]
    pub last_power_kw: Option<f64>,

    #[sea_orm(nullable)]
    pub end_reason: Option<String>,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
