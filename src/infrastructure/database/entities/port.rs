//! Port entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ports")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub station_id: String,

    pub connector_type: String,

    pub max_power_kw: f64,

    /// Available, Reserved, Charging, Completing, Faulted, Offline
    pub state: String,

    pub last_transition_at: DateTimeUtc,

    #[sea_orm(nullable)]
    pub active_session_id: Option<String>,

    /// Sequence of the last applied event. Writes with a lower version are dropped.
    pub version: i64,

    #[sea_orm(nullable)]
    pub fault_code: Option<String>,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::station::Entity",
        from = "Column::StationId",
        to = "super::station::Column::Id"
    )]
    Station,
}

impl Related<super::station::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Station.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
