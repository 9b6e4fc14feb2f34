//! Port event log entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "port_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub port_id: String,

    /// Unique together with `port_id`
    pub sequence: i64,

    pub station_id: String,

    #[sea_orm(nullable)]
    pub session_id: Option<String>,

    #[sea_orm(nullable)]
    pub session_state: Option<String>,

    pub old_state: String,
    pub new_state: String,
    pub trigger: String,

    pub actor_id: String,
    pub actor_role: String,

    pub timestamp: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
