//! Station entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "stations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub name: String,

    #[sea_orm(nullable)]
    pub address: Option<String>,

    pub latitude: f64,
    pub longitude: f64,

    /// Active, Inactive, Maintenance
    pub status: String,

    /// `StationConfig` serialized as JSON
    #[sea_orm(column_type = "Text")]
    pub config: String,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::port::Entity")]
    Ports,
}

impl Related<super::port::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ports.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
