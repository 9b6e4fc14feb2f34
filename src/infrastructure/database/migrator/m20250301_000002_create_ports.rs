//! Create ports table

use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_stations::Stations;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ports::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Ports::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Ports::StationId).string().not_null())
                    .col(ColumnDef::new(Ports::ConnectorType).string().not_null())
                    .col(ColumnDef::new(Ports::MaxPowerKw).double().not_null())
                    .col(
                        ColumnDef::new(Ports::State)
                            .string()
                            .not_null()
                            .default("Available"),
                    )
                    .col(
                        ColumnDef::new(Ports::LastTransitionAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Ports::ActiveSessionId).string())
                    .col(
                        ColumnDef::new(Ports::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Ports::FaultCode).string())
                    .col(
                        ColumnDef::new(Ports::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ports_station")
                            .from(Ports::Table, Ports::StationId)
                            .to(Stations::Table, Stations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_ports_station")
                    .table(Ports::Table)
                    .col(Ports::StationId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Ports::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Ports {
    Table,
    Id,
    StationId,
    ConnectorType,
    MaxPowerKw,
    State,
    LastTransitionAt,
    ActiveSessionId,
    Version,
    FaultCode,
    CreatedAt,
}
