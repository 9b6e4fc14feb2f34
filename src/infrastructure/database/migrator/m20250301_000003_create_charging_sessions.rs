//! Create charging_sessions table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChargingSessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChargingSessions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChargingSessions::PortId).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::StationId).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::VehicleId).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::UserId).string().not_null())
                    .col(ColumnDef::new(ChargingSessions::State).string().not_null())
                    .col(
                        ColumnDef::new(ChargingSessions::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ChargingSessions::EndedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ChargingSessions::EnergyKwh)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ChargingSessions::DurationSecs)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ChargingSessions::LastPowerKw).double())
                    .col(ColumnDef::new(ChargingSessions::EndReason).string())
                    .col(
                        ColumnDef::new(ChargingSessions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_charging_sessions_user")
                    .table(ChargingSessions::Table)
                    .col(ChargingSessions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_charging_sessions_state")
                    .table(ChargingSessions::Table)
                    .col(ChargingSessions::State)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChargingSessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ChargingSessions {
    Table,
    Id,
    PortId,
    StationId,
    VehicleId,
    UserId,
    State,
    StartedAt,
    EndedAt,
    EnergyKwh,
    DurationSecs,
    LastPowerKw,
    EndReason,
    UpdatedAt,
}
