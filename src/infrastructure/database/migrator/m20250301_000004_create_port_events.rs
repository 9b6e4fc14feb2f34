//! Create port_events table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PortEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PortEvents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PortEvents::PortId).string().not_null())
                    .col(ColumnDef::new(PortEvents::Sequence).big_integer().not_null())
                    .col(ColumnDef::new(PortEvents::StationId).string().not_null())
                    .col(ColumnDef::new(PortEvents::SessionId).string())
                    .col(ColumnDef::new(PortEvents::SessionState).string())
                    .col(ColumnDef::new(PortEvents::OldState).string().not_null())
                    .col(ColumnDef::new(PortEvents::NewState).string().not_null())
                    .col(ColumnDef::new(PortEvents::Trigger).string().not_null())
                    .col(ColumnDef::new(PortEvents::ActorId).string().not_null())
                    .col(ColumnDef::new(PortEvents::ActorRole).string().not_null())
                    .col(
                        ColumnDef::new(PortEvents::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One event per (port, sequence); replays of the same write are no-ops
        manager
            .create_index(
                Index::create()
                    .name("idx_port_events_port_sequence")
                    .table(PortEvents::Table)
                    .col(PortEvents::PortId)
                    .col(PortEvents::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PortEvents::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum PortEvents {
    Table,
    Id,
    PortId,
    Sequence,
    StationId,
    SessionId,
    SessionState,
    OldState,
    NewState,
    Trigger,
    ActorId,
    ActorRole,
    Timestamp,
}
