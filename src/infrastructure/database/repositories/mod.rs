//! Database repository implementations
//!
//! Per-aggregate SeaORM repositories + unified RepositoryProvider.

pub mod port_event_repository;
pub mod port_repository;
pub mod repository_provider;
pub mod session_repository;
pub mod station_repository;

pub use repository_provider::SeaOrmRepositoryProvider;

use crate::domain::DomainError;

fn db_err(e: sea_orm::DbErr) -> DomainError {
    DomainError::Persistence(format!("Database error: {}", e))
}

/// A stored column holds a value the domain no longer knows.
fn corrupt(entity: &str, column: &str, value: &str) -> DomainError {
    DomainError::Persistence(format!("{}.{} holds unknown value '{}'", entity, column, value))
}
