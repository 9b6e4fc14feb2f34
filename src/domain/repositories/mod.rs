//! Repository traits for the domain layer
//!
//! Contains:
//! - `RepositoryProvider`: unified access to all per-aggregate repositories
//! - `DomainResult`: standard result type for domain operations

use super::events::PortEventRepository;
use super::port::PortRepository;
use super::session::SessionRepository;
use super::station::StationRepository;
use crate::shared::errors::DomainError;

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Provides access to all domain repositories.
///
/// Consumers request only the repository they need:
///
/// ```ignore
/// async fn restore(repos: &dyn RepositoryProvider) {
///     let ports = repos.ports().find_all().await?;
///     let open = repos.sessions().find_open().await?;
/// }
/// ```
pub trait RepositoryProvider: Send + Sync {
    fn stations(&self) -> &dyn StationRepository;
    fn ports(&self) -> &dyn PortRepository;
    fn sessions(&self) -> &dyn SessionRepository;
    fn events(&self) -> &dyn PortEventRepository;
}
