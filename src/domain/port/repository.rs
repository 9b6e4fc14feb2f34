//! Port repository interface

use async_trait::async_trait;

use super::model::Port;
use crate::domain::DomainResult;

#[async_trait]
pub trait PortRepository: Send + Sync {
    /// Writes the port unless the stored copy has the same or a newer sequence.
    /// Returns `false` when the write was skipped.
    async fn store_if_newer(&self, port: Port) -> DomainResult<bool>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Port>>;
    async fn find_all(&self) -> DomainResult<Vec<Port>>;
    async fn delete(&self, id: &str) -> DomainResult<()>;
}
