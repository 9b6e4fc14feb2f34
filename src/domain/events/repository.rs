//! Port event log interface

use async_trait::async_trait;

use super::types::PortEvent;
use crate::domain::DomainResult;

#[async_trait]
pub trait PortEventRepository: Send + Sync {
    /// Appending an already stored (port, sequence) pair is a no-op
    async fn append(&self, event: PortEvent) -> DomainResult<()>;
    /// Events of a port with sequence greater than `after`, ascending
    async fn find_after(&self, port_id: &str, after: u64, limit: u64) -> DomainResult<Vec<PortEvent>>;
}
