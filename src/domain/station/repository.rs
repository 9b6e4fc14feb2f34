//! Station repository interface

use async_trait::async_trait;

use super::model::Station;
use crate::domain::DomainResult;

#[async_trait]
pub trait StationRepository: Send + Sync {
    /// Insert or replace
    async fn save(&self, station: Station) -> DomainResult<()>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Station>>;
    async fn find_all(&self) -> DomainResult<Vec<Station>>;
    async fn delete(&self, id: &str) -> DomainResult<()>;
}
