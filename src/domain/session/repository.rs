//! Session repository interface

use async_trait::async_trait;

use super::model::Session;
use crate::domain::DomainResult;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert or replace
    async fn save(&self, session: Session) -> DomainResult<()>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Session>>;
    async fn find_for_user(&self, user_id: &str) -> DomainResult<Vec<Session>>;
    /// Sessions not yet in a terminal state
    async fn find_open(&self) -> DomainResult<Vec<Session>>;
}
