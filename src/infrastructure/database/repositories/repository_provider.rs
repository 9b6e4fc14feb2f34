//! SeaORM implementation of RepositoryProvider

use sea_orm::DatabaseConnection;

use crate::domain::events::PortEventRepository;
use crate::domain::port::PortRepository;
use crate::domain::repositories::RepositoryProvider;
use crate::domain::session::SessionRepository;
use crate::domain::station::StationRepository;

use super::port_event_repository::SeaOrmPortEventRepository;
use super::port_repository::SeaOrmPortRepository;
use super::session_repository::SeaOrmSessionRepository;
use super::station_repository::SeaOrmStationRepository;

/// Unified repository provider backed by SeaORM.
///
/// Holds one connection pool and exposes per-aggregate repository accessors.
///
/// ```ignore
/// let repos = SeaOrmRepositoryProvider::new(db.clone());
/// let port = repos.ports().find_by_id("P101").await?;
/// let open = repos.sessions().find_open().await?;
/// ```
pub struct SeaOrmRepositoryProvider {
    stations: SeaOrmStationRepository,
    ports: SeaOrmPortRepository,
    sessions: SeaOrmSessionRepository,
    events: SeaOrmPortEventRepository,
}

impl SeaOrmRepositoryProvider {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            stations: SeaOrmStationRepository::new(db.clone()),
            ports: SeaOrmPortRepository::new(db.clone()),
            sessions: SeaOrmSessionRepository::new(db.clone()),
            events: SeaOrmPortEventRepository::new(db),
        }
    }
}

impl RepositoryProvider for SeaOrmRepositoryProvider {
    fn stations(&self) -> &dyn StationRepository {
        &self.stations
    }

    fn ports(&self) -> &dyn PortRepository {
        &self.ports
    }

    fn sessions(&self) -> &dyn SessionRepository {
        &self.sessions
    }

    fn events(&self) -> &dyn PortEventRepository {
        &self.events
    }
}
