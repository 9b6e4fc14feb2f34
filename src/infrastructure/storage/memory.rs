//! In-memory repository provider for development and testing

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::events::PortEventRepository;
use crate::domain::port::PortRepository;
use crate::domain::session::SessionRepository;
use crate::domain::station::StationRepository;
use crate::domain::{DomainResult, Port, PortEvent, RepositoryProvider, Session, Station};

/// Keeps every record in `DashMap`s; nothing survives the process.
#[derive(Default)]
pub struct InMemoryRepositoryProvider {
    stations: DashMap<String, Station>,
    ports: DashMap<String, Port>,
    sessions: DashMap<String, Session>,
    /// port id -> sequence -> event
    events: DashMap<String, BTreeMap<u64, PortEvent>>,
}

impl InMemoryRepositoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_count(&self, port_id: &str) -> usize {
        self.events.get(port_id).map(|e| e.len()).unwrap_or(0)
    }
}

impl RepositoryProvider for InMemoryRepositoryProvider {
    fn stations(&self) -> &dyn StationRepository {
        self
    }

    fn ports(&self) -> &dyn PortRepository {
        self
    }

    fn sessions(&self) -> &dyn SessionRepository {
        self
    }

    fn events(&self) -> &dyn PortEventRepository {
        self
    }
}

#[async_trait]
impl StationRepository for InMemoryRepositoryProvider {
    async fn save(&self, station: Station) -> DomainResult<()> {
        self.stations.insert(station.id.clone(), station);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Station>> {
        Ok(self.stations.get(id).map(|s| s.value().clone()))
    }

    async fn find_all(&self) -> DomainResult<Vec<Station>> {
        let mut all: Vec<Station> = self.stations.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        self.stations.remove(id);
        let ports: Vec<String> = self
            .ports
            .iter()
            .filter(|p| p.station_id == id)
            .map(|p| p.key().clone())
            .collect();
        for port_id in ports {
            self.ports.remove(&port_id);
            self.events.remove(&port_id);
        }
        Ok(())
    }
}

#[async_trait]
impl PortRepository for InMemoryRepositoryProvider {
    async fn store_if_newer(&self, port: Port) -> DomainResult<bool> {
        match self.ports.entry(port.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut stored) => {
                if stored.get().sequence >= port.sequence {
                    return Ok(false);
                }
                stored.insert(port);
                Ok(true)
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(port);
                Ok(true)
            }
        }
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Port>> {
        Ok(self.ports.get(id).map(|p| p.value().clone()))
    }

    async fn find_all(&self) -> DomainResult<Vec<Port>> {
        let mut all: Vec<Port> = self.ports.iter().map(|p| p.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        self.ports.remove(id);
        self.events.remove(id);
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepositoryProvider {
    async fn save(&self, session: Session) -> DomainResult<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Session>> {
        Ok(self.sessions.get(id).map(|s| s.value().clone()))
    }

    async fn find_for_user(&self, user_id: &str) -> DomainResult<Vec<Session>> {
        let mut found: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.value().clone())
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(found)
    }

    async fn find_open(&self) -> DomainResult<Vec<Session>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| !s.is_terminal())
            .map(|s| s.value().clone())
            .collect())
    }
}

#[async_trait]
impl PortEventRepository for InMemoryRepositoryProvider {
    async fn append(&self, event: PortEvent) -> DomainResult<()> {
        self.events
            .entry(event.port_id.clone())
            .or_default()
            .entry(event.sequence)
            .or_insert(event);
        Ok(())
    }

    async fn find_after(&self, port_id: &str, after: u64, limit: u64) -> DomainResult<Vec<PortEvent>> {
        Ok(self
            .events
            .get(port_id)
            .map(|log| {
                log.range(after + 1..)
                    .take(limit as usize)
                    .map(|(_, e)| e.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
