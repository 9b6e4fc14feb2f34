//! Port registry: authoritative in-memory port and station state
//!
//! Every port sits behind its own mutex. `compare_and_set` is the only way
//! port state changes; it never waits for the mutex and fails with
//! `PortBusy` instead. While the port is held the caller's commit step runs
//! (the ledger mutation), the event is published and the records are queued
//! for persistence, so readers never observe a port ahead of its event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::application::events::SharedBroadcaster;
use crate::application::outbox::{Outbox, OutboxRecord};
use crate::domain::{
    Actor, ConflictReason, DomainError, DomainResult, Port, PortEvent, PortState, Session,
    Station, TriggerKind,
};

struct PortSlot {
    port: Port,
    /// Set when the port is removed so that a holder of a stale `Arc`
    /// cannot transition it.
    retired: bool,
}

/// Expected and target state of one compare-and-set
pub struct CasRequest<'a> {
    pub expected: PortState,
    pub new: PortState,
    pub trigger: TriggerKind,
    pub actor: &'a Actor,
    /// When set, the port's sequence must also match
    pub expected_sequence: Option<u64>,
    pub at: DateTime<Utc>,
}

/// Result of a commit step: the port's new session binding and fault code,
/// plus the session record it touched.
pub struct CommitStep {
    pub active_session_id: Option<String>,
    pub session: Option<Session>,
    pub fault_code: Option<String>,
}

/// A committed transition
#[derive(Debug, Clone)]
pub struct Committed {
    pub port: Port,
    pub event: PortEvent,
    pub session: Option<Session>,
}

pub struct PortRegistry {
    ports: DashMap<String, Arc<Mutex<PortSlot>>>,
    stations: DashMap<String, Station>,
    /// Serializes station and port add/remove so a port cannot be added to
    /// a station that is being removed.
    catalogue: Mutex<()>,
    broadcaster: SharedBroadcaster,
    outbox: Outbox,
}

pub type SharedPortRegistry = Arc<PortRegistry>;

impl PortRegistry {
    pub fn new(broadcaster: SharedBroadcaster, outbox: Outbox) -> Self {
        Self {
            ports: DashMap::new(),
            stations: DashMap::new(),
            catalogue: Mutex::new(()),
            broadcaster,
            outbox,
        }
    }

    fn slot(&self, port_id: &str) -> DomainResult<Arc<Mutex<PortSlot>>> {
        self.ports
            .get(port_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| DomainError::not_found("Port", port_id))
    }

    /// Snapshot of a port
    pub fn get(&self, port_id: &str) -> DomainResult<Port> {
        let slot = self.slot(port_id)?;
        let guard = slot.lock();
        if guard.retired {
            return Err(DomainError::not_found("Port", port_id));
        }
        Ok(guard.port.clone())
    }

    /// Atomically moves a port from `req.expected` to `req.new`.
    ///
    /// `commit` runs while the port is held. If it fails, nothing changes.
    pub fn compare_and_set<F>(
        &self,
        port_id: &str,
        req: CasRequest<'_>,
        commit: F,
    ) -> DomainResult<Committed>
    where
        F: FnOnce(&Port) -> DomainResult<CommitStep>,
    {
        let slot = self.slot(port_id)?;
        let mut guard = slot
            .try_lock()
            .ok_or(DomainError::Conflict(ConflictReason::PortBusy))?;

        if guard.retired {
            return Err(DomainError::not_found("Port", port_id));
        }
        let current = &guard.port;
        if current.state != req.expected
            || req.expected_sequence.is_some_and(|s| s != current.sequence)
        {
            return Err(DomainError::Conflict(ConflictReason::StateMismatch {
                expected: req.expected,
                actual: current.state,
            }));
        }

        let step = commit(current)?;

        let mut port = current.clone();
        port.state = req.new;
        port.sequence += 1;
        port.last_transition_at = req.at;
        port.active_session_id = step.active_session_id;
        port.fault_code = step.fault_code;

        let event = PortEvent {
            sequence: port.sequence,
            port_id: port.id.clone(),
            station_id: port.station_id.clone(),
            session_id: step
                .session
                .as_ref()
                .map(|s| s.id.clone())
                .or_else(|| port.active_session_id.clone()),
            session_state: step.session.as_ref().map(|s| s.state),
            old_state: req.expected,
            new_state: req.new,
            trigger: req.trigger,
            actor: req.actor.clone(),
            timestamp: req.at,
        };

        guard.port = port.clone();
        self.broadcaster.publish(&event);

        self.outbox.enqueue(OutboxRecord::Port(port.clone()));
        if let Some(session) = &step.session {
            self.outbox.enqueue(OutboxRecord::Session(session.clone()));
        }
        self.outbox.enqueue(OutboxRecord::Event(event.clone()));

        Ok(Committed {
            port,
            event,
            session: step.session,
        })
    }

    // ── Catalogue ──────────────────────────────────────────────

    pub fn add_station(&self, station: Station) -> DomainResult<Station> {
        let _catalogue = self.catalogue.lock();
        match self.stations.entry(station.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(DomainError::Conflict(
                ConflictReason::AlreadyExists(format!("station {}", station.id)),
            )),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(station.clone());
                info!(station_id = %station.id, name = %station.name, "Station added");
                self.outbox.enqueue(OutboxRecord::Station(station.clone()));
                Ok(station)
            }
        }
    }

    /// Replaces a station's metadata. Every existing port's connector must
    /// stay supported.
    pub fn update_station(&self, mut station: Station) -> DomainResult<Station> {
        let _catalogue = self.catalogue.lock();
        if !self.stations.contains_key(&station.id) {
            return Err(DomainError::not_found("Station", station.id.clone()));
        }
        if let Some(port) = self
            .ports_of_station(&station.id)
            .into_iter()
            .find(|p| !station.config.supports(p.connector_type))
        {
            return Err(DomainError::Validation(format!(
                "port {} uses connector {} which the new configuration drops",
                port.id, port.connector_type
            )));
        }

        let mut entry = self
            .stations
            .get_mut(&station.id)
            .ok_or_else(|| DomainError::not_found("Station", station.id.clone()))?;
        station.created_at = entry.created_at;
        station.touch();
        *entry = station.clone();
        drop(entry);

        info!(station_id = %station.id, status = %station.status, "Station updated");
        self.outbox.enqueue(OutboxRecord::Station(station.clone()));
        Ok(station)
    }

    pub fn station(&self, station_id: &str) -> DomainResult<Station> {
        self.stations
            .get(station_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| DomainError::not_found("Station", station_id))
    }

    pub fn stations(&self) -> Vec<Station> {
        let mut all: Vec<Station> = self.stations.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Removes a station and its ports. Refused unless every port is
    /// `Available`; all ports are held for the duration.
    pub fn remove_station(&self, station_id: &str) -> DomainResult<Station> {
        let _catalogue = self.catalogue.lock();
        let station = self.station(station_id)?;

        // station_id never changes, so a plain read is enough to pick the ports
        let slots: Vec<Arc<Mutex<PortSlot>>> = self
            .ports
            .iter()
            .map(|e| e.value().clone())
            .collect::<Vec<_>>()
            .into_iter()
            .filter(|s| s.lock().port.station_id == station_id)
            .collect();
        let mut held = Vec::new();
        for slot in &slots {
            let guard = slot
                .try_lock()
                .ok_or(DomainError::Conflict(ConflictReason::PortBusy))?;
            if guard.retired {
                continue;
            }
            if !guard.port.is_available() {
                return Err(DomainError::Conflict(ConflictReason::InUse(format!(
                    "port {} is {}",
                    guard.port.id, guard.port.state
                ))));
            }
            held.push(guard);
        }

        for guard in held.iter_mut() {
            guard.retired = true;
            let port_id = guard.port.id.clone();
            self.ports.remove(&port_id);
            self.broadcaster.forget_port(&port_id);
            self.outbox.enqueue(OutboxRecord::PortRemoved(port_id));
        }
        let removed_ports = held.len();
        drop(held);

        self.stations.remove(station_id);
        self.outbox
            .enqueue(OutboxRecord::StationRemoved(station_id.to_string()));
        info!(station_id, removed_ports, "Station removed");
        Ok(station)
    }

    pub fn add_port(&self, port: Port) -> DomainResult<Port> {
        let _catalogue = self.catalogue.lock();
        let station = self.station(&port.station_id)?;
        if !station.config.supports(port.connector_type) {
            return Err(DomainError::Validation(format!(
                "station {} does not support connector {}",
                station.id, port.connector_type
            )));
        }
        if !(port.max_power_kw > 0.0) {
            return Err(DomainError::Validation(
                "max_power_kw must be positive".to_string(),
            ));
        }

        match self.ports.entry(port.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(DomainError::Conflict(ConflictReason::AlreadyExists(
                    format!("port {}", port.id),
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Arc::new(Mutex::new(PortSlot {
                    port: port.clone(),
                    retired: false,
                })));
            }
        }
        self.broadcaster.register_port(&port.id, port.sequence);
        self.outbox.enqueue(OutboxRecord::Port(port.clone()));
        info!(
            port_id = %port.id,
            station_id = %port.station_id,
            connector = %port.connector_type,
            "Port added"
        );
        Ok(port)
    }

    /// Removes an `Available` port.
    pub fn remove_port(&self, port_id: &str) -> DomainResult<Port> {
        let _catalogue = self.catalogue.lock();
        let slot = self.slot(port_id)?;
        let mut guard = slot
            .try_lock()
            .ok_or(DomainError::Conflict(ConflictReason::PortBusy))?;
        if guard.retired {
            return Err(DomainError::not_found("Port", port_id));
        }
        if !guard.port.is_available() {
            return Err(DomainError::Conflict(ConflictReason::InUse(format!(
                "port {} is {}",
                port_id, guard.port.state
            ))));
        }
        guard.retired = true;
        self.ports.remove(port_id);
        self.broadcaster.forget_port(port_id);
        self.outbox
            .enqueue(OutboxRecord::PortRemoved(port_id.to_string()));
        info!(port_id, "Port removed");
        Ok(guard.port.clone())
    }

    fn snapshots(&self) -> Vec<Port> {
        let slots: Vec<Arc<Mutex<PortSlot>>> =
            self.ports.iter().map(|e| e.value().clone()).collect();
        let mut ports: Vec<Port> = slots
            .iter()
            .map(|s| s.lock())
            .filter(|g| !g.retired)
            .map(|g| g.port.clone())
            .collect();
        ports.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        ports
    }

    /// All ports, ordered by creation
    pub fn list_ports(&self) -> Vec<Port> {
        self.snapshots()
    }

    pub fn ports_of_station(&self, station_id: &str) -> Vec<Port> {
        self.snapshots()
            .into_iter()
            .filter(|p| p.station_id == station_id)
            .collect()
    }

    pub fn ports_in_states(&self, states: &[PortState]) -> Vec<Port> {
        self.snapshots()
            .into_iter()
            .filter(|p| states.contains(&p.state))
            .collect()
    }

    /// Loads persisted state without queueing anything for persistence.
    pub fn hydrate(&self, stations: Vec<Station>, ports: Vec<Port>) {
        for station in stations {
            self.stations.insert(station.id.clone(), station);
        }
        let mut count = 0;
        for port in ports {
            if !self.stations.contains_key(&port.station_id) {
                debug!(port_id = %port.id, station_id = %port.station_id, "Skipping port of unknown station");
                continue;
            }
            self.broadcaster.register_port(&port.id, port.sequence);
            self.ports.insert(
                port.id.clone(),
                Arc::new(Mutex::new(PortSlot {
                    port,
                    retired: false,
                })),
            );
            count += 1;
        }
        info!(stations = self.stations.len(), ports = count, "Port registry hydrated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{EventBroadcaster, ResumeCursor, SubscriptionFilter};
    use crate::config::BroadcasterConfig;
    use crate::domain::{ConnectorType, StationConfig};

    fn registry() -> PortRegistry {
        let broadcaster = Arc::new(EventBroadcaster::new(BroadcasterConfig::default()));
        let registry = PortRegistry::new(broadcaster, Outbox::disabled());
        registry
            .add_station(Station::new("ST1", "Depot", 0.0, 0.0, StationConfig::default()))
            .unwrap();
        registry
            .add_port(Port::new("P1", "ST1", ConnectorType::Ccs, 150.0))
            .unwrap();
        registry
    }

    fn step() -> CommitStep {
        CommitStep {
            active_session_id: None,
            session: None,
            fault_code: None,
        }
    }

    fn offline_request(actor: &Actor) -> CasRequest<'_> {
        CasRequest {
            expected: PortState::Available,
            new: PortState::Offline,
            trigger: TriggerKind::TakeOffline,
            actor,
            expected_sequence: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn cas_bumps_sequence_and_publishes() {
        let r = registry();
        let mut sub = r
            .broadcaster
            .subscribe(SubscriptionFilter::Port("P1".into()), ResumeCursor::new())
            .unwrap();
        let actor = Actor::admin("A1");
        let committed = r
            .compare_and_set("P1", offline_request(&actor), |_| Ok(step()))
            .unwrap();
        assert_eq!(committed.port.state, PortState::Offline);
        assert_eq!(committed.event.sequence, 1);
        assert_eq!(r.get("P1").unwrap().sequence, 1);
        assert_eq!(sub.try_recv().unwrap().unwrap().sequence, 1);
    }

    #[test]
    fn cas_with_wrong_expected_state_conflicts() {
        let r = registry();
        let actor = Actor::admin("A1");
        let mut req = offline_request(&actor);
        req.expected = PortState::Charging;
        let err = r.compare_and_set("P1", req, |_| Ok(step())).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictReason::StateMismatch {
                actual: PortState::Available,
                ..
            })
        ));
    }

    #[test]
    fn cas_with_stale_sequence_conflicts() {
        let r = registry();
        let actor = Actor::admin("A1");
        let mut req = offline_request(&actor);
        req.expected_sequence = Some(7);
        let err = r.compare_and_set("P1", req, |_| Ok(step())).unwrap_err();
        assert!(err.is_contention());
    }

    #[test]
    fn failed_commit_leaves_port_untouched() {
        let r = registry();
        let actor = Actor::admin("A1");
        let err = r
            .compare_and_set("P1", offline_request(&actor), |_| {
                Err(DomainError::Validation("nope".into()))
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        let port = r.get("P1").unwrap();
        assert_eq!(port.state, PortState::Available);
        assert_eq!(port.sequence, 0);
    }

    #[test]
    fn held_port_fails_fast_with_busy() {
        let r = registry();
        let actor = Actor::admin("A1");
        let err = r
            .compare_and_set("P1", offline_request(&actor), |_| {
                let inner = r
                    .compare_and_set("P1", offline_request(&actor), |_| Ok(step()))
                    .unwrap_err();
                assert!(inner.is_port_busy());
                Err(inner)
            })
            .unwrap_err();
        assert!(err.is_port_busy());
    }

    #[test]
    fn unsupported_connector_is_rejected() {
        let r = registry();
        let err = r
            .add_port(Port::new("P2", "ST1", ConnectorType::Chademo, 50.0))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn duplicate_port_is_conflict() {
        let r = registry();
        let err = r
            .add_port(Port::new("P1", "ST1", ConnectorType::Ccs, 50.0))
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictReason::AlreadyExists(_))
        ));
    }

    #[test]
    fn busy_port_cannot_be_removed() {
        let r = registry();
        let actor = Actor::admin("A1");
        r.compare_and_set("P1", offline_request(&actor), |_| Ok(step()))
            .unwrap();
        let err = r.remove_port("P1").unwrap_err();
        assert!(matches!(err, DomainError::Conflict(ConflictReason::InUse(_))));
        let err = r.remove_station("ST1").unwrap_err();
        assert!(matches!(err, DomainError::Conflict(ConflictReason::InUse(_))));
    }

    #[test]
    fn port_added_during_station_removal_is_not_orphaned() {
        for round in 0..200 {
            let r = registry();
            let barrier = std::sync::Barrier::new(2);
            let port_id = format!("P{}", round + 2);
            std::thread::scope(|s| {
                s.spawn(|| {
                    barrier.wait();
                    let _ = r.add_port(Port::new(port_id.clone(), "ST1", ConnectorType::Ccs, 50.0));
                });
                s.spawn(|| {
                    barrier.wait();
                    let _ = r.remove_station("ST1");
                });
            });
            if r.station("ST1").is_err() {
                assert!(r.list_ports().is_empty(), "round {} left {:?}", round, r.list_ports());
                assert!(r.get(&port_id).is_err());
            }
        }
    }

    #[test]
    fn removing_station_removes_its_ports() {
        let r = registry();
        r.remove_station("ST1").unwrap();
        assert!(r.get("P1").is_err());
        assert!(r.station("ST1").is_err());
        assert!(r.list_ports().is_empty());
    }

    #[test]
    fn ports_in_states_filters() {
        let r = registry();
        r.add_port(Port::new("P2", "ST1", ConnectorType::Type2, 22.0))
            .unwrap();
        let actor = Actor::admin("A1");
        r.compare_and_set("P2", offline_request(&actor), |_| Ok(step()))
            .unwrap();
        let offline = r.ports_in_states(&[PortState::Offline]);
        assert_eq!(offline.len(), 1);
        assert_eq!(offline[0].id, "P2");
        assert_eq!(r.ports_of_station("ST1").len(), 2);
    }

    #[test]
    fn dropping_a_connector_in_use_is_rejected() {
        let r = registry();
        let mut station = r.station("ST1").unwrap();
        station.config.supported_connectors = vec![ConnectorType::Type2];
        assert!(matches!(
            r.update_station(station).unwrap_err(),
            DomainError::Validation(_)
        ));
    }
}
