//! Startup recovery
//!
//! Rebuilds the in-memory registry, ledger and replay buffers from the
//! repositories, then reconciles what does not line up: sessions no port
//! points at are aborted, ports pointing at nothing are faulted.
//! Only open sessions are loaded; finished ones are read from storage on
//! demand through the engine's archive.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::application::engine::AllocationEngine;
use crate::domain::transition::PortTrigger;
use crate::domain::{
    Actor, DomainResult, PortState, RepositoryProvider, Session, SessionOutcome,
};

pub const RECOVERY_ACTOR_ID: &str = "startup-recovery";
pub const RECOVERY_FAULT_CODE: &str = "RecoveryMismatch";

#[derive(Debug, Default, Clone, Serialize)]
pub struct RecoveryReport {
    pub stations: usize,
    pub ports: usize,
    pub open_sessions: usize,
    pub orphaned_sessions: usize,
    pub faulted_ports: usize,
    pub replayed_events: usize,
}

/// Loads persisted state into `engine`. Must run before any request is served.
pub async fn restore_state(
    repos: &dyn RepositoryProvider,
    engine: &AllocationEngine,
) -> DomainResult<RecoveryReport> {
    let mut report = RecoveryReport::default();

    let stations = repos.stations().find_all().await?;
    let ports = repos.ports().find_all().await?;
    report.stations = stations.len();
    engine.registry().hydrate(stations, ports);
    let ports = engine.registry().list_ports();
    report.ports = ports.len();

    let referenced: HashSet<&str> = ports
        .iter()
        .filter_map(|p| p.active_session_id.as_deref())
        .collect();

    let mut open: Vec<Session> = Vec::new();
    let now = Utc::now();
    for mut session in repos.sessions().find_open().await? {
        if referenced.contains(session.id.as_str()) {
            open.push(session);
            continue;
        }
        warn!(session_id = %session.id, port_id = %session.port_id, "Aborting session no port refers to");
        session.finish(SessionOutcome::Aborted, "orphaned at restart", now);
        repos.sessions().save(session).await?;
        report.orphaned_sessions += 1;
    }
    report.open_sessions = open.len();
    engine.ledger().hydrate(open);

    let retain = engine.broadcaster().config().replay_buffer_size as u64;
    for port in &ports {
        let events = repos
            .events()
            .find_after(&port.id, port.sequence.saturating_sub(retain), retain)
            .await?;
        report.replayed_events += events.len();
        engine.broadcaster().restore(&port.id, port.sequence, events);
    }

    let actor = Actor::system(RECOVERY_ACTOR_ID);
    for port in &ports {
        if !needs_fault(engine, port.state, port.active_session_id.as_deref()) {
            continue;
        }
        warn!(port_id = %port.id, state = %port.state, session_id = ?port.active_session_id, "Port state does not match the session ledger");
        let trigger = PortTrigger::FaultReport {
            code: RECOVERY_FAULT_CODE.to_string(),
        };
        match engine.apply(&port.id, trigger, &actor) {
            Ok(_) => report.faulted_ports += 1,
            Err(e) => warn!(port_id = %port.id, error = %e, "Could not fault inconsistent port"),
        }
    }

    info!(
        stations = report.stations,
        ports = report.ports,
        open_sessions = report.open_sessions,
        orphaned = report.orphaned_sessions,
        faulted = report.faulted_ports,
        "♻️ State restored"
    );
    Ok(report)
}

fn needs_fault(engine: &AllocationEngine, state: PortState, session_id: Option<&str>) -> bool {
    if state == PortState::Faulted {
        return false;
    }
    match session_id {
        Some(sid) => !matches!(engine.ledger().state_of(sid), Some(s) if !s.is_terminal()),
        None => matches!(
            state,
            PortState::Reserved | PortState::Charging | PortState::Completing
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AllocationConfig, BroadcasterConfig};
    use crate::domain::{ActorRole, ConnectorType, Port, SessionState, Station, StationConfig};
    use crate::infrastructure::storage::InMemoryRepositoryProvider;

    fn engine() -> AllocationEngine {
        AllocationEngine::in_memory(AllocationConfig::default(), BroadcasterConfig::default())
    }

    async fn seed(repos: &InMemoryRepositoryProvider) {
        let station = Station::new("ST1", "Depot", 41.3, 69.2, StationConfig::default());
        repos.stations().save(station).await.unwrap();
        for id in ["P1", "P2", "P3"] {
            let port = Port::new(id, "ST1", ConnectorType::Ccs, 150.0);
            repos.ports().store_if_newer(port).await.unwrap();
        }
    }

    #[tokio::test]
    async fn consistent_state_is_restored_as_is() {
        let repos = InMemoryRepositoryProvider::new();
        seed(&repos).await;
        let session = Session::new("P1", "ST1", "V1", "U1", Utc::now());
        let mut port = repos.ports().find_by_id("P1").await.unwrap().unwrap();
        port.state = PortState::Reserved;
        port.sequence = 1;
        port.active_session_id = Some(session.id.clone());
        repos.ports().store_if_newer(port).await.unwrap();
        repos.sessions().save(session.clone()).await.unwrap();

        let engine = engine();
        let report = restore_state(&repos, &engine).await.unwrap();
        assert_eq!(report.ports, 3);
        assert_eq!(report.open_sessions, 1);
        assert_eq!(report.faulted_ports, 0);
        assert_eq!(engine.get_port_state("P1").unwrap().state, PortState::Reserved);
        assert_eq!(engine.broadcaster().latest_sequence("P1"), Some(1));

        // The restored session can be driven further
        let hw = Actor::new("ST1", ActorRole::Station, Utc::now());
        let committed = engine
            .apply("P1", PortTrigger::HardwareAck { session_id: Some(session.id.clone()) }, &hw)
            .unwrap();
        assert_eq!(committed.event.sequence, 2);
    }

    #[tokio::test]
    async fn orphaned_session_is_aborted() {
        let repos = InMemoryRepositoryProvider::new();
        seed(&repos).await;
        let session = Session::new("P2", "ST1", "V9", "U9", Utc::now());
        repos.sessions().save(session.clone()).await.unwrap();

        let engine = engine();
        let report = restore_state(&repos, &engine).await.unwrap();
        assert_eq!(report.orphaned_sessions, 1);
        let stored = repos.sessions().find_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::Aborted);
        assert!(engine.ledger().active_session_for("P2").is_none());
    }

    #[tokio::test]
    async fn port_without_session_is_faulted() {
        let repos = InMemoryRepositoryProvider::new();
        seed(&repos).await;
        let mut port = repos.ports().find_by_id("P3").await.unwrap().unwrap();
        port.state = PortState::Charging;
        port.sequence = 2;
        port.active_session_id = Some("missing".into());
        repos.ports().store_if_newer(port).await.unwrap();

        let engine = engine();
        let report = restore_state(&repos, &engine).await.unwrap();
        assert_eq!(report.faulted_ports, 1);
        let port = engine.get_port_state("P3").unwrap();
        assert_eq!(port.state, PortState::Faulted);
        assert_eq!(port.sequence, 3);
        assert_eq!(port.fault_code.as_deref(), Some(RECOVERY_FAULT_CODE));
    }
}
