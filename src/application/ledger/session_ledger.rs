//! Session ledger
//!
//! Holds every session known to this process plus three indexes over the
//! non-terminal ones: by port, by vehicle and a per-station load counter.
//! Mutations are driven by the allocation engine from inside a port
//! compare-and-set, so the ledger itself only has to keep each map entry
//! consistent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::domain::{
    ConflictReason, DomainError, DomainResult, Session, SessionOutcome, SessionState, Station,
};

#[derive(Default)]
pub struct SessionLedger {
    sessions: DashMap<String, Session>,
    /// port id -> open session id
    by_port: DashMap<String, String>,
    /// vehicle id -> open session id
    by_vehicle: DashMap<String, String>,
    /// station id -> number of open sessions
    station_load: DashMap<String, u32>,
}

pub type SharedSessionLedger = Arc<SessionLedger>;

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a Pending session on `port_id`.
    ///
    /// Fails with `VehicleBusy` if the vehicle already has an open session and
    /// with `StationAtCapacity` if the station is full. Nothing is left behind
    /// on failure.
    pub fn open(
        &self,
        port_id: &str,
        station: &Station,
        vehicle_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Session> {
        let session = Session::new(port_id, &station.id, vehicle_id, user_id, now);

        match self.by_vehicle.entry(vehicle_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(DomainError::Conflict(ConflictReason::VehicleBusy {
                    vehicle_id: vehicle_id.to_string(),
                }))
            }
            Entry::Vacant(v) => {
                v.insert(session.id.clone());
            }
        }

        {
            let limit = station.config.max_concurrent_sessions;
            let mut load = self.station_load.entry(station.id.clone()).or_insert(0);
            if *load >= limit {
                drop(load);
                self.by_vehicle.remove(vehicle_id);
                return Err(DomainError::Conflict(ConflictReason::StationAtCapacity {
                    station_id: station.id.clone(),
                    limit,
                }));
            }
            *load += 1;
        }

        self.by_port
            .insert(port_id.to_string(), session.id.clone());
        self.sessions.insert(session.id.clone(), session.clone());

        info!(
            session_id = %session.id,
            port_id,
            vehicle_id,
            user_id,
            "Session opened"
        );
        Ok(session)
    }

    fn update<F>(&self, session_id: &str, f: F) -> DomainResult<Session>
    where
        F: FnOnce(&mut Session) -> bool,
    {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DomainError::not_found("Session", session_id))?;
        if !f(entry.value_mut()) {
            return Err(DomainError::Conflict(ConflictReason::SessionState {
                session_id: session_id.to_string(),
                state: entry.state.to_string(),
            }));
        }
        Ok(entry.clone())
    }

    /// Pending -> Active
    pub fn activate(&self, session_id: &str, now: DateTime<Utc>) -> DomainResult<Session> {
        self.update(session_id, |s| s.activate(now))
    }

    /// Active -> Completing
    pub fn begin_completing(&self, session_id: &str, now: DateTime<Utc>) -> DomainResult<Session> {
        self.update(session_id, |s| s.begin_completing(now))
    }

    /// Moves a session to a terminal state and releases its indexes.
    ///
    /// Closing an already terminal session returns the existing record.
    /// `final_energy_kwh` is recorded before closing when given.
    pub fn close(
        &self,
        session_id: &str,
        outcome: SessionOutcome,
        reason: &str,
        final_energy_kwh: Option<f64>,
        now: DateTime<Utc>,
    ) -> DomainResult<Session> {
        let session = {
            let mut entry = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| DomainError::not_found("Session", session_id))?;
            if entry.is_terminal() {
                debug!(session_id, state = %entry.state, "Session already terminal");
                return Ok(entry.clone());
            }
            if final_energy_kwh.is_some() {
                entry.record_metrics(final_energy_kwh, None, now);
            }
            entry.finish(outcome, reason, now);
            entry.clone()
        };

        self.by_port
            .remove_if(&session.port_id, |_, id| id == session_id);
        self.by_vehicle
            .remove_if(&session.vehicle_id, |_, id| id == session_id);
        if let Some(mut load) = self.station_load.get_mut(&session.station_id) {
            *load = load.saturating_sub(1);
        }

        info!(
            session_id,
            port_id = %session.port_id,
            state = %session.state,
            reason,
            energy_kwh = session.metrics.energy_kwh,
            "Session closed"
        );
        Ok(session)
    }

    /// Meter update. Returns `None` when the session is already terminal.
    pub fn record_metrics(
        &self,
        session_id: &str,
        energy_kwh: Option<f64>,
        power_kw: Option<f64>,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<Session>> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| DomainError::not_found("Session", session_id))?;
        if !entry.record_metrics(energy_kwh, power_kw, now) {
            return Ok(None);
        }
        Ok(Some(entry.clone()))
    }

    pub fn get(&self, session_id: &str) -> DomainResult<Session> {
        self.sessions
            .get(session_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| DomainError::not_found("Session", session_id))
    }

    pub fn active_session_for(&self, port_id: &str) -> Option<Session> {
        let session_id = self.by_port.get(port_id)?.value().clone();
        self.sessions.get(&session_id).map(|s| s.value().clone())
    }

    pub fn active_sessions(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|s| !s.is_terminal())
            .map(|s| s.value().clone())
            .collect()
    }

    /// Sessions of a user, newest first
    pub fn sessions_for_user(&self, user_id: &str) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions
    }

    pub fn open_count_for_station(&self, station_id: &str) -> u32 {
        self.station_load
            .get(station_id)
            .map(|l| *l.value())
            .unwrap_or(0)
    }

    /// Loads persisted sessions and rebuilds the indexes of the open ones.
    pub fn hydrate(&self, sessions: Vec<Session>) {
        let mut open = 0;
        for session in sessions {
            if !session.is_terminal() {
                self.by_port
                    .insert(session.port_id.clone(), session.id.clone());
                self.by_vehicle
                    .insert(session.vehicle_id.clone(), session.id.clone());
                *self
                    .station_load
                    .entry(session.station_id.clone())
                    .or_insert(0) += 1;
                open += 1;
            }
            self.sessions.insert(session.id.clone(), session);
        }
        info!(open, total = self.sessions.len(), "Session ledger hydrated");
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn state_of(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.get(session_id).map(|s| s.state)
    }

    /// Drops a finished session from memory. Open sessions are kept.
    pub fn evict_terminal(&self, session_id: &str) -> bool {
        self.sessions
            .remove_if(session_id, |_, s| s.is_terminal())
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StationConfig;

    fn station(limit: u32) -> Station {
        Station::new(
            "ST1",
            "Depot",
            0.0,
            0.0,
            StationConfig {
                max_concurrent_sessions: limit,
                ..StationConfig::default()
            },
        )
    }

    #[test]
    fn open_binds_port_and_vehicle() {
        let ledger = SessionLedger::new();
        let s = ledger.open("P1", &station(4), "V1", "U1", Utc::now()).unwrap();
        assert_eq!(s.state, SessionState::Pending);
        assert_eq!(ledger.active_session_for("P1").unwrap().id, s.id);
        assert_eq!(ledger.open_count_for_station("ST1"), 1);
    }

    #[test]
    fn vehicle_cannot_hold_two_sessions() {
        let ledger = SessionLedger::new();
        ledger.open("P1", &station(4), "V1", "U1", Utc::now()).unwrap();
        let err = ledger
            .open("P2", &station(4), "V1", "U1", Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictReason::VehicleBusy { .. })
        ));
        assert!(ledger.active_session_for("P2").is_none());
    }

    #[test]
    fn capacity_rejection_releases_vehicle() {
        let ledger = SessionLedger::new();
        ledger.open("P1", &station(1), "V1", "U1", Utc::now()).unwrap();
        let err = ledger
            .open("P2", &station(1), "V2", "U2", Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictReason::StationAtCapacity { limit: 1, .. })
        ));
        // V2 is free again and fits once capacity is released
        let first = ledger.active_session_for("P1").unwrap();
        ledger
            .close(&first.id, SessionOutcome::Aborted, "test", None, Utc::now())
            .unwrap();
        assert!(ledger.open("P2", &station(1), "V2", "U2", Utc::now()).is_ok());
    }

    #[test]
    fn close_is_idempotent() {
        let ledger = SessionLedger::new();
        let s = ledger.open("P1", &station(4), "V1", "U1", Utc::now()).unwrap();
        let first = ledger
            .close(&s.id, SessionOutcome::Aborted, "timeout", None, Utc::now())
            .unwrap();
        let second = ledger
            .close(&s.id, SessionOutcome::Closed, "late", Some(3.0), Utc::now())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(second.state, SessionState::Aborted);
        assert_eq!(ledger.open_count_for_station("ST1"), 0);
        assert!(ledger.active_session_for("P1").is_none());
    }

    #[test]
    fn activate_twice_is_conflict() {
        let ledger = SessionLedger::new();
        let s = ledger.open("P1", &station(4), "V1", "U1", Utc::now()).unwrap();
        ledger.activate(&s.id, Utc::now()).unwrap();
        let err = ledger.activate(&s.id, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictReason::SessionState { .. })
        ));
    }

    #[test]
    fn user_sessions_newest_first() {
        let ledger = SessionLedger::new();
        let t0 = Utc::now();
        let a = ledger.open("P1", &station(4), "V1", "U1", t0).unwrap();
        let b = ledger
            .open("P2", &station(4), "V2", "U1", t0 + chrono::Duration::seconds(5))
            .unwrap();
        ledger.open("P3", &station(4), "V3", "U2", t0).unwrap();
        let ids: Vec<_> = ledger
            .sessions_for_user("U1")
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn hydrate_rebuilds_indexes() {
        let source = SessionLedger::new();
        let open = source.open("P1", &station(4), "V1", "U1", Utc::now()).unwrap();
        let done = source.open("P2", &station(4), "V2", "U1", Utc::now()).unwrap();
        let done = source
            .close(&done.id, SessionOutcome::Closed, "final", Some(12.5), Utc::now())
            .unwrap();

        let ledger = SessionLedger::new();
        ledger.hydrate(vec![open.clone(), done]);
        assert_eq!(ledger.active_session_for("P1").unwrap().id, open.id);
        assert!(ledger.active_session_for("P2").is_none());
        assert_eq!(ledger.open_count_for_station("ST1"), 1);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn only_finished_sessions_are_evicted() {
        let ledger = SessionLedger::new();
        let open = ledger.open("P1", &station(4), "V1", "U1", Utc::now()).unwrap();
        let done = ledger.open("P2", &station(4), "V2", "U1", Utc::now()).unwrap();
        ledger
            .close(&done.id, SessionOutcome::Closed, "final", Some(4.0), Utc::now())
            .unwrap();

        assert!(!ledger.evict_terminal(&open.id));
        assert!(ledger.evict_terminal(&done.id));
        assert!(!ledger.evict_terminal(&done.id));
        assert!(matches!(
            ledger.get(&done.id),
            Err(DomainError::NotFound { .. })
        ));
        assert_eq!(ledger.active_session_for("P1").unwrap().id, open.id);
        assert_eq!(ledger.len(), 1);
    }
}
