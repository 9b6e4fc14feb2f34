//! Allocation engine
//!
//! Validates triggers against the transition table and the role guards and
//! applies them through the port registry. Client requests get a single
//! attempt and surface any `Conflict`; hardware and watchdog ingress retry
//! when they lose a race on the port.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::application::events::{
    EventBroadcaster, EventSubscription, ResumeCursor, SharedBroadcaster, SubscriptionFilter,
};
use crate::application::ledger::{SessionLedger, SharedSessionLedger};
use crate::application::outbox::Outbox;
use crate::application::registry::{
    CasRequest, CommitStep, Committed, PortRegistry, SharedPortRegistry,
};
use crate::config::{AllocationConfig, BroadcasterConfig};
use crate::domain::transition::{self, PortTrigger, SessionEffect, TransitionRule};
use crate::domain::{
    Actor, ActorRole, ConflictReason, DomainError, DomainResult, Port, PortEvent, PortState,
    RepositoryProvider, Session, SessionOutcome, SessionState, Station, TriggerKind,
};

/// Outcome of `stop_session`. `event` is `None` when the call changed nothing.
#[derive(Debug, Clone, Serialize)]
pub struct StopAck {
    pub session: Session,
    pub event: Option<PortEvent>,
}

pub struct AllocationEngine {
    pub(super) registry: SharedPortRegistry,
    pub(super) ledger: SharedSessionLedger,
    broadcaster: SharedBroadcaster,
    pub(super) config: AllocationConfig,
    /// Durable store behind the ledger; terminal sessions evicted from
    /// memory are read back from here.
    archive: Option<Arc<dyn RepositoryProvider>>,
}

pub type SharedAllocationEngine = Arc<AllocationEngine>;

fn forbidden(actor: &Actor, what: impl std::fmt::Display) -> DomainError {
    DomainError::Forbidden(format!("{} may not {}", actor, what))
}

impl AllocationEngine {
    pub fn new(
        registry: SharedPortRegistry,
        ledger: SharedSessionLedger,
        broadcaster: SharedBroadcaster,
        config: AllocationConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            broadcaster,
            config,
            archive: None,
        }
    }

    /// Reads sessions missing from the ledger through `repos`.
    pub fn with_archive(mut self, repos: Arc<dyn RepositoryProvider>) -> Self {
        self.archive = Some(repos);
        self
    }

    /// Wires a fresh registry, ledger and broadcaster around `outbox`.
    pub fn assemble(
        allocation: AllocationConfig,
        broadcaster: BroadcasterConfig,
        outbox: Outbox,
    ) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new(broadcaster));
        let registry = Arc::new(PortRegistry::new(broadcaster.clone(), outbox));
        Self::new(registry, Arc::new(SessionLedger::new()), broadcaster, allocation)
    }

    /// Engine without persistence
    pub fn in_memory(allocation: AllocationConfig, broadcaster: BroadcasterConfig) -> Self {
        Self::assemble(allocation, broadcaster, Outbox::disabled())
    }

    pub fn registry(&self) -> &SharedPortRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &SharedSessionLedger {
        &self.ledger
    }

    pub fn broadcaster(&self) -> &SharedBroadcaster {
        &self.broadcaster
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    // ── Core transition path ───────────────────────────────────

    /// Applies one trigger to a port. Every state change goes through here.
    pub fn apply(
        &self,
        port_id: &str,
        trigger: PortTrigger,
        actor: &Actor,
    ) -> DomainResult<Committed> {
        self.apply_inner(port_id, &trigger, actor, None)
    }

    /// Like [`apply`](Self::apply) but only if the port is still at
    /// `sequence`. Retries while the port is busy.
    pub async fn apply_if_unchanged(
        &self,
        port_id: &str,
        trigger: PortTrigger,
        actor: &Actor,
        sequence: u64,
    ) -> DomainResult<Committed> {
        for _ in 0..=self.config.cas_retry_limit {
            match self.apply_inner(port_id, &trigger, actor, Some(sequence)) {
                Err(e) if e.is_port_busy() => tokio::task::yield_now().await,
                other => return other,
            }
        }
        Err(DomainError::Conflict(ConflictReason::PortBusy))
    }

    pub(super) fn apply_inner(
        &self,
        port_id: &str,
        trigger: &PortTrigger,
        actor: &Actor,
        pinned_sequence: Option<u64>,
    ) -> DomainResult<Committed> {
        let kind = trigger.kind();
        if !transition::permits(kind, actor.role) {
            return Err(forbidden(actor, kind));
        }

        let port = self.registry.get(port_id)?;
        let Some(rule) = transition::resolve(port.state, kind) else {
            let err = DomainError::Conflict(ConflictReason::IllegalTransition {
                from: port.state,
                trigger: kind.to_string(),
            });
            self.log_rejection(port_id, kind, &err);
            return Err(err);
        };
        let station = match rule.effect {
            SessionEffect::Open => Some(self.registry.station(&port.station_id)?),
            _ => None,
        };

        let now = Utc::now();
        let result = self.registry.compare_and_set(
            port_id,
            CasRequest {
                expected: port.state,
                new: rule.to,
                trigger: kind,
                actor,
                expected_sequence: pinned_sequence,
                at: now,
            },
            |current| self.commit_effect(current, rule, trigger, actor, station.as_ref(), now),
        );

        match &result {
            Ok(committed) => self.log_commit(committed),
            Err(err) => self.log_rejection(port_id, kind, err),
        }
        result
    }

    /// Ledger side of a transition; runs while the port is held.
    fn commit_effect(
        &self,
        port: &Port,
        rule: &TransitionRule,
        trigger: &PortTrigger,
        actor: &Actor,
        station: Option<&Station>,
        now: DateTime<Utc>,
    ) -> DomainResult<CommitStep> {
        let keep_fault = port.fault_code.clone();

        match rule.effect {
            SessionEffect::Open => {
                let PortTrigger::StartRequested {
                    user_id,
                    vehicle_id,
                } = trigger
                else {
                    return Err(DomainError::Validation(
                        "session can only be opened by a start request".to_string(),
                    ));
                };
                let station =
                    station.ok_or_else(|| DomainError::not_found("Station", port.station_id.clone()))?;
                if !station.accepts_sessions() {
                    return Err(DomainError::Conflict(ConflictReason::StationClosed {
                        station_id: station.id.clone(),
                    }));
                }
                let session = self.ledger.open(&port.id, station, vehicle_id, user_id, now)?;
                Ok(CommitStep {
                    active_session_id: Some(session.id.clone()),
                    session: Some(session),
                    fault_code: keep_fault,
                })
            }
            SessionEffect::Activate => {
                let session_id = bound_session(port, trigger)?;
                let session = self.ledger.activate(session_id, now)?;
                Ok(CommitStep {
                    active_session_id: Some(session.id.clone()),
                    session: Some(session),
                    fault_code: keep_fault,
                })
            }
            SessionEffect::BeginCompleting => {
                let session_id = bound_session(port, trigger)?;
                let session = self.ledger.begin_completing(session_id, now)?;
                Ok(CommitStep {
                    active_session_id: Some(session.id.clone()),
                    session: Some(session),
                    fault_code: keep_fault,
                })
            }
            SessionEffect::Close => {
                let session_id = bound_session(port, trigger)?;
                let energy = match trigger {
                    PortTrigger::HardwareFinalReport { energy_kwh, .. } => *energy_kwh,
                    _ => None,
                };
                let reason = if actor.role == ActorRole::System {
                    "completion forced after grace period"
                } else {
                    "final report"
                };
                let session =
                    self.ledger
                        .close(session_id, SessionOutcome::Closed, reason, energy, now)?;
                Ok(CommitStep {
                    active_session_id: None,
                    session: Some(session),
                    fault_code: keep_fault,
                })
            }
            SessionEffect::Abort => {
                let session_id = bound_session(port, trigger)?;
                let reason = match rule.trigger {
                    TriggerKind::Timeout => "reservation timed out",
                    TriggerKind::StopRequested => "stopped before charging began",
                    other => other.as_str(),
                };
                let session =
                    self.ledger
                        .close(session_id, SessionOutcome::Aborted, reason, None, now)?;
                Ok(CommitStep {
                    active_session_id: None,
                    session: Some(session),
                    fault_code: keep_fault,
                })
            }
            SessionEffect::AbortIfOpen => {
                let code = match trigger {
                    PortTrigger::FaultReport { code } => code.clone(),
                    _ => "Unspecified".to_string(),
                };
                // a port restored without its session record still faults
                let session = match &port.active_session_id {
                    Some(session_id) => match self.ledger.close(
                        session_id,
                        SessionOutcome::Aborted,
                        &format!("port fault: {}", code),
                        None,
                        now,
                    ) {
                        Ok(session) => Some(session),
                        Err(DomainError::NotFound { .. }) => None,
                        Err(e) => return Err(e),
                    },
                    None => None,
                };
                Ok(CommitStep {
                    active_session_id: None,
                    session,
                    fault_code: Some(code),
                })
            }
            SessionEffect::None => Ok(CommitStep {
                active_session_id: port.active_session_id.clone(),
                session: None,
                fault_code: if rule.trigger == TriggerKind::ManualReset {
                    None
                } else {
                    keep_fault
                },
            }),
        }
    }

    fn log_commit(&self, committed: &Committed) {
        let e = &committed.event;
        info!(
            port_id = %e.port_id,
            session_id = ?e.session_id,
            from = %e.old_state,
            to = %e.new_state,
            sequence = e.sequence,
            trigger = %e.trigger,
            actor = %e.actor,
            "Port transition"
        );
        metrics::counter!(
            "port_transitions_total",
            "trigger" => e.trigger.as_str(),
            "to" => e.new_state.as_str()
        )
        .increment(1);
    }

    fn log_rejection(&self, port_id: &str, trigger: TriggerKind, err: &DomainError) {
        match err {
            DomainError::Conflict(reason) => {
                metrics::counter!("allocation_conflicts_total", "reason" => reason.label())
                    .increment(1);
                debug!(port_id, %trigger, %reason, "Transition rejected");
            }
            other => debug!(port_id, %trigger, error = %other, "Transition failed"),
        }
    }

    // ── Client operations ──────────────────────────────────────

    /// Reserves `port_id` for a new session.
    pub async fn start_session(
        &self,
        actor: &Actor,
        port_id: &str,
        user_id: &str,
        vehicle_id: &str,
    ) -> DomainResult<Session> {
        if user_id.trim().is_empty() || vehicle_id.trim().is_empty() {
            return Err(DomainError::Validation(
                "user_id and vehicle_id are required".to_string(),
            ));
        }
        if actor.role == ActorRole::User && actor.id != user_id {
            return Err(forbidden(actor, "start a session for another user"));
        }

        let committed = self.apply(
            port_id,
            PortTrigger::StartRequested {
                user_id: user_id.to_string(),
                vehicle_id: vehicle_id.to_string(),
            },
            actor,
        )?;
        committed
            .session
            .ok_or_else(|| DomainError::not_found("Session", port_id))
    }

    /// Stops a session. Stopping a session that is already stopping or
    /// finished returns it unchanged without emitting an event.
    pub async fn stop_session(&self, actor: &Actor, session_id: &str) -> DomainResult<StopAck> {
        if !transition::permits(TriggerKind::StopRequested, actor.role) {
            return Err(forbidden(actor, TriggerKind::StopRequested));
        }

        for _ in 0..=self.config.cas_retry_limit {
            let session = self.find_session(session_id).await?;
            if actor.role == ActorRole::User && session.user_id != actor.id {
                return Err(forbidden(actor, "stop another user's session"));
            }
            if session.is_terminal() || session.state == SessionState::Completing {
                return Ok(StopAck {
                    session,
                    event: None,
                });
            }

            let trigger = PortTrigger::StopRequested {
                session_id: session_id.to_string(),
            };
            match self.apply(&session.port_id, trigger, actor) {
                Ok(committed) => {
                    return Ok(StopAck {
                        session: committed.session.unwrap_or(session),
                        event: Some(committed.event),
                    })
                }
                Err(e) if e.is_contention() => tokio::task::yield_now().await,
                Err(e @ DomainError::Conflict(ConflictReason::IllegalTransition { .. })) => {
                    let latest = self.find_session(session_id).await?;
                    if latest.is_terminal() || latest.state == SessionState::Completing {
                        return Ok(StopAck {
                            session: latest,
                            event: None,
                        });
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(DomainError::Conflict(ConflictReason::PortBusy))
    }

    /// Faulted -> Available (admin)
    pub async fn reset_port(&self, actor: &Actor, port_id: &str) -> DomainResult<Committed> {
        self.apply(port_id, PortTrigger::ManualReset, actor)
    }

    /// Takes a port out of service or brings it back (admin). Returns `None`
    /// when the port is already in the requested state.
    pub async fn set_port_availability(
        &self,
        actor: &Actor,
        port_id: &str,
        available: bool,
    ) -> DomainResult<Option<Committed>> {
        if !actor.is_admin() {
            return Err(forbidden(actor, "change port availability"));
        }
        let port = self.registry.get(port_id)?;
        let (target, trigger) = if available {
            (PortState::Available, PortTrigger::BringOnline)
        } else {
            (PortState::Offline, PortTrigger::TakeOffline)
        };
        if port.state == target {
            return Ok(None);
        }
        self.apply(port_id, trigger, actor).map(Some)
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn get_port_state(&self, port_id: &str) -> DomainResult<Port> {
        self.registry.get(port_id)
    }

    /// Ledger first, then the archive for sessions already evicted.
    pub async fn find_session(&self, session_id: &str) -> DomainResult<Session> {
        match self.ledger.get(session_id) {
            Err(DomainError::NotFound { .. }) => {}
            found => return found,
        }
        let Some(archive) = &self.archive else {
            return Err(DomainError::not_found("Session", session_id));
        };
        match archive.sessions().find_by_id(session_id).await? {
            Some(session) => Ok(session),
            // evicted between the two lookups
            None => self.ledger.get(session_id),
        }
    }

    pub async fn get_session(&self, actor: &Actor, session_id: &str) -> DomainResult<Session> {
        let session = self.find_session(session_id).await?;
        if actor.role == ActorRole::User && session.user_id != actor.id {
            return Err(forbidden(actor, "read another user's session"));
        }
        Ok(session)
    }

    /// Sessions of a user, newest first. Live ledger records win over
    /// archived copies of the same session.
    pub async fn sessions_for_user(
        &self,
        actor: &Actor,
        user_id: &str,
    ) -> DomainResult<Vec<Session>> {
        if actor.role == ActorRole::User && actor.id != user_id {
            return Err(forbidden(actor, "list another user's sessions"));
        }
        let mut sessions = self.ledger.sessions_for_user(user_id);
        if let Some(archive) = &self.archive {
            let live: HashSet<String> = sessions.iter().map(|s| s.id.clone()).collect();
            sessions.extend(
                archive
                    .sessions()
                    .find_for_user(user_id)
                    .await?
                    .into_iter()
                    .filter(|s| !live.contains(&s.id)),
            );
            sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        }
        Ok(sessions)
    }

    pub fn subscribe(
        &self,
        filter: SubscriptionFilter,
        cursor: ResumeCursor,
    ) -> DomainResult<EventSubscription> {
        self.broadcaster.subscribe(filter, cursor)
    }

    // ── Station catalogue (admin) ──────────────────────────────

    fn require_admin(&self, actor: &Actor, what: &str) -> DomainResult<()> {
        if actor.is_admin() {
            Ok(())
        } else {
            Err(forbidden(actor, what))
        }
    }

    pub async fn create_station(&self, actor: &Actor, station: Station) -> DomainResult<Station> {
        self.require_admin(actor, "create stations")?;
        self.registry.add_station(station)
    }

    pub async fn update_station(&self, actor: &Actor, station: Station) -> DomainResult<Station> {
        self.require_admin(actor, "update stations")?;
        self.registry.update_station(station)
    }

    pub async fn remove_station(&self, actor: &Actor, station_id: &str) -> DomainResult<Station> {
        self.require_admin(actor, "remove stations")?;
        let open = self.ledger.open_count_for_station(station_id);
        if open > 0 {
            return Err(DomainError::Conflict(ConflictReason::InUse(format!(
                "station {} has {} open sessions",
                station_id, open
            ))));
        }
        self.registry.remove_station(station_id)
    }

    pub async fn add_port(&self, actor: &Actor, port: Port) -> DomainResult<Port> {
        self.require_admin(actor, "add ports")?;
        self.registry.add_port(port)
    }

    pub async fn remove_port(&self, actor: &Actor, port_id: &str) -> DomainResult<Port> {
        self.require_admin(actor, "remove ports")?;
        self.registry.remove_port(port_id)
    }

    pub fn get_station(&self, station_id: &str) -> DomainResult<Station> {
        self.registry.station(station_id)
    }

    pub fn list_stations(&self) -> Vec<Station> {
        self.registry.stations()
    }

    pub fn ports_of_station(&self, station_id: &str) -> DomainResult<Vec<Port>> {
        self.registry.station(station_id)?;
        Ok(self.registry.ports_of_station(station_id))
    }
}

/// Session the port holds, checked against the one the trigger names.
fn bound_session<'a>(port: &'a Port, trigger: &PortTrigger) -> DomainResult<&'a str> {
    let active = port.active_session_id.as_deref().ok_or_else(|| {
        DomainError::Conflict(ConflictReason::SessionState {
            session_id: trigger.session_id().unwrap_or("-").to_string(),
            state: format!("no session bound to port {}", port.id),
        })
    })?;
    match trigger.session_id() {
        Some(claimed) if claimed != active => Err(match trigger.kind() {
            TriggerKind::StopRequested => DomainError::Conflict(ConflictReason::SessionState {
                session_id: claimed.to_string(),
                state: format!("not bound to port {}", port.id),
            }),
            _ => DomainError::HardwareAnomaly(format!(
                "port {} holds session {} but the report names {}",
                port.id, active, claimed
            )),
        }),
        _ => Ok(active),
    }
}
