//! Hardware status ingress
//!
//! Station reports can be late, duplicated or out of order. They go through
//! the same transition path as client requests; a report that no longer
//! fits the port is acknowledged as ignored, and a report naming a session
//! the ledger does not bind to the port is an anomaly that faults the port.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::allocation::AllocationEngine;
use crate::application::registry::Committed;
use crate::domain::transition::PortTrigger;
use crate::domain::{
    Actor, ActorRole, ConflictReason, DomainError, DomainResult, Port, Session,
};

/// Kind of status a station reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareStatusKind {
    /// Energy delivery began
    Ack,
    /// Charging stopped at the station
    StopReport,
    /// Final meter reading after a stop
    FinalReport,
    Fault,
    /// Periodic meter reading; never changes port state
    MeterUpdate,
}

impl HardwareStatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "Ack",
            Self::StopReport => "StopReport",
            Self::FinalReport => "FinalReport",
            Self::Fault => "Fault",
            Self::MeterUpdate => "MeterUpdate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['_', '-'], "").as_str() {
            "ack" => Some(Self::Ack),
            "stopreport" | "stop" => Some(Self::StopReport),
            "finalreport" | "final" => Some(Self::FinalReport),
            "fault" => Some(Self::Fault),
            "meterupdate" | "meter" => Some(Self::MeterUpdate),
            _ => None,
        }
    }
}

impl std::fmt::Display for HardwareStatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HardwareReport {
    pub kind: HardwareStatusKind,
    pub session_id: Option<String>,
    pub energy_kwh: Option<f64>,
    pub power_kw: Option<f64>,
    pub fault_code: Option<String>,
}

impl HardwareReport {
    pub fn new(kind: HardwareStatusKind) -> Self {
        Self {
            kind,
            session_id: None,
            energy_kwh: None,
            power_kw: None,
            fault_code: None,
        }
    }

    pub fn ack(session_id: impl Into<String>) -> Self {
        Self::new(HardwareStatusKind::Ack).for_session(session_id)
    }

    pub fn stop(session_id: impl Into<String>) -> Self {
        Self::new(HardwareStatusKind::StopReport).for_session(session_id)
    }

    pub fn final_report(session_id: impl Into<String>, energy_kwh: f64) -> Self {
        let mut report = Self::new(HardwareStatusKind::FinalReport).for_session(session_id);
        report.energy_kwh = Some(energy_kwh);
        report
    }

    pub fn fault(code: impl Into<String>) -> Self {
        let mut report = Self::new(HardwareStatusKind::Fault);
        report.fault_code = Some(code.into());
        report
    }

    pub fn meter(session_id: impl Into<String>, energy_kwh: f64, power_kw: f64) -> Self {
        let mut report = Self::new(HardwareStatusKind::MeterUpdate).for_session(session_id);
        report.energy_kwh = Some(energy_kwh);
        report.power_kw = Some(power_kw);
        report
    }

    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    fn trigger(&self) -> Option<PortTrigger> {
        let session_id = self.session_id.clone();
        match self.kind {
            HardwareStatusKind::Ack => Some(PortTrigger::HardwareAck { session_id }),
            HardwareStatusKind::StopReport => Some(PortTrigger::HardwareStopReport { session_id }),
            HardwareStatusKind::FinalReport => Some(PortTrigger::HardwareFinalReport {
                session_id,
                energy_kwh: self.energy_kwh,
            }),
            HardwareStatusKind::Fault | HardwareStatusKind::MeterUpdate => None,
        }
    }
}

/// How a hardware report was handled
#[derive(Debug, Clone)]
pub enum HardwareAck {
    /// The report moved the port
    Applied(Committed),
    /// Meter reading stored on the session
    Recorded(Session),
    /// Stale or duplicate report; nothing changed
    Ignored { reason: String },
    /// The report contradicted the ledger and the port was faulted
    FaultRaised { anomaly: String, committed: Committed },
}

impl HardwareAck {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::Recorded(_) => "recorded",
            Self::Ignored { .. } => "ignored",
            Self::FaultRaised { .. } => "fault_raised",
        }
    }
}

enum Screen {
    Proceed,
    Ignore(String),
    Anomaly(String),
}

impl AllocationEngine {
    /// Entry point for station status reports.
    pub async fn report_hardware_status(
        &self,
        actor: &Actor,
        port_id: &str,
        report: HardwareReport,
    ) -> DomainResult<HardwareAck> {
        if !matches!(actor.role, ActorRole::Station | ActorRole::System) {
            return Err(DomainError::Forbidden(format!(
                "{} may not report hardware status",
                actor
            )));
        }

        match report.kind {
            HardwareStatusKind::MeterUpdate => self.record_meter(actor, port_id, &report).await,
            HardwareStatusKind::Fault => {
                let code = report
                    .fault_code
                    .clone()
                    .unwrap_or_else(|| "Unspecified".to_string());
                Ok(match self.fault_with_retry(port_id, code, actor).await? {
                    Some(committed) => HardwareAck::Applied(committed),
                    None => HardwareAck::Ignored {
                        reason: "port is already faulted".to_string(),
                    },
                })
            }
            _ => self.apply_report(actor, port_id, &report).await,
        }
    }

    async fn apply_report(
        &self,
        actor: &Actor,
        port_id: &str,
        report: &HardwareReport,
    ) -> DomainResult<HardwareAck> {
        let trigger = report.trigger().ok_or_else(|| {
            DomainError::Validation(format!("{} does not map to a transition", report.kind))
        })?;

        for _ in 0..=self.config.cas_retry_limit {
            let port = self.registry.get(port_id)?;
            match self.screen(&port, trigger.session_id()).await? {
                Screen::Proceed => {}
                Screen::Ignore(reason) => return Ok(HardwareAck::Ignored { reason }),
                Screen::Anomaly(detail) => return self.anomaly(actor, port_id, detail).await,
            }

            match self.apply_inner(port_id, &trigger, actor, None) {
                Ok(committed) => return Ok(HardwareAck::Applied(committed)),
                Err(e) if e.is_contention() => tokio::task::yield_now().await,
                Err(DomainError::Conflict(ConflictReason::IllegalTransition { from, trigger })) => {
                    return Ok(HardwareAck::Ignored {
                        reason: format!("{} does not apply to a {} port", trigger, from),
                    })
                }
                Err(DomainError::HardwareAnomaly(detail)) => {
                    return self.anomaly(actor, port_id, detail).await
                }
                Err(e) => return Err(e),
            }
        }
        Err(DomainError::Conflict(ConflictReason::PortBusy))
    }

    async fn record_meter(
        &self,
        actor: &Actor,
        port_id: &str,
        report: &HardwareReport,
    ) -> DomainResult<HardwareAck> {
        let port = self.registry.get(port_id)?;
        match self.screen(&port, report.session_id.as_deref()).await? {
            Screen::Proceed => {}
            Screen::Ignore(reason) => return Ok(HardwareAck::Ignored { reason }),
            Screen::Anomaly(detail) => return self.anomaly(actor, port_id, detail).await,
        }
        let Some(session_id) = port.active_session_id.as_deref() else {
            return Ok(HardwareAck::Ignored {
                reason: format!("port {} has no open session", port_id),
            });
        };
        Ok(
            match self
                .ledger
                .record_metrics(session_id, report.energy_kwh, report.power_kw, Utc::now())?
            {
                Some(session) => HardwareAck::Recorded(session),
                None => HardwareAck::Ignored {
                    reason: format!("session {} is already closed", session_id),
                },
            },
        )
    }

    /// Checks the session a report names against the ledger and, for
    /// sessions already evicted from it, the archive.
    async fn screen(&self, port: &Port, claimed: Option<&str>) -> DomainResult<Screen> {
        let Some(claimed) = claimed else {
            return Ok(Screen::Proceed);
        };
        if port.active_session_id.as_deref() == Some(claimed) {
            return Ok(Screen::Proceed);
        }
        let found = match self.find_session(claimed).await {
            Err(DomainError::NotFound { .. }) => None,
            other => Some(other?),
        };
        Ok(match found {
            Some(session) if session.port_id == port.id && session.is_terminal() => Screen::Ignore(
                format!("session {} is already {}", claimed, session.state),
            ),
            Some(session) if session.port_id != port.id => Screen::Anomaly(format!(
                "session {} belongs to port {}, reported on port {}",
                claimed, session.port_id, port.id
            )),
            Some(session) => Screen::Anomaly(format!(
                "session {} is {} but port {} does not hold it",
                claimed, session.state, port.id
            )),
            None => Screen::Anomaly(format!(
                "unknown session {} reported on port {}",
                claimed, port.id
            )),
        })
    }

    async fn anomaly(
        &self,
        actor: &Actor,
        port_id: &str,
        detail: String,
    ) -> DomainResult<HardwareAck> {
        warn!(port_id, anomaly = %detail, actor = %actor, "Hardware anomaly, faulting port");
        metrics::counter!("hardware_anomalies_total").increment(1);
        Ok(
            match self
                .fault_with_retry(port_id, "HardwareAnomaly".to_string(), actor)
                .await?
            {
                Some(committed) => HardwareAck::FaultRaised {
                    anomaly: detail,
                    committed,
                },
                None => HardwareAck::Ignored {
                    reason: format!("{} (port already faulted)", detail),
                },
            },
        )
    }

    /// Faults a port, retrying while it is busy. `None` if it already was.
    async fn fault_with_retry(
        &self,
        port_id: &str,
        code: String,
        actor: &Actor,
    ) -> DomainResult<Option<Committed>> {
        let trigger = PortTrigger::FaultReport { code };
        for _ in 0..=self.config.cas_retry_limit {
            match self.apply_inner(port_id, &trigger, actor, None) {
                Ok(committed) => return Ok(Some(committed)),
                Err(e) if e.is_contention() => tokio::task::yield_now().await,
                Err(DomainError::Conflict(ConflictReason::IllegalTransition { .. })) => {
                    return Ok(None)
                }
                Err(e) => return Err(e),
            }
        }
        Err(DomainError::Conflict(ConflictReason::PortBusy))
    }
}
