//! Port DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::application::engine::{HardwareAck, HardwareReport, HardwareStatusKind};
use crate::application::registry::Committed;
use crate::domain::{ConnectorType, DomainError, DomainResult, Port, PortEvent};
use crate::interfaces::http::modules::sessions::SessionDto;

/// Port snapshot
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PortDto {
    pub id: String,
    pub station_id: String,
    /// Type1, Type2, CCS, CHAdeMO, TeslaNacs
    pub connector_type: String,
    pub max_power_kw: f64,
    /// Available, Reserved, Charging, Completing, Faulted, Offline
    pub state: String,
    pub last_transition_at: DateTime<Utc>,
    pub active_session_id: Option<String>,
    /// Sequence of the last event emitted for the port
    pub sequence: u64,
    pub fault_code: Option<String>,
}

impl From<Port> for PortDto {
    fn from(p: Port) -> Self {
        Self {
            id: p.id,
            station_id: p.station_id,
            connector_type: p.connector_type.as_str().to_string(),
            max_power_kw: p.max_power_kw,
            state: p.state.as_str().to_string(),
            last_transition_at: p.last_transition_at,
            active_session_id: p.active_session_id,
            sequence: p.sequence,
            fault_code: p.fault_code,
        }
    }
}

/// Port transition as delivered to subscribers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PortEventDto {
    pub sequence: u64,
    pub port_id: String,
    pub station_id: String,
    pub session_id: Option<String>,
    pub session_state: Option<String>,
    pub old_state: String,
    pub new_state: String,
    pub trigger: String,
    pub actor_id: String,
    pub actor_role: String,
    pub timestamp: DateTime<Utc>,
}

impl From<PortEvent> for PortEventDto {
    fn from(e: PortEvent) -> Self {
        Self {
            sequence: e.sequence,
            port_id: e.port_id,
            station_id: e.station_id,
            session_id: e.session_id,
            session_state: e.session_state.map(|s| s.as_str().to_string()),
            old_state: e.old_state.as_str().to_string(),
            new_state: e.new_state.as_str().to_string(),
            trigger: e.trigger.as_str().to_string(),
            actor_id: e.actor.id,
            actor_role: e.actor.role.as_str().to_string(),
            timestamp: e.timestamp,
        }
    }
}

/// Result of a committed port transition
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransitionDto {
    pub port: PortDto,
    pub event: PortEventDto,
    pub session: Option<SessionDto>,
}

impl From<Committed> for TransitionDto {
    fn from(c: Committed) -> Self {
        Self {
            port: c.port.into(),
            event: c.event.into(),
            session: c.session.map(Into::into),
        }
    }
}

/// Add a port to a station
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddPortRequest {
    #[validate(length(min = 1, max = 64, message = "Port id must be 1-64 characters"))]
    pub id: String,
    /// Type1, Type2, CCS, CHAdeMO, TeslaNacs
    pub connector_type: String,
    #[validate(range(min = 0.1, max = 1000.0, message = "Power must be between 0.1 and 1000 kW"))]
    pub max_power_kw: f64,
}

impl AddPortRequest {
    pub fn into_domain(self, station_id: &str) -> DomainResult<Port> {
        let connector = parse_connector(&self.connector_type)?;
        Ok(Port::new(self.id, station_id, connector, self.max_power_kw))
    }
}

pub fn parse_connector(raw: &str) -> DomainResult<ConnectorType> {
    ConnectorType::parse(raw)
        .ok_or_else(|| DomainError::Validation(format!("Unknown connector type '{}'", raw)))
}

/// Status callback from station hardware
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct HardwareStatusRequest {
    /// Ack, StopReport, FinalReport, Fault, MeterUpdate
    pub kind: String,
    pub session_id: Option<String>,
    #[validate(range(min = 0.0, message = "Energy cannot be negative"))]
    pub energy_kwh: Option<f64>,
    #[validate(range(min = 0.0, message = "Power cannot be negative"))]
    pub power_kw: Option<f64>,
    #[validate(length(min = 1, max = 64))]
    pub fault_code: Option<String>,
}

impl HardwareStatusRequest {
    pub fn into_report(self) -> DomainResult<HardwareReport> {
        let kind = HardwareStatusKind::parse(&self.kind)
            .ok_or_else(|| DomainError::Validation(format!("Unknown status kind '{}'", self.kind)))?;
        if matches!(kind, HardwareStatusKind::Fault) && self.fault_code.is_none() {
            return Err(DomainError::Validation("Fault reports need a fault_code".into()));
        }
        let mut report = HardwareReport::new(kind);
        report.session_id = self.session_id;
        report.energy_kwh = self.energy_kwh;
        report.power_kw = self.power_kw;
        report.fault_code = self.fault_code;
        Ok(report)
    }
}

/// How a hardware report was handled
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HardwareAckDto {
    /// applied, recorded, ignored, fault_raised
    pub outcome: String,
    pub transition: Option<TransitionDto>,
    pub session: Option<SessionDto>,
    /// Why the report was ignored or turned into a fault
    pub reason: Option<String>,
}

impl From<HardwareAck> for HardwareAckDto {
    fn from(ack: HardwareAck) -> Self {
        let outcome = ack.label().to_string();
        match ack {
            HardwareAck::Applied(c) => Self {
                outcome,
                transition: Some(c.into()),
                session: None,
                reason: None,
            },
            HardwareAck::Recorded(s) => Self {
                outcome,
                transition: None,
                session: Some(s.into()),
                reason: None,
            },
            HardwareAck::Ignored { reason } => Self {
                outcome,
                transition: None,
                session: None,
                reason: Some(reason),
            },
            HardwareAck::FaultRaised { anomaly, committed } => Self {
                outcome,
                transition: Some(committed.into()),
                session: None,
                reason: Some(anomaly),
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AvailabilityRequest {
    /// `false` takes the port offline, `true` brings it back
    pub available: bool,
}
