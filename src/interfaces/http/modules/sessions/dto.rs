//! Session DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::application::engine::StopAck;
use crate::domain::Session;
use crate::interfaces::http::modules::ports::PortEventDto;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionDto {
    pub id: String,
    pub port_id: String,
    pub station_id: String,
    pub vehicle_id: String,
    pub user_id: String,
    /// Pending, Active, Completing, Closed, Aborted
    pub state: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub energy_kwh: f64,
    pub duration_secs: i64,
    pub last_power_kw: Option<f64>,
    pub end_reason: Option<String>,
}

impl From<Session> for SessionDto {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            port_id: s.port_id,
            station_id: s.station_id,
            vehicle_id: s.vehicle_id,
            user_id: s.user_id,
            state: s.state.as_str().to_string(),
            started_at: s.started_at,
            ended_at: s.ended_at,
            energy_kwh: s.metrics.energy_kwh,
            duration_secs: s.metrics.duration_secs,
            last_power_kw: s.metrics.last_power_kw,
            end_reason: s.end_reason,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StartSessionRequest {
    #[validate(length(min = 1, max = 64))]
    pub port_id: String,
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    #[validate(length(min = 1, max = 64))]
    pub vehicle_id: String,
}

/// Outcome of a stop request. `event` is absent when the session was already
/// stopping or finished.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StopSessionResponse {
    pub session: SessionDto,
    pub event: Option<PortEventDto>,
}

impl From<StopAck> for StopSessionResponse {
    fn from(ack: StopAck) -> Self {
        Self {
            session: ack.session.into(),
            event: ack.event.map(Into::into),
        }
    }
}
