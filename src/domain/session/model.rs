//! Charging session domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Port reserved, waiting for the station to acknowledge
    Pending,
    /// Energy is flowing
    Active,
    /// Stop requested, waiting for the final report
    Completing,
    /// Completed normally
    Closed,
    /// Never completed normally (timeout, fault, early stop)
    Aborted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Active => "Active",
            Self::Completing => "Completing",
            Self::Closed => "Closed",
            Self::Aborted => "Aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(Self::Pending),
            "Active" => Some(Self::Active),
            "Completing" => Some(Self::Completing),
            "Closed" => Some(Self::Closed),
            "Aborted" => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal outcome requested when closing a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Closed,
    Aborted,
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            Self::Closed => SessionState::Closed,
            Self::Aborted => SessionState::Aborted,
        }
    }
}

/// Meter readings attached to a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub energy_kwh: f64,
    pub duration_secs: i64,
    pub last_power_kw: Option<f64>,
}

/// Charging session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub port_id: String,
    pub station_id: String,
    pub vehicle_id: String,
    pub user_id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    /// Set once the session reaches a terminal state
    pub ended_at: Option<DateTime<Utc>>,
    pub metrics: SessionMetrics,
    pub end_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        port_id: impl Into<String>,
        station_id: impl Into<String>,
        vehicle_id: impl Into<String>,
        user_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            port_id: port_id.into(),
            station_id: station_id.into(),
            vehicle_id: vehicle_id.into(),
            user_id: user_id.into(),
            state: SessionState::Pending,
            started_at: now,
            ended_at: None,
            metrics: SessionMetrics::default(),
            end_reason: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Pending -> Active. Returns `false` if the session was not pending.
    pub fn activate(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != SessionState::Pending {
            return false;
        }
        self.state = SessionState::Active;
        self.updated_at = now;
        true
    }

    /// Active -> Completing. Returns `false` if the session was not active.
    pub fn begin_completing(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        self.state = SessionState::Completing;
        self.updated_at = now;
        true
    }

    /// Moves the session into a terminal state. A terminal session is left
    /// untouched and `false` is returned.
    pub fn finish(
        &mut self,
        outcome: SessionOutcome,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = outcome.state();
        self.ended_at = Some(now);
        self.end_reason = Some(reason.into());
        self.metrics.duration_secs = (now - self.started_at).num_seconds().max(0);
        self.updated_at = now;
        true
    }

    /// Meter readings are monotonic in energy; a lower reading is kept out.
    pub fn record_metrics(
        &mut self,
        energy_kwh: Option<f64>,
        power_kw: Option<f64>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.is_terminal() {
            return false;
        }
        if let Some(energy) = energy_kwh {
            if energy >= self.metrics.energy_kwh {
                self.metrics.energy_kwh = energy;
            }
        }
        if power_kw.is_some() {
            self.metrics.last_power_kw = power_kw;
        }
        self.metrics.duration_secs = (now - self.started_at).num_seconds().max(0);
        self.updated_at = now;
        true
    }
}
