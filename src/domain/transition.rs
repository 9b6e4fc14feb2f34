//! Port state machine
//!
//! A closed set of triggers and a single transition table. Every port
//! mutation, whether it comes from a client, the station hardware or the
//! watchdog, is looked up here first.

use super::actor::ActorRole;
use super::events::TriggerKind;
use super::port::PortState;

/// Trigger carrying its payload
#[derive(Debug, Clone, PartialEq)]
pub enum PortTrigger {
    StartRequested {
        user_id: String,
        vehicle_id: String,
    },
    /// Station confirms energy delivery began. `session_id` is optional
    /// because some firmware only reports the port.
    HardwareAck {
        session_id: Option<String>,
    },
    Timeout,
    StopRequested {
        session_id: String,
    },
    HardwareStopReport {
        session_id: Option<String>,
    },
    HardwareFinalReport {
        session_id: Option<String>,
        energy_kwh: Option<f64>,
    },
    FaultReport {
        code: String,
    },
    ManualReset,
    TakeOffline,
    BringOnline,
}

impl PortTrigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::StartRequested { .. } => TriggerKind::StartRequested,
            Self::HardwareAck { .. } => TriggerKind::HardwareAck,
            Self::Timeout => TriggerKind::Timeout,
            Self::StopRequested { .. } => TriggerKind::StopRequested,
            Self::HardwareStopReport { .. } => TriggerKind::HardwareStopReport,
            Self::HardwareFinalReport { .. } => TriggerKind::HardwareFinalReport,
            Self::FaultReport { .. } => TriggerKind::FaultReport,
            Self::ManualReset => TriggerKind::ManualReset,
            Self::TakeOffline => TriggerKind::TakeOffline,
            Self::BringOnline => TriggerKind::BringOnline,
        }
    }

    /// Session the trigger claims to refer to, if it names one
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::HardwareAck { session_id }
            | Self::HardwareStopReport { session_id }
            | Self::HardwareFinalReport { session_id, .. } => session_id.as_deref(),
            Self::StopRequested { session_id } => Some(session_id),
            _ => None,
        }
    }
}

/// What a transition does to the session bound to the port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    /// Open a new Pending session
    Open,
    /// Pending -> Active
    Activate,
    /// Active -> Completing
    BeginCompleting,
    /// Completing -> Closed
    Close,
    /// Pending -> Aborted; the port must hold a session
    Abort,
    /// Abort whatever session the port holds, if any
    AbortIfOpen,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    /// `None` matches any state
    pub from: Option<PortState>,
    pub trigger: TriggerKind,
    pub to: PortState,
    pub effect: SessionEffect,
}

const fn rule(
    from: Option<PortState>,
    trigger: TriggerKind,
    to: PortState,
    effect: SessionEffect,
) -> TransitionRule {
    TransitionRule {
        from,
        trigger,
        to,
        effect,
    }
}

use PortState as S;
use TriggerKind as T;

/// Rows are matched top to bottom; the first match wins.
pub const TRANSITIONS: &[TransitionRule] = &[
    rule(Some(S::Available), T::StartRequested, S::Reserved, SessionEffect::Open),
    rule(Some(S::Reserved), T::HardwareAck, S::Charging, SessionEffect::Activate),
    rule(Some(S::Reserved), T::Timeout, S::Available, SessionEffect::Abort),
    rule(Some(S::Reserved), T::StopRequested, S::Available, SessionEffect::Abort),
    rule(Some(S::Charging), T::StopRequested, S::Completing, SessionEffect::BeginCompleting),
    rule(Some(S::Charging), T::HardwareStopReport, S::Completing, SessionEffect::BeginCompleting),
    rule(Some(S::Completing), T::HardwareFinalReport, S::Available, SessionEffect::Close),
    rule(Some(S::Faulted), T::ManualReset, S::Available, SessionEffect::None),
    rule(Some(S::Available), T::TakeOffline, S::Offline, SessionEffect::None),
    rule(Some(S::Offline), T::BringOnline, S::Available, SessionEffect::None),
    rule(None, T::FaultReport, S::Faulted, SessionEffect::AbortIfOpen),
];

/// Looks up the rule for `trigger` in state `from`.
///
/// A fault report against a port that is already faulted has no rule: the
/// port is already where the report would put it.
pub fn resolve(from: PortState, trigger: TriggerKind) -> Option<&'static TransitionRule> {
    if trigger == T::FaultReport && from == S::Faulted {
        return None;
    }
    TRANSITIONS
        .iter()
        .find(|r| r.trigger == trigger && r.from.map_or(true, |f| f == from))
}

/// Role guard for a trigger kind
pub fn permits(trigger: TriggerKind, role: ActorRole) -> bool {
    use ActorRole::*;
    match trigger {
        T::StartRequested | T::StopRequested => matches!(role, User | Admin),
        T::HardwareAck | T::HardwareStopReport | T::HardwareFinalReport | T::FaultReport => {
            matches!(role, Station | System)
        }
        T::Timeout => role == System,
        T::ManualReset | T::TakeOffline | T::BringOnline => role == Admin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_rules() {
        let r = resolve(S::Available, T::StartRequested).unwrap();
        assert_eq!((r.to, r.effect), (S::Reserved, SessionEffect::Open));
        let r = resolve(S::Reserved, T::HardwareAck).unwrap();
        assert_eq!((r.to, r.effect), (S::Charging, SessionEffect::Activate));
        let r = resolve(S::Charging, T::StopRequested).unwrap();
        assert_eq!((r.to, r.effect), (S::Completing, SessionEffect::BeginCompleting));
        let r = resolve(S::Completing, T::HardwareFinalReport).unwrap();
        assert_eq!((r.to, r.effect), (S::Available, SessionEffect::Close));
    }

    #[test]
    fn stop_on_reserved_aborts_immediately() {
        let r = resolve(S::Reserved, T::StopRequested).unwrap();
        assert_eq!((r.to, r.effect), (S::Available, SessionEffect::Abort));
    }

    #[test]
    fn fault_overrides_every_state_but_faulted() {
        for from in PortState::ALL {
            let rule = resolve(from, T::FaultReport);
            if from == S::Faulted {
                assert!(rule.is_none());
            } else {
                assert_eq!(rule.unwrap().to, S::Faulted, "from {}", from);
            }
        }
    }

    #[test]
    fn start_is_refused_outside_available() {
        for from in [S::Reserved, S::Charging, S::Completing, S::Faulted, S::Offline] {
            assert!(resolve(from, T::StartRequested).is_none(), "from {}", from);
        }
    }

    #[test]
    fn stale_reports_have_no_rule() {
        assert!(resolve(S::Available, T::HardwareFinalReport).is_none());
        assert!(resolve(S::Charging, T::HardwareAck).is_none());
        assert!(resolve(S::Available, T::Timeout).is_none());
    }

    #[test]
    fn role_guards() {
        assert!(permits(T::StartRequested, ActorRole::User));
        assert!(!permits(T::StartRequested, ActorRole::Station));
        assert!(permits(T::HardwareAck, ActorRole::Station));
        assert!(!permits(T::HardwareAck, ActorRole::User));
        assert!(permits(T::Timeout, ActorRole::System));
        assert!(!permits(T::Timeout, ActorRole::Admin));
        assert!(permits(T::ManualReset, ActorRole::Admin));
        assert!(!permits(T::ManualReset, ActorRole::System));
    }

    #[test]
    fn trigger_kind_matches_payload() {
        let t = PortTrigger::StopRequested {
            session_id: "S1".into(),
        };
        assert_eq!(t.kind(), T::StopRequested);
        assert_eq!(t.session_id(), Some("S1"));
        assert_eq!(PortTrigger::Timeout.session_id(), None);
    }
}
