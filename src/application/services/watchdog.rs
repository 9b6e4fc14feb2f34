//! Reconciliation watchdog
//!
//! Periodically looks for ports stuck in `Reserved` or `Completing` past
//! their grace period and pushes them on with an ordinary trigger issued by
//! the `System` actor: `Timeout` for a reservation nobody acknowledged, a
//! forced final report for a completion that never got one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::engine::SharedAllocationEngine;
use crate::config::WatchdogConfig;
use crate::domain::transition::PortTrigger;
use crate::domain::{Actor, ActorRole, DomainError, PortState};
use crate::shared::shutdown::ShutdownSignal;

pub const WATCHDOG_ACTOR_ID: &str = "reconciliation-watchdog";

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Ports in a transient state
    pub examined: usize,
    pub timed_out: usize,
    pub force_completed: usize,
    /// Overdue ports that moved on before the watchdog got to them
    pub skipped: usize,
}

pub struct ReconciliationWatchdog {
    engine: SharedAllocationEngine,
    config: WatchdogConfig,
    running: Arc<AtomicBool>,
}

impl ReconciliationWatchdog {
    pub fn new(engine: SharedAllocationEngine, config: WatchdogConfig) -> Self {
        Self {
            engine,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the sweep loop; it stops when `shutdown` fires.
    pub fn start(self: &Arc<Self>, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let watchdog = self.clone();
        tokio::spawn(async move {
            watchdog.running.store(true, Ordering::SeqCst);
            info!(
                check_interval = watchdog.config.check_interval_secs,
                reservation_grace = watchdog.engine.config().reservation_grace_secs,
                completion_grace = watchdog.engine.config().completion_grace_secs,
                "🐕 Reconciliation watchdog started"
            );

            let mut interval =
                tokio::time::interval(Duration::from_secs(watchdog.config.check_interval_secs));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = watchdog.sweep(Utc::now()).await;
                        if report.timed_out + report.force_completed > 0 {
                            info!(?report, "Watchdog sweep recovered ports");
                        }
                    }
                    _ = shutdown.wait() => {
                        info!("🐕 Reconciliation watchdog shutting down");
                        break;
                    }
                }
            }

            watchdog.running.store(false, Ordering::SeqCst);
            info!("🐕 Reconciliation watchdog stopped");
        })
    }

    /// Recovers every port whose transient state is older than its grace
    /// period at `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let actor = Actor::new(WATCHDOG_ACTOR_ID, ActorRole::System, now);
        let allocation = self.engine.config();
        let mut report = SweepReport::default();

        let stuck = self
            .engine
            .registry()
            .ports_in_states(&[PortState::Reserved, PortState::Completing]);
        report.examined = stuck.len();

        for port in stuck {
            let (grace, trigger, kind) = match port.state {
                PortState::Reserved => (
                    allocation.reservation_grace(),
                    PortTrigger::Timeout,
                    "reservation_timeout",
                ),
                _ => (
                    allocation.completion_grace(),
                    PortTrigger::HardwareFinalReport {
                        session_id: None,
                        energy_kwh: None,
                    },
                    "forced_completion",
                ),
            };
            if port.state_age(now) <= grace {
                continue;
            }

            match self
                .engine
                .apply_if_unchanged(&port.id, trigger, &actor, port.sequence)
                .await
            {
                Ok(committed) => {
                    if port.state == PortState::Reserved {
                        report.timed_out += 1;
                    } else {
                        report.force_completed += 1;
                    }
                    metrics::counter!("watchdog_recoveries_total", "kind" => kind).increment(1);
                    info!(
                        port_id = %port.id,
                        session_id = ?committed.event.session_id,
                        kind,
                        stuck_secs = port.state_age(now).num_seconds(),
                        "Watchdog recovered port"
                    );
                }
                Err(DomainError::Conflict(reason)) => {
                    report.skipped += 1;
                    debug!(port_id = %port.id, %reason, "Port moved on before recovery");
                }
                Err(DomainError::NotFound { .. }) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    report.skipped += 1;
                    warn!(port_id = %port.id, error = %e, "Watchdog recovery failed");
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::{AllocationEngine, HardwareReport};
    use crate::application::events::{ResumeCursor, SubscriptionFilter};
    use crate::config::{AllocationConfig, BroadcasterConfig};
    use crate::domain::{
        ConnectorType, Port, SessionState, Station, StationConfig, TriggerKind,
    };

    fn setup() -> (SharedAllocationEngine, Arc<ReconciliationWatchdog>) {
        let engine = Arc::new(AllocationEngine::in_memory(
            AllocationConfig::default(),
            BroadcasterConfig::default(),
        ));
        engine
            .registry()
            .add_station(Station::new("ST1", "Depot", 0.0, 0.0, StationConfig::default()))
            .unwrap();
        engine
            .registry()
            .add_port(Port::new("P1", "ST1", ConnectorType::Ccs, 50.0))
            .unwrap();
        let watchdog = Arc::new(ReconciliationWatchdog::new(
            engine.clone(),
            WatchdogConfig::default(),
        ));
        (engine, watchdog)
    }

    #[tokio::test]
    async fn unacknowledged_reservation_times_out_once() {
        let (engine, watchdog) = setup();
        let mut sub = engine
            .subscribe(SubscriptionFilter::Port("P1".into()), ResumeCursor::new())
            .unwrap();
        let session = engine
            .start_session(&Actor::user("U1"), "P1", "U1", "V1")
            .await
            .unwrap();

        let early = watchdog.sweep(Utc::now()).await;
        assert_eq!(early.examined, 1);
        assert_eq!(early.timed_out, 0);

        let later = Utc::now() + chrono::Duration::seconds(91);
        let report = watchdog.sweep(later).await;
        assert_eq!(report.timed_out, 1);
        assert_eq!(watchdog.sweep(later).await, SweepReport::default());

        assert_eq!(engine.get_port_state("P1").unwrap().state, PortState::Available);
        let session = engine.ledger().get(&session.id).unwrap();
        assert_eq!(session.state, SessionState::Aborted);

        let mut timeouts = 0;
        while let Ok(Some(event)) = sub.try_recv() {
            if event.trigger == TriggerKind::Timeout {
                timeouts += 1;
                assert_eq!(event.actor.role, ActorRole::System);
            }
        }
        assert_eq!(timeouts, 1);
    }

    #[tokio::test]
    async fn stuck_completion_is_forced_closed() {
        let (engine, watchdog) = setup();
        let station = Actor::station("ST1");
        let session = engine
            .start_session(&Actor::user("U1"), "P1", "U1", "V1")
            .await
            .unwrap();
        engine
            .report_hardware_status(&station, "P1", HardwareReport::ack(&session.id))
            .await
            .unwrap();
        engine
            .stop_session(&Actor::user("U1"), &session.id)
            .await
            .unwrap();

        let report = watchdog
            .sweep(Utc::now() + chrono::Duration::seconds(301))
            .await;
        assert_eq!(report.force_completed, 1);
        assert_eq!(
            engine.ledger().get(&session.id).unwrap().state,
            SessionState::Closed
        );
    }

    #[tokio::test]
    async fn acknowledged_port_is_left_alone() {
        let (engine, watchdog) = setup();
        let session = engine
            .start_session(&Actor::user("U1"), "P1", "U1", "V1")
            .await
            .unwrap();
        engine
            .report_hardware_status(&Actor::station("ST1"), "P1", HardwareReport::ack(&session.id))
            .await
            .unwrap();
        let report = watchdog
            .sweep(Utc::now() + chrono::Duration::hours(2))
            .await;
        assert_eq!(report.examined, 0);
        assert_eq!(engine.get_port_state("P1").unwrap().state, PortState::Charging);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_sweeps_recover_once() {
        let (engine, watchdog) = setup();
        engine
            .start_session(&Actor::user("U1"), "P1", "U1", "V1")
            .await
            .unwrap();
        let later = Utc::now() + chrono::Duration::seconds(120);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let watchdog = watchdog.clone();
                tokio::spawn(async move { watchdog.sweep(later).await })
            })
            .collect();
        let mut timed_out = 0;
        for handle in handles {
            timed_out += handle.await.unwrap().timed_out;
        }
        assert_eq!(timed_out, 1);
        assert_eq!(engine.get_port_state("P1").unwrap().sequence, 2);
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let (_engine, watchdog) = setup();
        let shutdown = ShutdownSignal::new();
        let handle = watchdog.start(shutdown.clone());
        tokio::task::yield_now().await;
        shutdown.trigger();
        handle.await.unwrap();
        assert!(!watchdog.is_running());
    }
}
