//! Property tests for the allocation engine
//!
//! Random sequences of client, station and operator actions must never:
//! - leave two open sessions on one port or one vehicle
//! - let a port and the ledger disagree about which session holds it
//! - skip or repeat an event sequence number
//!
//! The same holds when the sequences run on several threads at once.

use std::collections::HashMap;
use std::sync::Arc;

use charge_coordinator::application::{
    AllocationEngine, HardwareReport, ResumeCursor, SubscriptionFilter,
};
use charge_coordinator::config::{AllocationConfig, BroadcasterConfig};
use charge_coordinator::domain::{
    Actor, ConnectorType, Port, PortEvent, PortState, Station, StationConfig,
};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

const PORTS: [&str; 3] = ["P1", "P2", "P3"];
const VEHICLES: [&str; 4] = ["V1", "V2", "V3", "V4"];

#[derive(Debug, Clone)]
enum Op {
    Start { port: usize, vehicle: usize },
    Ack { session: usize },
    Stop { session: usize },
    StopReport { session: usize },
    Final { session: usize, energy: f64 },
    Meter { session: usize, energy: f64 },
    Fault { port: usize },
    Reset { port: usize },
    Offline { port: usize },
    Online { port: usize },
}

// ============================================================================
// Strategies
// ============================================================================

fn op() -> impl Strategy<Value = Op> {
    let port = 0..PORTS.len();
    let session = 0usize..16;
    prop_oneof![
        3 => (port.clone(), 0..VEHICLES.len()).prop_map(|(port, vehicle)| Op::Start { port, vehicle }),
        3 => session.clone().prop_map(|session| Op::Ack { session }),
        2 => session.clone().prop_map(|session| Op::Stop { session }),
        1 => session.clone().prop_map(|session| Op::StopReport { session }),
        2 => (session.clone(), 0.0f64..80.0).prop_map(|(session, energy)| Op::Final { session, energy }),
        1 => (session, 0.0f64..80.0).prop_map(|(session, energy)| Op::Meter { session, energy }),
        1 => port.clone().prop_map(|port| Op::Fault { port }),
        1 => port.clone().prop_map(|port| Op::Reset { port }),
        1 => port.clone().prop_map(|port| Op::Offline { port }),
        1 => port.prop_map(|port| Op::Online { port }),
    ]
}

fn engine() -> AllocationEngine {
    let engine = AllocationEngine::in_memory(
        AllocationConfig::default(),
        BroadcasterConfig {
            replay_buffer_size: 1024,
            replay_window_secs: 3600,
            subscriber_queue_capacity: 4096,
        },
    );
    engine
        .registry()
        .add_station(Station::new(
            "ST1",
            "Depot",
            41.31,
            69.24,
            StationConfig {
                max_concurrent_sessions: 8,
                supported_connectors: vec![ConnectorType::Ccs],
            },
        ))
        .unwrap();
    for id in PORTS {
        engine
            .registry()
            .add_port(Port::new(id, "ST1", ConnectorType::Ccs, 150.0))
            .unwrap();
    }
    engine
}

/// Applies `ops` in order; individual failures are expected and ignored.
async fn run(engine: &AllocationEngine, ops: &[Op]) {
    let user = Actor::user("U1");
    let station = Actor::station("ST1");
    let admin = Actor::admin("ops");
    let mut sessions: Vec<String> = Vec::new();
    let pick = |sessions: &[String], i: usize| sessions.get(i % sessions.len().max(1)).cloned();

    for op in ops {
        match op {
            Op::Start { port, vehicle } => {
                if let Ok(session) = engine
                    .start_session(&user, PORTS[*port], "U1", VEHICLES[*vehicle])
                    .await
                {
                    sessions.push(session.id);
                }
            }
            Op::Ack { session } => {
                if let Some(id) = pick(&sessions, *session) {
                    let port = engine.ledger().get(&id).unwrap().port_id;
                    let _ = engine
                        .report_hardware_status(&station, &port, HardwareReport::ack(&id))
                        .await;
                }
            }
            Op::Stop { session } => {
                if let Some(id) = pick(&sessions, *session) {
                    let _ = engine.stop_session(&user, &id).await;
                }
            }
            Op::StopReport { session } => {
                if let Some(id) = pick(&sessions, *session) {
                    let port = engine.ledger().get(&id).unwrap().port_id;
                    let _ = engine
                        .report_hardware_status(&station, &port, HardwareReport::stop(&id))
                        .await;
                }
            }
            Op::Final { session, energy } => {
                if let Some(id) = pick(&sessions, *session) {
                    let port = engine.ledger().get(&id).unwrap().port_id;
                    let _ = engine
                        .report_hardware_status(
                            &station,
                            &port,
                            HardwareReport::final_report(&id, *energy),
                        )
                        .await;
                }
            }
            Op::Meter { session, energy } => {
                if let Some(id) = pick(&sessions, *session) {
                    let port = engine.ledger().get(&id).unwrap().port_id;
                    let _ = engine
                        .report_hardware_status(
                            &station,
                            &port,
                            HardwareReport::meter(&id, *energy, 50.0),
                        )
                        .await;
                }
            }
            Op::Fault { port } => {
                let _ = engine
                    .report_hardware_status(&station, PORTS[*port], HardwareReport::fault("E42"))
                    .await;
            }
            Op::Reset { port } => {
                let _ = engine.reset_port(&admin, PORTS[*port]).await;
            }
            Op::Offline { port } => {
                let _ = engine.set_port_availability(&admin, PORTS[*port], false).await;
            }
            Op::Online { port } => {
                let _ = engine.set_port_availability(&admin, PORTS[*port], true).await;
            }
        }
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// Runs each op list as its own task on a multi-threaded runtime.
fn run_concurrently(engine: &Arc<AllocationEngine>, workers: Vec<Vec<Op>>) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let handles: Vec<_> = workers
            .into_iter()
            .map(|ops| {
                let engine = engine.clone();
                tokio::spawn(async move { run(&engine, &ops).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
    });
}

fn check_ports_match_ledger(engine: &AllocationEngine) -> Result<(), TestCaseError> {
    let open = engine.ledger().active_sessions();
    for port_id in PORTS {
        let port = engine.get_port_state(port_id).unwrap();
        let on_port: Vec<_> = open.iter().filter(|s| s.port_id == port_id).collect();
        prop_assert!(on_port.len() <= 1, "{} has {} open sessions", port_id, on_port.len());

        match (&port.active_session_id, on_port.first()) {
            (Some(held), Some(session)) => prop_assert_eq!(held, &session.id),
            (None, None) => {}
            (held, session) => prop_assert!(
                false,
                "{} in {} holds {:?} but ledger has {:?}",
                port_id,
                port.state,
                held,
                session.map(|s| &s.id)
            ),
        }
        let holding = matches!(
            port.state,
            PortState::Reserved | PortState::Charging | PortState::Completing
        );
        prop_assert_eq!(port.active_session_id.is_some(), holding);
    }
    Ok(())
}

fn check_vehicles(engine: &AllocationEngine) -> Result<(), TestCaseError> {
    let mut per_vehicle: HashMap<String, usize> = HashMap::new();
    for session in engine.ledger().active_sessions() {
        *per_vehicle.entry(session.vehicle_id).or_default() += 1;
    }
    for (vehicle, count) in per_vehicle {
        prop_assert_eq!(count, 1, "vehicle {} has {} open sessions", vehicle, count);
    }
    Ok(())
}

fn check_event_chain(engine: &AllocationEngine, events: &[PortEvent]) -> Result<(), TestCaseError> {
    for port_id in PORTS {
        let chain: Vec<&PortEvent> = events.iter().filter(|e| e.port_id == port_id).collect();
        let sequences: Vec<u64> = chain.iter().map(|e| e.sequence).collect();
        let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
        prop_assert_eq!(&sequences, &expected);
        prop_assert_eq!(
            engine.get_port_state(port_id).unwrap().sequence,
            sequences.len() as u64
        );
        // Consecutive events of a port chain their states.
        for pair in chain.windows(2) {
            prop_assert_eq!(pair[0].new_state, pair[1].old_state);
        }
    }
    Ok(())
}

// ============================================================================
// Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// A port holds at most one open session and agrees with the ledger
    /// about which one.
    #[test]
    fn port_and_ledger_agree(ops in prop::collection::vec(op(), 1..60)) {
        let engine = engine();
        block_on(run(&engine, &ops));
        check_ports_match_ledger(&engine)?;
    }

    /// No vehicle is ever bound to two open sessions.
    #[test]
    fn vehicle_has_one_open_session(ops in prop::collection::vec(op(), 1..60)) {
        let engine = engine();
        block_on(run(&engine, &ops));
        check_vehicles(&engine)?;
    }

    /// Every port's events are numbered 1, 2, 3, ... and the last one
    /// matches the port's version.
    #[test]
    fn event_sequences_are_gap_free(ops in prop::collection::vec(op(), 1..60)) {
        let engine = engine();
        let mut sub = engine
            .subscribe(SubscriptionFilter::All, ResumeCursor::new())
            .unwrap();
        block_on(run(&engine, &ops));

        let events: Vec<PortEvent> = std::iter::from_fn(|| sub.try_recv().unwrap()).collect();
        check_event_chain(&engine, &events)?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Several clients, stations and operators acting at the same time
    /// leave the engine in a state that satisfies every invariant above.
    #[test]
    fn concurrent_actors_keep_invariants(
        workers in prop::collection::vec(prop::collection::vec(op(), 1..40), 2..5)
    ) {
        let engine = Arc::new(engine());
        let mut sub = engine
            .subscribe(SubscriptionFilter::All, ResumeCursor::new())
            .unwrap();
        run_concurrently(&engine, workers);

        check_ports_match_ledger(&engine)?;
        check_vehicles(&engine)?;
        let events: Vec<PortEvent> = std::iter::from_fn(|| sub.try_recv().unwrap()).collect();
        check_event_chain(&engine, &events)?;
    }
}
