//! Background and startup services around the allocation engine

mod recovery;
mod watchdog;

pub use recovery::{restore_state, RecoveryReport, RECOVERY_ACTOR_ID, RECOVERY_FAULT_CODE};
pub use watchdog::{ReconciliationWatchdog, SweepReport, WATCHDOG_ACTOR_ID};
