//! Application layer: in-memory coordination state and the use cases on top

pub mod engine;
pub mod events;
pub mod ledger;
pub mod outbox;
pub mod registry;
pub mod services;

pub use engine::{
    AllocationEngine, HardwareAck, HardwareReport, HardwareStatusKind, SharedAllocationEngine,
    StopAck,
};
pub use events::{
    EventBroadcaster, EventSubscription, ResumeCursor, SharedBroadcaster, SubscriptionFilter,
};
pub use ledger::{SessionLedger, SharedSessionLedger};
pub use outbox::{Outbox, OutboxRecord, OutboxWriter};
pub use registry::{PortRegistry, SharedPortRegistry};
pub use services::{restore_state, ReconciliationWatchdog, RecoveryReport, SweepReport};
