//! Port event fan-out
//!
//! Event types are defined in `domain::events`; the broadcaster that
//! delivers them lives here in the application layer.

pub mod broadcaster;

pub use crate::domain::events::{PortEvent, TriggerKind};

pub use broadcaster::{EventBroadcaster, EventSubscription, ResumeCursor, SubscriptionFilter};

use std::sync::Arc;

/// Shared broadcaster type
pub type SharedBroadcaster = Arc<EventBroadcaster>;
