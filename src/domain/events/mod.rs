//! Domain events
//!
//! Event types that represent facts about what happened to a port.
//! The broadcaster lives in `application::events`.

pub mod repository;
pub mod types;

pub use repository::PortEventRepository;
pub use types::{PortEvent, TriggerKind};
