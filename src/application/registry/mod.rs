//! Port registry

pub mod port_registry;

pub use port_registry::{CasRequest, CommitStep, Committed, PortRegistry, SharedPortRegistry};
