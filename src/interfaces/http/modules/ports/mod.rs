//! Ports module: snapshots, hardware ingress and operator actions

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
