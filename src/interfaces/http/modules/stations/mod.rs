//! Stations module: catalogue CRUD and port provisioning

pub mod dto;
pub mod handlers;

pub use dto::*;
pub use handlers::*;
