//! Interface layer: REST API and WebSocket event stream

pub mod http;
pub mod ws;

pub use http::{create_api_router, RouterDeps};
