//! WebSocket interfaces
//!
//! - `notifications`: live port event stream with resume support

pub mod notifications;

pub use notifications::{ws_events_handler, EventStreamQuery};
