pub mod health;
pub mod metrics;
pub mod ports;
pub mod request_id;
pub mod sessions;
pub mod stations;
