//! # Charge Coordinator
//!
//! Charging session and port allocation core for EV charging fleets.
//!
//! ## Architecture
//!
//! The project follows Clean Architecture principles:
//!
//! - **domain**: Stations, ports, sessions, actors and the port state machine
//! - **application**: Port registry, session ledger, allocation engine,
//!   event broadcaster and the background services around them
//! - **infrastructure**: SeaORM storage and the in-memory repository provider
//! - **interfaces**: REST API with Swagger documentation and the WebSocket
//!   event stream
//! - **server**: Runtime wiring and graceful shutdown

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

pub use application::{AllocationEngine, SharedAllocationEngine};

// Re-export database types for easy access
pub use infrastructure::{
    init_database, DatabaseConfig, InMemoryRepositoryProvider, SeaOrmRepositoryProvider,
};

// Re-export API router
pub use interfaces::{create_api_router, RouterDeps};
