//! Database entities module

pub mod charging_session;
pub mod port;
pub mod port_event;
pub mod station;

pub use charging_session::Entity as ChargingSession;
pub use port::Entity as Port;
pub use port_event::Entity as PortEvent;
pub use station::Entity as Station;
