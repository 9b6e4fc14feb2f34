//! Non-durable storage for tests and embedded use

mod memory;

pub use memory::InMemoryRepositoryProvider;
