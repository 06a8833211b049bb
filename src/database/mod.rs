//! Database module
//!
//! This module handles database connections, the store abstraction the
//! engine runs its transactions on, and its PostgreSQL and in-memory
//! implementations.

pub mod connection;
pub mod memory;
pub mod postgres;
pub mod repositories;
pub mod store;

// Re-export commonly used database components
pub use connection::{DatabasePool, DatabaseConfig, create_pool, run_migrations, health_check};
pub use memory::{MemoryStore, MemoryTransaction};
pub use postgres::{PgStore, PgTransaction};
pub use repositories::{UserRepository, EventRepository, RegistrationRepository};
pub use store::{RegistrationStore, StoreTransaction};
