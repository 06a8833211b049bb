//! EventGate
//!
//! Registration, capacity, waitlist and check-in engine for event management.
//! This library keeps registrations consistent under concurrent admissions,
//! cancellations, check-ins and batch operations, on PostgreSQL or in memory.

pub mod config;
pub mod database;
pub mod engine;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{EventGateError, Result};

// Re-export main components for easy access
pub use database::{MemoryStore, PgStore, RegistrationStore, StoreTransaction};
pub use engine::{CheckInOutcome, CheckInPayload, RegistrationEngine};
pub use services::Actor;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
