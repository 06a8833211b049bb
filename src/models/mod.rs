//! Data models module
//!
//! This module contains all data structures used throughout the engine

pub mod event;
pub mod registration;
pub mod user;

// Re-export commonly used models
pub use event::{Event, EventStatus, CreateEventRequest};
pub use registration::{Registration, RegistrationStatus, NewRegistration, Placement};
pub use user::{User, UserRole, CreateUserRequest};
