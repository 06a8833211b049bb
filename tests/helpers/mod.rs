//! Test helpers module
//!
//! Shared setup for the integration tests: an in-memory engine driven by a
//! fixed clock, seed data builders and the optional PostgreSQL database.

#![allow(dead_code)]

pub mod database_helper;
pub mod test_context;
pub mod test_data;

pub use database_helper::*;
pub use test_context::*;
pub use test_data::*;
