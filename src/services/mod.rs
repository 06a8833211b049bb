//! Services module
//!
//! Collaborators the engine consumes: access policy, notifications and time

pub mod auth;
pub mod clock;
pub mod notification;

// Re-export commonly used services
pub use auth::{Actor, AccessPolicy, Permission};
pub use clock::{Clock, SystemClock, FixedClock};
pub use notification::{Notice, NotificationSink, TracingNotifier, RecordingNotifier};
