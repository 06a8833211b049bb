//! Error handling for EventGate
//!
//! This module defines the main error type used throughout the engine
//! and provides a unified error handling strategy.

use thiserror::Error;
use uuid::Uuid;
use crate::models::RegistrationStatus;

/// Main error type for EventGate
#[derive(Error, Debug)]
pub enum EventGateError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Event not found: {event_id}")]
    EventNotFound { event_id: Uuid },

    #[error("Registration not found: {registration_id}")]
    RegistrationNotFound { registration_id: Uuid },

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: Uuid },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: RegistrationStatus, to: RegistrationStatus },

    #[error("Attendee is already registered for this event")]
    AlreadyRegistered,

    #[error("Registration has already been used for attendance")]
    AlreadyAttended,

    #[error("Registration is already checked in")]
    AlreadyCheckedIn,

    #[error("Registration is already cancelled")]
    AlreadyCancelled,

    #[error("Event is not available for registration")]
    EventNotAvailable,

    #[error("Registration deadline has passed")]
    RegistrationClosed,

    #[error("Event has already started or passed")]
    EventExpired,

    #[error("Registrations cannot be cancelled less than {cutoff_hours} hours before the event")]
    CancellationNotAllowed { cutoff_hours: i64 },

    #[error("Event {event_id} is at capacity")]
    EventAtCapacity { event_id: Uuid },

    #[error("Check-in is not possible: {0}")]
    CheckInWindowClosed(String),

    #[error("Batch rejected, {id} failed: {reason}")]
    BatchPreconditionFailed { id: Uuid, reason: String },

    #[error("Check-in code {code} already exists for event {event_id}")]
    CheckInCodeConflict { event_id: Uuid, code: String },

    #[error("Could not generate a unique check-in code after {attempts} attempts")]
    CheckInCodeExhausted { attempts: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for EventGate operations
pub type Result<T> = std::result::Result<T, EventGateError>;

impl EventGateError {
    /// Domain rejections that a caller can act on; retrying never changes them
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EventGateError::Forbidden(_)
                | EventGateError::EventNotFound { .. }
                | EventGateError::RegistrationNotFound { .. }
                | EventGateError::UserNotFound { .. }
                | EventGateError::InvalidStateTransition { .. }
                | EventGateError::AlreadyRegistered
                | EventGateError::AlreadyAttended
                | EventGateError::AlreadyCheckedIn
                | EventGateError::AlreadyCancelled
                | EventGateError::EventNotAvailable
                | EventGateError::RegistrationClosed
                | EventGateError::EventExpired
                | EventGateError::CancellationNotAllowed { .. }
                | EventGateError::EventAtCapacity { .. }
                | EventGateError::CheckInWindowClosed(_)
                | EventGateError::InvalidInput(_)
        )
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            EventGateError::Database(_) => true,
            EventGateError::Io(_) => true,
            EventGateError::CheckInCodeConflict { .. } => true,
            EventGateError::CheckInCodeExhausted { .. } => true,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EventGateError::Database(_) => ErrorSeverity::Critical,
            EventGateError::Migration(_) => ErrorSeverity::Critical,
            EventGateError::Config(_) => ErrorSeverity::Critical,
            EventGateError::CheckInCodeExhausted { .. } => ErrorSeverity::Error,
            EventGateError::Serialization(_) | EventGateError::Io(_) => ErrorSeverity::Error,
            EventGateError::Forbidden(_) => ErrorSeverity::Warning,
            EventGateError::BatchPreconditionFailed { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Info,
        }
    }

    /// Short machine-readable code for the surrounding handlers
    pub fn code(&self) -> &'static str {
        match self {
            EventGateError::Database(_) | EventGateError::Migration(_) => "DATABASE_ERROR",
            EventGateError::Config(_) => "CONFIG_ERROR",
            EventGateError::Forbidden(_) => "FORBIDDEN",
            EventGateError::EventNotFound { .. }
            | EventGateError::RegistrationNotFound { .. }
            | EventGateError::UserNotFound { .. } => "NOT_FOUND",
            EventGateError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            EventGateError::AlreadyRegistered => "ALREADY_REGISTERED",
            EventGateError::AlreadyAttended => "ALREADY_ATTENDED",
            EventGateError::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            EventGateError::AlreadyCancelled => "ALREADY_CANCELLED",
            EventGateError::EventNotAvailable => "EVENT_NOT_AVAILABLE",
            EventGateError::RegistrationClosed => "REGISTRATION_CLOSED",
            EventGateError::EventExpired => "EVENT_EXPIRED",
            EventGateError::CancellationNotAllowed { .. } => "CANCELLATION_NOT_ALLOWED",
            EventGateError::EventAtCapacity { .. } => "EVENT_AT_CAPACITY",
            EventGateError::CheckInWindowClosed(_) => "CHECK_IN_CLOSED",
            EventGateError::BatchPreconditionFailed { .. } => "BATCH_PRECONDITION_FAILED",
            EventGateError::CheckInCodeConflict { .. }
            | EventGateError::CheckInCodeExhausted { .. } => "CHECK_IN_CODE_UNAVAILABLE",
            EventGateError::Serialization(_) | EventGateError::Io(_) => "INTERNAL_ERROR",
            EventGateError::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
