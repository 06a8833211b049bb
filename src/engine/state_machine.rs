//! Registration state machine
//!
//! ```text
//! REGISTERED ──check-in──▶ ATTENDED
//!     │  ▲
//!     │  └──promotion── WAITLISTED
//!     ▼                     │
//! CANCELLED ◀───────────────┘
//! ```
//!
//! ATTENDED and CANCELLED are terminal. Checking in an ATTENDED registration
//! again is reported as already applied instead of failing.

use chrono::{DateTime, Duration, Utc};
use crate::models::{Event, Registration, RegistrationStatus};
use crate::utils::errors::{EventGateError, Result};

/// Result of validating a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// The transition changes the registration
    Apply,
    /// The registration is already in the target state (repeat check-in)
    AlreadyApplied,
}

/// Check that `from -> to` is a legal transition
pub fn validate_transition(from: RegistrationStatus, to: RegistrationStatus) -> Result<TransitionKind> {
    use RegistrationStatus::*;

    match (from, to) {
        (Attended, Attended) => Ok(TransitionKind::AlreadyApplied),
        (Attended, _) => Err(EventGateError::AlreadyCheckedIn),
        (Cancelled, _) => Err(EventGateError::AlreadyCancelled),
        (Registered, Attended) | (Registered, Cancelled) => Ok(TransitionKind::Apply),
        (Waitlisted, Registered) | (Waitlisted, Cancelled) => Ok(TransitionKind::Apply),
        (from, to) => Err(EventGateError::InvalidStateTransition { from, to }),
    }
}

/// Instant the check-in window opens
pub fn check_in_opens_at(event: &Event, window: Duration) -> DateTime<Utc> {
    event.event_date - window
}

/// Guard of REGISTERED -> ATTENDED: published event, `now` inside
/// `[event_date - window, event_date]`
pub fn ensure_check_in_window(event: &Event, now: DateTime<Utc>, window: Duration) -> Result<()> {
    if !event.is_published() {
        return Err(EventGateError::CheckInWindowClosed(
            format!("event is {}", event.status)
        ));
    }

    if now > event.event_date {
        return Err(EventGateError::CheckInWindowClosed("event has ended".to_string()));
    }

    if now < check_in_opens_at(event, window) {
        return Err(EventGateError::CheckInWindowClosed(
            format!("check-in opens {} hours before the event", window.num_hours())
        ));
    }

    Ok(())
}

/// Guard of every cancellation: the event has not started
pub fn ensure_not_started(event: &Event, now: DateTime<Utc>) -> Result<()> {
    if event.has_started(now) {
        return Err(EventGateError::EventExpired);
    }
    Ok(())
}

/// Move a registration to `to`, keeping its fields consistent with the new state.
///
/// Guards that depend on the event are the caller's responsibility; this
/// only enforces the transition table.
pub fn apply(registration: &mut Registration, to: RegistrationStatus, now: DateTime<Utc>) -> Result<TransitionKind> {
    let kind = validate_transition(registration.status, to)?;
    if kind == TransitionKind::AlreadyApplied {
        return Ok(kind);
    }

    registration.status = to;
    registration.waitlist_position = None;
    if to == RegistrationStatus::Attended {
        registration.check_in_time = Some(now);
    }
    registration.updated_at = now;

    Ok(kind)
}
