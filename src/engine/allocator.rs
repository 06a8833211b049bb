//! Capacity allocator
//!
//! Decides whether a new registration is admitted or waitlisted. The
//! occupancy read, the duplicate check and the insert all happen while the
//! event row is locked, so two admissions racing for the last slot are
//! ordered: the first lands REGISTERED and the second WAITLISTED.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;
use crate::database::{RegistrationStore, StoreTransaction};
use crate::models::{Event, NewRegistration, Placement, Registration};
use crate::services::Notice;
use crate::utils::errors::{EventGateError, Result};
use crate::utils::helpers::generate_check_in_code;
use crate::utils::logging::log_registration_action;
use super::RegistrationEngine;

/// Longest note an attendee may attach to a registration
pub const MAX_NOTES_LENGTH: usize = 500;

/// Decide where a new registration goes
pub fn place(capacity: Option<i32>, occupancy: i64, max_waitlist_position: Option<i32>) -> Placement {
    match capacity {
        Some(capacity) if occupancy >= i64::from(capacity) => Placement::Waitlisted {
            position: max_waitlist_position.unwrap_or(0) + 1,
        },
        _ => Placement::Admitted,
    }
}

/// Event-level admission preconditions
pub fn ensure_admissible(event: &Event, now: DateTime<Utc>) -> Result<()> {
    if !event.is_published() {
        return Err(EventGateError::EventNotAvailable);
    }

    if let Some(deadline) = event.registration_deadline {
        if now > deadline {
            return Err(EventGateError::RegistrationClosed);
        }
    }

    if event.has_started(now) {
        return Err(EventGateError::EventExpired);
    }

    Ok(())
}

impl<S: RegistrationStore> RegistrationEngine<S> {
    /// Register an attendee for an event
    pub async fn admit(&self, event_id: Uuid, attendee_id: Uuid) -> Result<Registration> {
        self.admit_with_notes(event_id, attendee_id, None).await
    }

    /// Register an attendee for an event, attaching free-form notes
    pub async fn admit_with_notes(&self, event_id: Uuid, attendee_id: Uuid, notes: Option<String>) -> Result<Registration> {
        debug!(event_id = %event_id, attendee_id = %attendee_id, "Admitting attendee");
        let result = self.admit_inner(event_id, attendee_id, notes).await;
        let registration = self.observe("admit", event_id, result)?;

        match registration.waitlist_position {
            Some(position) => {
                log_registration_action(registration.id, event_id, "waitlisted", Some(&format!("position {}", position)));
                self.notify(Notice::Waitlisted { registration: registration.clone(), position });
            }
            None => {
                log_registration_action(registration.id, event_id, "registered", None);
                self.notify(Notice::Registered { registration: registration.clone() });
            }
        }

        Ok(registration)
    }

    async fn admit_inner(&self, event_id: Uuid, attendee_id: Uuid, notes: Option<String>) -> Result<Registration> {
        if let Some(notes) = &notes {
            if notes.chars().count() > MAX_NOTES_LENGTH {
                return Err(EventGateError::InvalidInput(
                    format!("Notes cannot exceed {} characters", MAX_NOTES_LENGTH)
                ));
            }
        }

        let now = self.now();
        let mut tx = self.store().begin().await?;

        let event = tx
            .lock_event(event_id)
            .await?
            .ok_or(EventGateError::EventNotFound { event_id })?;

        if tx.find_user(attendee_id).await?.is_none() {
            return Err(EventGateError::UserNotFound { user_id: attendee_id });
        }

        ensure_admissible(&event, now)?;

        if tx.find_active_registration(event_id, attendee_id).await?.is_some() {
            return Err(EventGateError::AlreadyRegistered);
        }

        let occupancy = tx.count_occupancy(event_id).await?;
        let placement = match place(event.capacity, occupancy, None) {
            Placement::Admitted => Placement::Admitted,
            Placement::Waitlisted { .. } => place(event.capacity, occupancy, tx.max_waitlist_position(event_id).await?),
        };

        let code_length = self.config().check_in_code_length;
        let attempts = self.config().check_in_code_attempts;
        let mut candidate = NewRegistration::from_placement(
            event_id,
            attendee_id,
            placement,
            generate_check_in_code(code_length),
            notes,
            now,
        );

        let mut attempt = 1;
        let registration = loop {
            match tx.insert_registration(&candidate).await {
                Ok(registration) => break registration,
                Err(EventGateError::CheckInCodeConflict { code, .. }) if attempt < attempts => {
                    debug!(event_id = %event_id, code = %code, attempt = attempt, "Check-in code collision, drawing a new code");
                    attempt += 1;
                    candidate = candidate.with_check_in_code(generate_check_in_code(code_length));
                }
                Err(EventGateError::CheckInCodeConflict { .. }) => {
                    return Err(EventGateError::CheckInCodeExhausted { attempts });
                }
                Err(e) => return Err(e),
            }
        };

        tx.commit().await?;

        info!(
            registration_id = %registration.id,
            event_id = %event_id,
            status = %registration.status,
            occupancy = occupancy,
            "Registration created"
        );
        Ok(registration)
    }
}
