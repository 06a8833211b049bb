//! Waitlist promoter
//!
//! Cancels registrations and keeps the waitlist dense. When a REGISTERED
//! registration is cancelled the head of the waitlist takes its slot and
//! every later position moves up by one; when a WAITLISTED registration is
//! cancelled only the positions behind it move. Both happen in the same
//! transaction as the cancellation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use crate::database::{RegistrationStore, StoreTransaction};
use crate::models::{Event, Registration, RegistrationStatus};
use crate::services::{AccessPolicy, Actor, Notice};
use crate::utils::errors::{EventGateError, Result};
use crate::utils::logging::log_registration_action;
use super::state_machine;
use super::RegistrationEngine;

/// Committed result of a cancellation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    /// The cancelled registration
    pub registration: Registration,
    /// The waitlisted registration that took the freed slot, if any
    pub promoted: Option<Registration>,
}

/// Cancellation preconditions, checked in the order callers observe them.
///
/// The event start is checked before the cutoff, so a self-service
/// cancellation after the event began is `EventExpired` rather than
/// `CancellationNotAllowed`.
pub fn ensure_cancellable(
    actor: &Actor,
    registration: &Registration,
    event: &Event,
    now: DateTime<Utc>,
    cutoff: Duration,
) -> Result<()> {
    AccessPolicy::require_cancel(actor, registration, event)?;

    match registration.status {
        RegistrationStatus::Attended => return Err(EventGateError::AlreadyAttended),
        RegistrationStatus::Cancelled => return Err(EventGateError::AlreadyCancelled),
        RegistrationStatus::Registered | RegistrationStatus::Waitlisted => {}
    }

    state_machine::ensure_not_started(event, now)?;

    if actor.is_self_service(event) && event.event_date - now < cutoff {
        return Err(EventGateError::CancellationNotAllowed { cutoff_hours: cutoff.num_hours() });
    }

    Ok(())
}

/// Cancel `registration` and fill or close the gap it leaves.
///
/// The caller holds the event lock and has checked [`ensure_cancellable`].
pub async fn cancel_in_tx<T: StoreTransaction>(
    tx: &mut T,
    mut registration: Registration,
    now: DateTime<Utc>,
) -> Result<Cancellation> {
    let previous_status = registration.status;
    let previous_position = registration.waitlist_position;
    let event_id = registration.event_id;

    state_machine::apply(&mut registration, RegistrationStatus::Cancelled, now)?;
    tx.save_registration(&registration).await?;

    let promoted = match previous_status {
        RegistrationStatus::Registered => promote_head(tx, event_id, now).await?,
        RegistrationStatus::Waitlisted => {
            if let Some(position) = previous_position {
                let moved = tx.close_waitlist_gap(event_id, position).await?;
                debug!(event_id = %event_id, vacated = position, moved = moved, "Waitlist recompacted");
            }
            None
        }
        _ => None,
    };

    Ok(Cancellation { registration, promoted })
}

/// Promote the head of the waitlist into a freed slot
async fn promote_head<T: StoreTransaction>(tx: &mut T, event_id: Uuid, now: DateTime<Utc>) -> Result<Option<Registration>> {
    let Some(head) = tx.first_waitlisted(event_id).await? else {
        return Ok(None);
    };

    promote_in_tx(tx, head, now).await.map(Some)
}

/// Move one WAITLISTED registration to REGISTERED and close the gap behind it.
///
/// Capacity is the caller's concern.
pub async fn promote_in_tx<T: StoreTransaction>(
    tx: &mut T,
    mut registration: Registration,
    now: DateTime<Utc>,
) -> Result<Registration> {
    let vacated = registration.waitlist_position;
    state_machine::apply(&mut registration, RegistrationStatus::Registered, now)?;
    tx.save_registration(&registration).await?;

    if let Some(position) = vacated {
        let moved = tx.close_waitlist_gap(registration.event_id, position).await?;
        debug!(event_id = %registration.event_id, vacated = position, moved = moved, "Waitlist recompacted");
    }

    Ok(registration)
}

impl<S: RegistrationStore> RegistrationEngine<S> {
    /// Cancel a registration on behalf of `actor`
    pub async fn cancel(&self, registration_id: Uuid, actor: &Actor) -> Result<Cancellation> {
        debug!(registration_id = %registration_id, actor_id = %actor.user_id, "Cancelling registration");
        let result = self.cancel_inner(registration_id, actor).await;
        let cancellation = self.observe("cancel", registration_id, result)?;

        log_registration_action(cancellation.registration.id, cancellation.registration.event_id, "cancelled", None);
        self.notify(Notice::Cancelled {
            registration: cancellation.registration.clone(),
            cancelled_by: actor.user_id,
        });

        if let Some(promoted) = &cancellation.promoted {
            log_registration_action(promoted.id, promoted.event_id, "promoted", Some("from waitlist"));
            self.notify(Notice::Promoted { registration: promoted.clone() });
        }

        Ok(cancellation)
    }

    async fn cancel_inner(&self, registration_id: Uuid, actor: &Actor) -> Result<Cancellation> {
        let now = self.now();
        let mut tx = self.store().begin().await?;

        let event_id = tx
            .find_registration(registration_id)
            .await?
            .ok_or(EventGateError::RegistrationNotFound { registration_id })?
            .event_id;

        let event = tx
            .lock_event(event_id)
            .await?
            .ok_or(EventGateError::EventNotFound { event_id })?;

        // Re-read under the event lock
        let registration = tx
            .find_registration(registration_id)
            .await?
            .ok_or(EventGateError::RegistrationNotFound { registration_id })?;

        ensure_cancellable(actor, &registration, &event, now, self.config().cancellation_cutoff())?;

        let cancellation = cancel_in_tx(&mut tx, registration, now).await?;
        tx.commit().await?;

        info!(
            registration_id = %registration_id,
            event_id = %event_id,
            promoted = ?cancellation.promoted.as_ref().map(|r| r.id),
            "Registration cancelled"
        );
        Ok(cancellation)
    }
}
