//! Check-in validator
//!
//! Resolves a presented code to a registration of the event and decides
//! whether it may be checked in. Every non-admitting answer is an outcome,
//! not an error: the door staff needs to tell "on the waitlist" from
//! "already inside" from "wrong code".
//!
//! Codes arrive either typed in for a known event or scanned from the QR
//! code of a registration, which carries a [`CheckInPayload`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use crate::database::{RegistrationStore, StoreTransaction};
use crate::models::{Event, Registration, RegistrationStatus};
use crate::services::{AccessPolicy, Actor, Notice, Permission};
use crate::utils::errors::{EventGateError, Result};
use crate::utils::helpers::{format_timestamp, normalize_check_in_code};
use crate::utils::logging::log_check_in;
use super::state_machine;
use super::RegistrationEngine;

/// What a presented code resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckInOutcome {
    Success {
        registration: Registration,
        attendee_name: Option<String>,
    },
    AlreadyCheckedIn {
        registration: Registration,
        attendee_name: Option<String>,
    },
    OnWaitlist {
        registration: Registration,
        attendee_name: Option<String>,
        position: Option<i32>,
    },
    Cancelled {
        registration: Registration,
        attendee_name: Option<String>,
    },
    InvalidCode,
    TooEarly {
        registration: Registration,
        attendee_name: Option<String>,
        opens_at: DateTime<Utc>,
    },
    EventEnded {
        registration: Registration,
        attendee_name: Option<String>,
    },
    EventNotPublished {
        registration: Registration,
        attendee_name: Option<String>,
    },
}

impl CheckInOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckInOutcome::Success { .. })
    }

    pub fn registration(&self) -> Option<&Registration> {
        match self {
            CheckInOutcome::Success { registration, .. }
            | CheckInOutcome::AlreadyCheckedIn { registration, .. }
            | CheckInOutcome::OnWaitlist { registration, .. }
            | CheckInOutcome::Cancelled { registration, .. }
            | CheckInOutcome::TooEarly { registration, .. }
            | CheckInOutcome::EventEnded { registration, .. }
            | CheckInOutcome::EventNotPublished { registration, .. } => Some(registration),
            CheckInOutcome::InvalidCode => None,
        }
    }

    pub fn attendee_name(&self) -> Option<&str> {
        match self {
            CheckInOutcome::Success { attendee_name, .. }
            | CheckInOutcome::AlreadyCheckedIn { attendee_name, .. }
            | CheckInOutcome::OnWaitlist { attendee_name, .. }
            | CheckInOutcome::Cancelled { attendee_name, .. }
            | CheckInOutcome::TooEarly { attendee_name, .. }
            | CheckInOutcome::EventEnded { attendee_name, .. }
            | CheckInOutcome::EventNotPublished { attendee_name, .. } => attendee_name.as_deref(),
            CheckInOutcome::InvalidCode => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInOutcome::Success { .. } => "SUCCESS",
            CheckInOutcome::AlreadyCheckedIn { .. } => "ALREADY_CHECKED_IN",
            CheckInOutcome::OnWaitlist { .. } => "ON_WAITLIST",
            CheckInOutcome::Cancelled { .. } => "CANCELLED",
            CheckInOutcome::InvalidCode => "INVALID_CODE",
            CheckInOutcome::TooEarly { .. } => "TOO_EARLY",
            CheckInOutcome::EventEnded { .. } => "EVENT_ENDED",
            CheckInOutcome::EventNotPublished { .. } => "EVENT_NOT_PUBLISHED",
        }
    }

    /// Human readable message for door staff
    pub fn message(&self) -> String {
        let name = self.attendee_name().unwrap_or("Attendee");
        match self {
            CheckInOutcome::Success { .. } => format!("{} checked in", name),
            CheckInOutcome::AlreadyCheckedIn { registration, .. } => match registration.check_in_time {
                Some(at) => format!("{} already checked in at {}", name, at.format("%H:%M")),
                None => format!("{} already checked in", name),
            },
            CheckInOutcome::OnWaitlist { position: Some(position), .. } => {
                format!("{} is on the waitlist (position {})", name, position)
            }
            CheckInOutcome::OnWaitlist { .. } => format!("{} is on the waitlist", name),
            CheckInOutcome::Cancelled { .. } => format!("Registration of {} was cancelled", name),
            CheckInOutcome::InvalidCode => "Invalid check-in code".to_string(),
            CheckInOutcome::TooEarly { opens_at, .. } => {
                format!("Check-in opens at {}", format_timestamp(*opens_at))
            }
            CheckInOutcome::EventEnded { .. } => "Event has ended".to_string(),
            CheckInOutcome::EventNotPublished { .. } => "Event is not published".to_string(),
        }
    }
}

/// JSON carried by the QR code of a registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInPayload {
    pub registration_id: Uuid,
    pub check_in_code: String,
}

impl CheckInPayload {
    pub fn for_registration(registration: &Registration) -> Self {
        Self {
            registration_id: registration.id,
            check_in_code: registration.check_in_code.clone(),
        }
    }

    /// Parse scanned QR data, `None` if it is not a payload
    pub fn parse(qr_data: &str) -> Option<Self> {
        serde_json::from_str(qr_data.trim()).ok()
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decision over a resolved code, before any attendee details are attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ready,
    InvalidCode,
    AlreadyCheckedIn,
    OnWaitlist,
    Cancelled,
    EventNotPublished,
    EventEnded,
    TooEarly { opens_at: DateTime<Utc> },
}

/// Decide what a resolved code means at `now`
pub fn assess(registration: Option<&Registration>, event: &Event, now: DateTime<Utc>, window: Duration) -> Verdict {
    let Some(registration) = registration else {
        return Verdict::InvalidCode;
    };

    match registration.status {
        RegistrationStatus::Attended => Verdict::AlreadyCheckedIn,
        RegistrationStatus::Waitlisted => Verdict::OnWaitlist,
        RegistrationStatus::Cancelled => Verdict::Cancelled,
        RegistrationStatus::Registered => {
            let opens_at = state_machine::check_in_opens_at(event, window);
            if !event.is_published() {
                Verdict::EventNotPublished
            } else if now > event.event_date {
                Verdict::EventEnded
            } else if now < opens_at {
                Verdict::TooEarly { opens_at }
            } else {
                Verdict::Ready
            }
        }
    }
}

fn outcome(verdict: Verdict, registration: Option<Registration>, attendee_name: Option<String>) -> CheckInOutcome {
    let Some(registration) = registration else {
        return CheckInOutcome::InvalidCode;
    };

    match verdict {
        Verdict::Ready => CheckInOutcome::Success { registration, attendee_name },
        Verdict::InvalidCode => CheckInOutcome::InvalidCode,
        Verdict::AlreadyCheckedIn => CheckInOutcome::AlreadyCheckedIn { registration, attendee_name },
        Verdict::OnWaitlist => {
            let position = registration.waitlist_position;
            CheckInOutcome::OnWaitlist { registration, attendee_name, position }
        }
        Verdict::Cancelled => CheckInOutcome::Cancelled { registration, attendee_name },
        Verdict::EventNotPublished => CheckInOutcome::EventNotPublished { registration, attendee_name },
        Verdict::EventEnded => CheckInOutcome::EventEnded { registration, attendee_name },
        Verdict::TooEarly { opens_at } => CheckInOutcome::TooEarly { registration, attendee_name, opens_at },
    }
}

/// Resolve a presented code within the event
async fn resolve<T: StoreTransaction>(tx: &mut T, event_id: Uuid, code: &str) -> Result<(Option<Registration>, Option<String>)> {
    let Some(code) = normalize_check_in_code(code) else {
        debug!(event_id = %event_id, "Malformed check-in code presented");
        return Ok((None, None));
    };

    let Some(registration) = tx.find_by_check_in_code(event_id, &code).await? else {
        return Ok((None, None));
    };

    let attendee_name = tx.find_user(registration.attendee_id).await?.map(|user| user.name);
    Ok((Some(registration), attendee_name))
}

impl<S: RegistrationStore> RegistrationEngine<S> {
    /// Check in the holder of `code` at the door of an event
    pub async fn check_in(&self, event_id: Uuid, code: &str, actor: &Actor) -> Result<CheckInOutcome> {
        debug!(event_id = %event_id, actor_id = %actor.user_id, "Checking in");
        let result = self.check_in_inner(event_id, code, actor).await;
        let outcome = self.observe("check_in", event_id, result)?;

        self.record_check_in(event_id, actor, &outcome);
        Ok(outcome)
    }

    async fn check_in_inner(&self, event_id: Uuid, code: &str, actor: &Actor) -> Result<CheckInOutcome> {
        let now = self.now();
        let mut tx = self.store().begin().await?;

        let event = tx
            .lock_event(event_id)
            .await?
            .ok_or(EventGateError::EventNotFound { event_id })?;
        AccessPolicy::require(actor, Permission::CheckIn, &event)?;

        let (registration, attendee_name) = resolve(&mut tx, event_id, code).await?;
        self.complete_check_in(tx, &event, registration, attendee_name, actor, now).await
    }

    /// Check in from scanned QR data.
    ///
    /// Unreadable data, an unknown registration and a code that does not
    /// belong to the registration all answer `InvalidCode`.
    pub async fn check_in_payload(&self, qr_data: &str, actor: &Actor) -> Result<CheckInOutcome> {
        let Some(payload) = CheckInPayload::parse(qr_data) else {
            debug!(actor_id = %actor.user_id, "Unreadable check-in payload");
            log_check_in(Uuid::nil(), actor.user_id, CheckInOutcome::InvalidCode.as_str(), false);
            return Ok(CheckInOutcome::InvalidCode);
        };

        debug!(registration_id = %payload.registration_id, actor_id = %actor.user_id, "Checking in from payload");
        let result = self.check_in_payload_inner(&payload, actor).await;
        let outcome = self.observe("check_in_payload", payload.registration_id, result)?;

        let event_id = outcome.registration().map_or(Uuid::nil(), |r| r.event_id);
        self.record_check_in(event_id, actor, &outcome);
        Ok(outcome)
    }

    async fn check_in_payload_inner(&self, payload: &CheckInPayload, actor: &Actor) -> Result<CheckInOutcome> {
        let now = self.now();
        let mut tx = self.store().begin().await?;

        let Some(found) = tx.find_registration(payload.registration_id).await? else {
            tx.rollback().await?;
            return Ok(CheckInOutcome::InvalidCode);
        };

        let event = tx
            .lock_event(found.event_id)
            .await?
            .ok_or(EventGateError::EventNotFound { event_id: found.event_id })?;
        AccessPolicy::require(actor, Permission::CheckIn, &event)?;

        // Re-read under the event lock
        let presented = normalize_check_in_code(&payload.check_in_code);
        let registration = tx
            .find_registration(payload.registration_id)
            .await?
            .filter(|r| presented.as_deref() == Some(r.check_in_code.as_str()));

        let attendee_name = match &registration {
            Some(registration) => tx.find_user(registration.attendee_id).await?.map(|user| user.name),
            None => None,
        };
        self.complete_check_in(tx, &event, registration, attendee_name, actor, now).await
    }

    /// Apply the verdict for a resolved registration and end the transaction
    async fn complete_check_in<T: StoreTransaction>(
        &self,
        mut tx: T,
        event: &Event,
        registration: Option<Registration>,
        attendee_name: Option<String>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<CheckInOutcome> {
        let verdict = assess(registration.as_ref(), event, now, self.config().check_in_window());

        let registration = match (verdict, registration) {
            (Verdict::Ready, Some(mut registration)) => {
                state_machine::apply(&mut registration, RegistrationStatus::Attended, now)?;
                tx.save_registration(&registration).await?;
                tx.commit().await?;

                info!(
                    registration_id = %registration.id,
                    event_id = %event.id,
                    checked_in_by = %actor.user_id,
                    "Attendee checked in"
                );
                Some(registration)
            }
            (_, registration) => {
                tx.rollback().await?;
                registration
            }
        };

        Ok(outcome(verdict, registration, attendee_name))
    }

    fn record_check_in(&self, event_id: Uuid, actor: &Actor, outcome: &CheckInOutcome) {
        log_check_in(event_id, actor.user_id, outcome.as_str(), false);
        if let CheckInOutcome::Success { registration, .. } = outcome {
            self.notify(Notice::CheckedIn {
                registration: registration.clone(),
                checked_in_by: actor.user_id,
            });
        }
    }

    /// Preview what [`check_in`](Self::check_in) would answer, without writing.
    ///
    /// `Success` here means the code would be accepted now.
    pub async fn validate_check_in(&self, event_id: Uuid, code: &str) -> Result<CheckInOutcome> {
        let result = self.validate_check_in_inner(event_id, code).await;
        let outcome = self.observe("validate_check_in", event_id, result)?;
        log_check_in(event_id, Uuid::nil(), outcome.as_str(), true);
        Ok(outcome)
    }

    async fn validate_check_in_inner(&self, event_id: Uuid, code: &str) -> Result<CheckInOutcome> {
        let now = self.now();
        let mut tx = self.store().begin().await?;

        let event = tx
            .find_event(event_id)
            .await?
            .ok_or(EventGateError::EventNotFound { event_id })?;

        let (registration, attendee_name) = resolve(&mut tx, event_id, code).await?;
        let verdict = assess(registration.as_ref(), &event, now, self.config().check_in_window());
        tx.rollback().await?;

        Ok(outcome(verdict, registration, attendee_name))
    }
}
