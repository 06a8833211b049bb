//! Registration model

use std::fmt;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "registration_status", rename_all = "lowercase")]
pub enum RegistrationStatus {
    Registered,
    Waitlisted,
    Attended,
    Cancelled,
}

impl RegistrationStatus {
    /// Active registrations block a second registration for the same attendee and event
    pub fn is_active(self) -> bool {
        !matches!(self, RegistrationStatus::Cancelled)
    }

    /// Registrations counted against the event capacity
    pub fn occupies_slot(self) -> bool {
        matches!(self, RegistrationStatus::Registered | RegistrationStatus::Attended)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RegistrationStatus::Attended | RegistrationStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStatus::Registered => "REGISTERED",
            RegistrationStatus::Waitlisted => "WAITLISTED",
            RegistrationStatus::Attended => "ATTENDED",
            RegistrationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub attendee_id: Uuid,
    pub status: RegistrationStatus,
    pub waitlist_position: Option<i32>,
    pub check_in_code: String,
    pub check_in_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub registration_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Where the capacity allocator puts a new registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Admitted,
    Waitlisted { position: i32 },
}

/// A registration about to be inserted.
///
/// Built only through [`NewRegistration::from_placement`], so a new record is
/// always REGISTERED or WAITLISTED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRegistration {
    id: Uuid,
    event_id: Uuid,
    attendee_id: Uuid,
    status: RegistrationStatus,
    waitlist_position: Option<i32>,
    check_in_code: String,
    notes: Option<String>,
    registration_date: DateTime<Utc>,
}

impl NewRegistration {
    pub fn from_placement(
        event_id: Uuid,
        attendee_id: Uuid,
        placement: Placement,
        check_in_code: String,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let (status, waitlist_position) = match placement {
            Placement::Admitted => (RegistrationStatus::Registered, None),
            Placement::Waitlisted { position } => (RegistrationStatus::Waitlisted, Some(position)),
        };

        Self {
            id: Uuid::new_v4(),
            event_id,
            attendee_id,
            status,
            waitlist_position,
            check_in_code,
            notes,
            registration_date: now,
        }
    }

    /// Same registration with a freshly drawn check-in code
    pub fn with_check_in_code(mut self, check_in_code: String) -> Self {
        self.check_in_code = check_in_code;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn attendee_id(&self) -> Uuid {
        self.attendee_id
    }

    pub fn status(&self) -> RegistrationStatus {
        self.status
    }

    pub fn waitlist_position(&self) -> Option<i32> {
        self.waitlist_position
    }

    pub fn check_in_code(&self) -> &str {
        &self.check_in_code
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn registration_date(&self) -> DateTime<Utc> {
        self.registration_date
    }

    /// The record as it looks once stored
    pub fn into_registration(self) -> Registration {
        Registration {
            id: self.id,
            event_id: self.event_id,
            attendee_id: self.attendee_id,
            status: self.status,
            waitlist_position: self.waitlist_position,
            check_in_code: self.check_in_code,
            check_in_time: None,
            notes: self.notes,
            registration_date: self.registration_date,
            updated_at: self.registration_date,
        }
    }
}
