//! Access control for registration operations
//!
//! The acting principal arrives already authenticated as an [`Actor`]; this
//! module decides what that actor may do to a given event or registration.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use crate::models::{Event, Registration, UserRole};
use crate::utils::errors::{EventGateError, Result};

/// Authenticated principal performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn attendee(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Attendee)
    }

    pub fn organizer(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Organizer)
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, UserRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Admins manage every event, organizers only their own
    pub fn manages(&self, event: &Event) -> bool {
        self.is_admin() || event.is_organizer(self.user_id)
    }

    /// Self-service actions are subject to attendee-only rules such as the cancellation cutoff
    pub fn is_self_service(&self, event: &Event) -> bool {
        !self.manages(event)
    }
}

/// Permission levels for different operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Cancel a registration
    CancelRegistration,
    /// Check attendees in at the door
    CheckIn,
    /// View registrations and statistics of an event
    ViewEventRegistrations,
    /// Change the status of an event
    ManageEvent,
    /// Change another user's role
    ManageUsers,
}

/// Access policy shared by all engine operations
pub struct AccessPolicy;

impl AccessPolicy {
    /// Check a permission that is scoped to an event
    pub fn can(actor: &Actor, permission: Permission, event: &Event) -> bool {
        match permission {
            Permission::CancelRegistration
            | Permission::CheckIn
            | Permission::ViewEventRegistrations
            | Permission::ManageEvent => actor.manages(event),
            Permission::ManageUsers => actor.is_admin(),
        }
    }

    /// Require an event-scoped permission or return `Forbidden`
    pub fn require(actor: &Actor, permission: Permission, event: &Event) -> Result<()> {
        if Self::can(actor, permission, event) {
            return Ok(());
        }

        debug!(user_id = %actor.user_id, event_id = %event.id, permission = ?permission, "Permission denied");
        Err(EventGateError::Forbidden(
            format!("User {} lacks {:?} on event {}", actor.user_id, permission, event.id)
        ))
    }

    /// The attendee, the event organizer, or an admin may cancel
    pub fn require_cancel(actor: &Actor, registration: &Registration, event: &Event) -> Result<()> {
        if registration.attendee_id == actor.user_id {
            return Ok(());
        }
        Self::require(actor, Permission::CancelRegistration, event)
    }

    /// Require a permission that is not scoped to any event
    pub fn require_global(actor: &Actor, permission: Permission) -> Result<()> {
        match permission {
            Permission::ManageUsers if actor.is_admin() => Ok(()),
            _ => Err(EventGateError::Forbidden(
                format!("User {} lacks {:?}", actor.user_id, permission)
            )),
        }
    }
}
