//! Bulk operation coordinator
//!
//! A batch is all-or-nothing. Every member is checked against the
//! precondition its single-item operation would check, inside the same
//! transaction that applies it; the first failing member aborts the whole
//! batch and nothing is written.

use std::collections::{BTreeSet, HashMap, HashSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use crate::config::RegistrationConfig;
use crate::database::{RegistrationStore, StoreTransaction};
use crate::models::{Event, EventStatus, Registration, RegistrationStatus, UserRole};
use crate::services::{AccessPolicy, Actor, Notice, Permission};
use crate::utils::errors::{EventGateError, Result};
use crate::utils::logging::{log_batch_operation, log_registration_action};
use super::promoter::{cancel_in_tx, ensure_cancellable, promote_in_tx};
use super::state_machine::{self, TransitionKind};
use super::RegistrationEngine;

/// Longest reason accepted on a batch
pub const MAX_REASON_LENGTH: usize = 500;

/// Kind of record a batch targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchTarget {
    Registrations,
    Events,
    Users,
}

impl BatchTarget {
    fn noun(self) -> &'static str {
        match self {
            BatchTarget::Registrations => "registrations",
            BatchTarget::Events => "events",
            BatchTarget::Users => "users",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BatchAction {
    CancelRegistrations,
    CheckInRegistrations,
    PromoteRegistrations,
    PublishEvents,
    CancelEvents,
    ArchiveEvents,
    PromoteUsers { role: UserRole },
    DemoteUsers,
}

impl BatchAction {
    pub fn target(&self) -> BatchTarget {
        match self {
            BatchAction::CancelRegistrations
            | BatchAction::CheckInRegistrations
            | BatchAction::PromoteRegistrations => BatchTarget::Registrations,
            BatchAction::PublishEvents | BatchAction::CancelEvents | BatchAction::ArchiveEvents => BatchTarget::Events,
            BatchAction::PromoteUsers { .. } | BatchAction::DemoteUsers => BatchTarget::Users,
        }
    }

    /// Verb used in logs and summaries
    pub fn verb(&self) -> &'static str {
        match self {
            BatchAction::CancelRegistrations | BatchAction::CancelEvents => "cancel",
            BatchAction::CheckInRegistrations => "checkin",
            BatchAction::PromoteRegistrations | BatchAction::PromoteUsers { .. } => "promote",
            BatchAction::PublishEvents => "publish",
            BatchAction::ArchiveEvents => "archive",
            BatchAction::DemoteUsers => "demote",
        }
    }

    fn limit(&self, config: &RegistrationConfig) -> usize {
        match self.target() {
            BatchTarget::Registrations => config.max_registration_batch,
            BatchTarget::Events => config.max_event_batch,
            BatchTarget::Users => config.max_user_batch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub action: BatchAction,
    pub ids: Vec<Uuid>,
    pub reason: Option<String>,
}

impl BatchRequest {
    pub fn new(action: BatchAction, ids: Vec<Uuid>) -> Self {
        Self { action, ids, reason: None }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Shape checks that need no data
    pub fn validate(&self, config: &RegistrationConfig) -> Result<()> {
        if self.ids.is_empty() {
            return Err(EventGateError::InvalidInput(
                format!("At least one {} id is required", self.action.target().noun().trim_end_matches('s'))
            ));
        }

        let limit = self.action.limit(config);
        if self.ids.len() > limit {
            return Err(EventGateError::InvalidInput(
                format!("Maximum {} {} per batch", limit, self.action.target().noun())
            ));
        }

        let mut seen = HashSet::with_capacity(self.ids.len());
        if let Some(duplicate) = self.ids.iter().find(|id| !seen.insert(**id)) {
            return Err(EventGateError::InvalidInput(format!("Duplicate id {} in batch", duplicate)));
        }

        if let Some(reason) = &self.reason {
            if reason.chars().count() > MAX_REASON_LENGTH {
                return Err(EventGateError::InvalidInput(
                    format!("Reason cannot exceed {} characters", MAX_REASON_LENGTH)
                ));
            }
        }

        Ok(())
    }
}

/// New state of a batch member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchStatus {
    Registration(RegistrationStatus),
    Event(EventStatus),
    User(UserRole),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: Uuid,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub action: BatchAction,
    pub processed: usize,
    pub items: Vec<BatchItem>,
    pub reason: Option<String>,
    pub summary: String,
}

/// Role gate applied before any member is read
fn ensure_actor_may_run(actor: &Actor, action: &BatchAction) -> Result<()> {
    match actor.role {
        _ if action.target() == BatchTarget::Users => AccessPolicy::require_global(actor, Permission::ManageUsers),
        UserRole::Attendee if *action != BatchAction::CancelRegistrations => Err(EventGateError::Forbidden(
            format!("Attendees may only cancel their own registrations, not {}", action.verb())
        )),
        _ => Ok(()),
    }
}

/// Attach the failing member to a precondition error; infrastructure errors pass through
fn member_failure(id: Uuid, error: EventGateError) -> EventGateError {
    if error.is_precondition() {
        EventGateError::BatchPreconditionFailed { id, reason: error.to_string() }
    } else {
        error
    }
}

fn not_found(id: Uuid) -> EventGateError {
    EventGateError::BatchPreconditionFailed { id, reason: "not found".to_string() }
}

/// Writes collected while a batch runs, reported only after commit
#[derive(Default)]
struct Applied {
    items: Vec<BatchItem>,
    cancelled: Vec<Registration>,
    promoted: Vec<Registration>,
    checked_in: Vec<Registration>,
}

impl<S: RegistrationStore> RegistrationEngine<S> {
    /// Apply one action to many records atomically
    pub async fn apply_batch(&self, request: BatchRequest, actor: &Actor) -> Result<BatchResult> {
        debug!(
            action = request.action.verb(),
            target = request.action.target().noun(),
            size = request.ids.len(),
            actor_id = %actor.user_id,
            "Applying batch"
        );
        let target = request.ids.first().copied().unwrap_or_else(Uuid::nil);
        let result = self.apply_batch_inner(&request, actor).await;
        let applied = self.observe("apply_batch", target, result)?;

        for registration in &applied.cancelled {
            log_registration_action(registration.id, registration.event_id, "cancelled", Some("batch"));
            self.notify(Notice::Cancelled { registration: registration.clone(), cancelled_by: actor.user_id });
        }
        for registration in &applied.promoted {
            log_registration_action(registration.id, registration.event_id, "promoted", Some("batch"));
            self.notify(Notice::Promoted { registration: registration.clone() });
        }
        for registration in &applied.checked_in {
            log_registration_action(registration.id, registration.event_id, "checked_in", Some("batch"));
            self.notify(Notice::CheckedIn { registration: registration.clone(), checked_in_by: actor.user_id });
        }

        let processed = applied.items.len();
        log_batch_operation(actor.user_id, request.action.verb(), processed, request.reason.as_deref());
        self.notify(Notice::BatchApplied {
            action: request.action.verb().to_string(),
            processed,
            actor_id: actor.user_id,
        });

        Ok(BatchResult {
            action: request.action,
            processed,
            items: applied.items,
            summary: format!(
                "Batch {} completed: {} {} processed",
                request.action.verb(),
                processed,
                request.action.target().noun()
            ),
            reason: request.reason,
        })
    }

    async fn apply_batch_inner(&self, request: &BatchRequest, actor: &Actor) -> Result<Applied> {
        request.validate(self.config())?;
        ensure_actor_may_run(actor, &request.action)?;

        let now = self.now();
        let mut tx = self.store().begin().await?;

        let applied = match request.action.target() {
            BatchTarget::Registrations => self.apply_to_registrations(&mut tx, request, actor, now).await?,
            BatchTarget::Events => self.apply_to_events(&mut tx, request, actor, now).await?,
            BatchTarget::Users => self.apply_to_users(&mut tx, request, actor, now).await?,
        };

        tx.commit().await?;
        info!(
            action = request.action.verb(),
            processed = applied.items.len(),
            actor_id = %actor.user_id,
            "Batch committed"
        );
        Ok(applied)
    }

    async fn apply_to_registrations(
        &self,
        tx: &mut S::Tx,
        request: &BatchRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let mut event_ids = BTreeSet::new();
        for id in &request.ids {
            let registration = tx.find_registration(*id).await?.ok_or_else(|| not_found(*id))?;
            event_ids.insert(registration.event_id);
        }

        // Ascending id order, so overlapping batches cannot deadlock
        let mut events: HashMap<Uuid, Event> = HashMap::with_capacity(event_ids.len());
        for event_id in event_ids {
            let event = tx
                .lock_event(event_id)
                .await?
                .ok_or(EventGateError::EventNotFound { event_id })?;
            events.insert(event_id, event);
        }

        let mut applied = Applied::default();
        for id in &request.ids {
            // Re-read: earlier members may have moved this one
            let registration = tx.find_registration(*id).await?.ok_or_else(|| not_found(*id))?;
            let event = events
                .get(&registration.event_id)
                .ok_or(EventGateError::EventNotFound { event_id: registration.event_id })?;

            let updated = match request.action {
                BatchAction::CancelRegistrations => {
                    ensure_cancellable(actor, &registration, event, now, self.config().cancellation_cutoff())
                        .map_err(|e| member_failure(*id, e))?;
                    let cancellation = cancel_in_tx(tx, registration, now).await.map_err(|e| member_failure(*id, e))?;
                    applied.promoted.extend(cancellation.promoted);
                    applied.cancelled.push(cancellation.registration.clone());
                    cancellation.registration
                }
                BatchAction::CheckInRegistrations => {
                    let checked_in = check_in_member(tx, registration, event, actor, now, self.config())
                        .await
                        .map_err(|e| member_failure(*id, e))?;
                    applied.checked_in.push(checked_in.clone());
                    checked_in
                }
                BatchAction::PromoteRegistrations => {
                    let promoted = promote_member(tx, registration, event, actor, now)
                        .await
                        .map_err(|e| member_failure(*id, e))?;
                    applied.promoted.push(promoted.clone());
                    promoted
                }
                other => {
                    return Err(EventGateError::InvalidInput(format!("{:?} does not apply to registrations", other)));
                }
            };

            applied.items.push(BatchItem { id: *id, status: BatchStatus::Registration(updated.status) });
        }

        Ok(applied)
    }

    async fn apply_to_events(
        &self,
        tx: &mut S::Tx,
        request: &BatchRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let mut sorted: Vec<Uuid> = request.ids.clone();
        sorted.sort();

        let mut events: HashMap<Uuid, Event> = HashMap::with_capacity(sorted.len());
        for id in sorted {
            let event = tx.lock_event(id).await?.ok_or_else(|| not_found(id))?;
            events.insert(id, event);
        }

        let mut applied = Applied::default();
        for id in &request.ids {
            let event = events.get(id).ok_or_else(|| not_found(*id))?;
            let status = next_event_status(&request.action, event, actor, now).map_err(|e| member_failure(*id, e))?;
            let updated = tx.set_event_status(*id, status, now).await?;
            applied.items.push(BatchItem { id: *id, status: BatchStatus::Event(updated.status) });
        }

        Ok(applied)
    }

    async fn apply_to_users(
        &self,
        tx: &mut S::Tx,
        request: &BatchRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let mut applied = Applied::default();
        for id in &request.ids {
            let user = tx.find_user(*id).await?.ok_or_else(|| not_found(*id))?;
            let role = next_user_role(&request.action, user.id, user.role, actor).map_err(|e| member_failure(*id, e))?;
            let updated = tx.set_user_role(*id, role, now).await?;
            applied.items.push(BatchItem { id: *id, status: BatchStatus::User(updated.role) });
        }

        Ok(applied)
    }
}

/// Check in one member: exactly REGISTERED, inside the window of a published event
async fn check_in_member<T: StoreTransaction>(
    tx: &mut T,
    mut registration: Registration,
    event: &Event,
    actor: &Actor,
    now: DateTime<Utc>,
    config: &RegistrationConfig,
) -> Result<Registration> {
    AccessPolicy::require(actor, Permission::CheckIn, event)?;

    if state_machine::validate_transition(registration.status, RegistrationStatus::Attended)? == TransitionKind::AlreadyApplied {
        return Err(EventGateError::AlreadyCheckedIn);
    }
    state_machine::ensure_check_in_window(event, now, config.check_in_window())?;

    state_machine::apply(&mut registration, RegistrationStatus::Attended, now)?;
    tx.save_registration(&registration).await?;
    Ok(registration)
}

/// Promote one WAITLISTED member into a free slot
async fn promote_member<T: StoreTransaction>(
    tx: &mut T,
    registration: Registration,
    event: &Event,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Registration> {
    AccessPolicy::require(actor, Permission::ManageEvent, event)?;
    state_machine::validate_transition(registration.status, RegistrationStatus::Registered)?;
    state_machine::ensure_not_started(event, now)?;

    // Earlier members of the same batch may have taken the last slot
    let occupancy = tx.count_occupancy(event.id).await?;
    if event.remaining_capacity(occupancy) == Some(0) {
        return Err(EventGateError::EventAtCapacity { event_id: event.id });
    }

    promote_in_tx(tx, registration, now).await
}

/// Target status of an event batch member
fn next_event_status(action: &BatchAction, event: &Event, actor: &Actor, now: DateTime<Utc>) -> Result<EventStatus> {
    AccessPolicy::require(actor, Permission::ManageEvent, event)?;

    match action {
        BatchAction::PublishEvents => match event.status {
            EventStatus::Published => Err(EventGateError::InvalidInput(format!("Event {} is already published", event.title))),
            EventStatus::Completed => Err(EventGateError::InvalidInput(format!("Event {} is already completed", event.title))),
            _ => Ok(EventStatus::Published),
        },
        BatchAction::CancelEvents => match event.status {
            EventStatus::Cancelled => Err(EventGateError::InvalidInput(format!("Event {} is already cancelled", event.title))),
            _ => Ok(EventStatus::Cancelled),
        },
        BatchAction::ArchiveEvents => {
            if event.status == EventStatus::Completed {
                Err(EventGateError::InvalidInput(format!("Event {} is already completed", event.title)))
            } else if now <= event.event_date {
                Err(EventGateError::InvalidInput(format!("Event {} has not taken place yet", event.title)))
            } else {
                Ok(EventStatus::Completed)
            }
        }
        other => Err(EventGateError::InvalidInput(format!("{:?} does not apply to events", other))),
    }
}

/// Target role of a user batch member
fn next_user_role(action: &BatchAction, user_id: Uuid, current: UserRole, actor: &Actor) -> Result<UserRole> {
    if user_id == actor.user_id {
        return Err(EventGateError::Forbidden("Cannot change your own role".to_string()));
    }

    match action {
        BatchAction::PromoteUsers { role } if current == *role => {
            Err(EventGateError::InvalidInput(format!("User already has role {}", role)))
        }
        BatchAction::PromoteUsers { role } => Ok(*role),
        BatchAction::DemoteUsers if current == UserRole::Attendee => {
            Err(EventGateError::InvalidInput("User is already an attendee".to_string()))
        }
        BatchAction::DemoteUsers => Ok(UserRole::Attendee),
        other => Err(EventGateError::InvalidInput(format!("{:?} does not apply to users", other))),
    }
}
