//! Per-event reports: check-in statistics, registration listing and the
//! invariant audit run by the maintenance binary.

use std::collections::HashMap;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use crate::database::{RegistrationStore, StoreTransaction};
use crate::models::{Event, Registration, RegistrationStatus};
use crate::services::{AccessPolicy, Actor, Permission};
use crate::utils::errors::{EventGateError, Result};
use crate::utils::helpers::percentage;
use crate::utils::logging::log_audit_violation;
use super::RegistrationEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInStats {
    pub event_id: Uuid,
    pub total: i64,
    pub registered: i64,
    pub attended: i64,
    pub waitlisted: i64,
    pub cancelled: i64,
    /// Percentage of admitted attendees that checked in
    pub attendance_rate: i64,
}

impl CheckInStats {
    pub fn from_registrations(event_id: Uuid, registrations: &[Registration]) -> Self {
        let count = |status: RegistrationStatus| registrations.iter().filter(|r| r.status == status).count() as i64;
        let registered = count(RegistrationStatus::Registered);
        let attended = count(RegistrationStatus::Attended);

        Self {
            event_id,
            total: registrations.len() as i64,
            registered,
            attended,
            waitlisted: count(RegistrationStatus::Waitlisted),
            cancelled: count(RegistrationStatus::Cancelled),
            attendance_rate: percentage(attended, registered + attended),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub event_id: Uuid,
    pub capacity: Option<i32>,
    pub occupancy: i64,
    pub violations: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every registration invariant of one event.
///
/// `registrations` must be ordered by registration date.
pub fn audit(event: &Event, registrations: &[Registration]) -> AuditReport {
    let mut violations = Vec::new();

    for registration in registrations {
        let waitlisted = registration.status == RegistrationStatus::Waitlisted;
        match registration.waitlist_position {
            Some(position) if !waitlisted => violations.push(format!(
                "registration {} is {} but holds waitlist position {}",
                registration.id, registration.status, position
            )),
            Some(position) if position < 1 => violations.push(format!(
                "registration {} has non-positive waitlist position {}",
                registration.id, position
            )),
            None if waitlisted => violations.push(format!(
                "registration {} is WAITLISTED without a position",
                registration.id
            )),
            _ => {}
        }

        let attended = registration.status == RegistrationStatus::Attended;
        if attended != registration.check_in_time.is_some() {
            violations.push(format!(
                "registration {} is {} with check-in time {:?}",
                registration.id, registration.status, registration.check_in_time
            ));
        }
    }

    let occupancy = registrations.iter().filter(|r| r.status.occupies_slot()).count() as i64;
    if let Some(capacity) = event.capacity {
        if occupancy > i64::from(capacity) {
            violations.push(format!("occupancy {} exceeds capacity {}", occupancy, capacity));
        }
    }

    let mut active_per_attendee: HashMap<Uuid, usize> = HashMap::new();
    for registration in registrations.iter().filter(|r| r.is_active()) {
        *active_per_attendee.entry(registration.attendee_id).or_default() += 1;
    }
    let mut duplicated: Vec<_> = active_per_attendee.into_iter().filter(|(_, count)| *count > 1).collect();
    duplicated.sort();
    for (attendee_id, count) in duplicated {
        violations.push(format!("attendee {} holds {} active registrations", attendee_id, count));
    }

    // Registration-date order is entry order, so a stable sort keeps ties in FIFO order
    let mut waitlist: Vec<&Registration> = registrations
        .iter()
        .filter(|r| r.status == RegistrationStatus::Waitlisted && r.waitlist_position.is_some())
        .collect();
    waitlist.sort_by_key(|r| r.waitlist_position);

    let positions: Vec<i32> = waitlist.iter().filter_map(|r| r.waitlist_position).collect();
    let expected: Vec<i32> = (1..=positions.len() as i32).collect();
    if positions != expected {
        violations.push(format!("waitlist positions {:?} are not contiguous from 1", positions));
    }

    if let Some(pair) = waitlist.windows(2).find(|pair| pair[0].registration_date > pair[1].registration_date) {
        violations.push(format!(
            "waitlist order breaks FIFO: {} (position {:?}) registered after {} (position {:?})",
            pair[0].id, pair[0].waitlist_position, pair[1].id, pair[1].waitlist_position
        ));
    }

    if let Some(free) = event.remaining_capacity(occupancy) {
        if free > 0 && !waitlist.is_empty() {
            violations.push(format!(
                "{} registrations wait while {} slots are free",
                waitlist.len(), free
            ));
        }
    }

    AuditReport {
        event_id: event.id,
        capacity: event.capacity,
        occupancy,
        violations,
    }
}

impl<S: RegistrationStore> RegistrationEngine<S> {
    /// Registration counts of an event for its organizer or an admin
    pub async fn check_in_stats(&self, event_id: Uuid, actor: &Actor) -> Result<CheckInStats> {
        let registrations = self.event_registrations(event_id, actor).await?;
        Ok(CheckInStats::from_registrations(event_id, &registrations))
    }

    /// All registrations of an event ordered by registration date
    pub async fn event_registrations(&self, event_id: Uuid, actor: &Actor) -> Result<Vec<Registration>> {
        let result = self.event_registrations_inner(event_id, actor).await;
        self.observe("event_registrations", event_id, result)
    }

    async fn event_registrations_inner(&self, event_id: Uuid, actor: &Actor) -> Result<Vec<Registration>> {
        let mut tx = self.store().begin().await?;
        let event = tx
            .find_event(event_id)
            .await?
            .ok_or(EventGateError::EventNotFound { event_id })?;
        AccessPolicy::require(actor, Permission::ViewEventRegistrations, &event)?;

        let registrations = tx.list_registrations(event_id).await?;
        tx.rollback().await?;
        Ok(registrations)
    }

    /// Audit one event under its lock
    pub async fn audit_event(&self, event_id: Uuid) -> Result<AuditReport> {
        let mut tx = self.store().begin().await?;
        let event = tx
            .lock_event(event_id)
            .await?
            .ok_or(EventGateError::EventNotFound { event_id })?;
        let registrations = tx.list_registrations(event_id).await?;
        tx.rollback().await?;

        let report = audit(&event, &registrations);
        debug!(event_id = %event_id, occupancy = report.occupancy, violations = report.violations.len(), "Event audited");
        for violation in &report.violations {
            log_audit_violation(event_id, violation);
        }
        Ok(report)
    }

    /// Audit every published event that has not started yet
    pub async fn audit_upcoming(&self) -> Result<Vec<AuditReport>> {
        let now = self.now();
        let events = {
            let mut tx = self.store().begin().await?;
            let events = tx.list_upcoming_events(now).await?;
            tx.rollback().await?;
            events
        };

        try_join_all(events.iter().map(|event| self.audit_event(event.id))).await
    }
}
