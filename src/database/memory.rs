//! In-process store
//!
//! Transactions are serialized on one async mutex. Each transaction works on
//! a copy of the state that replaces the shared state on commit, so a
//! dropped or rolled-back transaction leaves no trace. Only suitable when a
//! single process owns the data (embedding, tests); multi-instance
//! deployments use the PostgreSQL store.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use crate::database::store::{RegistrationStore, StoreTransaction};
use crate::models::{
    CreateEventRequest, CreateUserRequest, Event, EventStatus, NewRegistration, Registration,
    RegistrationStatus, User, UserRole,
};
use crate::utils::errors::{EventGateError, Result};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    events: HashMap<Uuid, Event>,
    users: HashMap<Uuid, User>,
    registrations: HashMap<Uuid, Registration>,
}

impl MemoryState {
    fn registrations_of(&self, event_id: Uuid) -> impl Iterator<Item = &Registration> {
        self.registrations.values().filter(move |r| r.event_id == event_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_event(&self, request: CreateEventRequest) -> Result<Event> {
        request.validate()?;
        let event = request.into_event(Utc::now());
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&event.organizer_id) {
            return Err(EventGateError::UserNotFound { user_id: event.organizer_id });
        }
        state.events.insert(event.id, event.clone());
        Ok(event)
    }

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        let user = request.into_user(Utc::now());
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(EventGateError::InvalidInput(format!("Email {} is already in use", user.email)));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    /// Snapshot of an event's registrations, for assertions outside the engine
    pub async fn registrations_for(&self, event_id: Uuid) -> Vec<Registration> {
        let state = self.state.lock().await;
        let mut registrations: Vec<Registration> = state.registrations_of(event_id).cloned().collect();
        registrations.sort_by_key(|r| (r.registration_date, r.id));
        registrations
    }

    pub async fn registration(&self, registration_id: Uuid) -> Option<Registration> {
        self.state.lock().await.registrations.get(&registration_id).cloned()
    }

    pub async fn event(&self, event_id: Uuid) -> Option<Event> {
        self.state.lock().await.events.get(&event_id).cloned()
    }

    pub async fn user(&self, user_id: Uuid) -> Option<User> {
        self.state.lock().await.users.get(&user_id).cloned()
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction { guard, working })
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_event(&mut self, event_id: Uuid) -> Result<Option<Event>> {
        Ok(self.working.events.get(&event_id).cloned())
    }

    async fn find_event(&mut self, event_id: Uuid) -> Result<Option<Event>> {
        Ok(self.working.events.get(&event_id).cloned())
    }

    async fn list_upcoming_events(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .working
            .events
            .values()
            .filter(|e| e.event_date > now && e.status == EventStatus::Published)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.event_date, e.id));
        Ok(events)
    }

    async fn set_event_status(&mut self, event_id: Uuid, status: EventStatus, now: DateTime<Utc>) -> Result<Event> {
        let event = self
            .working
            .events
            .get_mut(&event_id)
            .ok_or(EventGateError::EventNotFound { event_id })?;
        event.status = status;
        event.updated_at = now;
        Ok(event.clone())
    }

    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    async fn set_user_role(&mut self, user_id: Uuid, role: UserRole, now: DateTime<Utc>) -> Result<User> {
        let user = self
            .working
            .users
            .get_mut(&user_id)
            .ok_or(EventGateError::UserNotFound { user_id })?;
        user.role = role;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn find_registration(&mut self, registration_id: Uuid) -> Result<Option<Registration>> {
        Ok(self.working.registrations.get(&registration_id).cloned())
    }

    async fn find_active_registration(&mut self, event_id: Uuid, attendee_id: Uuid) -> Result<Option<Registration>> {
        Ok(self
            .working
            .registrations_of(event_id)
            .find(|r| r.attendee_id == attendee_id && r.is_active())
            .cloned())
    }

    async fn find_by_check_in_code(&mut self, event_id: Uuid, code: &str) -> Result<Option<Registration>> {
        Ok(self
            .working
            .registrations_of(event_id)
            .find(|r| r.check_in_code == code)
            .cloned())
    }

    async fn list_registrations(&mut self, event_id: Uuid) -> Result<Vec<Registration>> {
        let mut registrations: Vec<Registration> = self.working.registrations_of(event_id).cloned().collect();
        registrations.sort_by_key(|r| (r.registration_date, r.id));
        Ok(registrations)
    }

    async fn count_occupancy(&mut self, event_id: Uuid) -> Result<i64> {
        Ok(self
            .working
            .registrations_of(event_id)
            .filter(|r| r.status.occupies_slot())
            .count() as i64)
    }

    async fn max_waitlist_position(&mut self, event_id: Uuid) -> Result<Option<i32>> {
        Ok(self
            .working
            .registrations_of(event_id)
            .filter(|r| r.status == RegistrationStatus::Waitlisted)
            .filter_map(|r| r.waitlist_position)
            .max())
    }

    async fn first_waitlisted(&mut self, event_id: Uuid) -> Result<Option<Registration>> {
        Ok(self
            .working
            .registrations_of(event_id)
            .filter(|r| r.status == RegistrationStatus::Waitlisted)
            .min_by_key(|r| r.waitlist_position)
            .cloned())
    }

    async fn insert_registration(&mut self, registration: &NewRegistration) -> Result<Registration> {
        let event_id = registration.event_id();
        if self.working.registrations_of(event_id).any(|r| r.check_in_code == registration.check_in_code()) {
            return Err(EventGateError::CheckInCodeConflict {
                event_id,
                code: registration.check_in_code().to_string(),
            });
        }
        if self
            .working
            .registrations_of(event_id)
            .any(|r| r.attendee_id == registration.attendee_id() && r.is_active())
        {
            return Err(EventGateError::AlreadyRegistered);
        }

        let stored = registration.clone().into_registration();
        self.working.registrations.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn save_registration(&mut self, registration: &Registration) -> Result<()> {
        match self.working.registrations.get_mut(&registration.id) {
            Some(existing) => {
                existing.status = registration.status;
                existing.waitlist_position = registration.waitlist_position;
                existing.check_in_time = registration.check_in_time;
                existing.updated_at = registration.updated_at;
                Ok(())
            }
            None => Err(EventGateError::RegistrationNotFound { registration_id: registration.id }),
        }
    }

    async fn close_waitlist_gap(&mut self, event_id: Uuid, vacated_position: i32) -> Result<u64> {
        let mut moved = 0;
        for registration in self.working.registrations.values_mut() {
            if registration.event_id != event_id || registration.status != RegistrationStatus::Waitlisted {
                continue;
            }
            if let Some(position) = registration.waitlist_position {
                if position > vacated_position {
                    registration.waitlist_position = Some(position - 1);
                    moved += 1;
                }
            }
        }
        Ok(moved)
    }

    async fn commit(mut self) -> Result<()> {
        *self.guard = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::models::Placement;

    async fn seeded() -> (MemoryStore, Event, User) {
        let store = MemoryStore::new();
        let organizer = store
            .create_user(CreateUserRequest {
                name: "Olga".to_string(),
                email: "olga@example.com".to_string(),
                role: UserRole::Organizer,
            })
            .await
            .unwrap();
        let event = store
            .create_event(CreateEventRequest {
                title: "Balboa Weekend".to_string(),
                organizer_id: organizer.id,
                event_date: Utc::now() + Duration::days(10),
                registration_deadline: None,
                capacity: Some(1),
                status: EventStatus::Published,
            })
            .await
            .unwrap();
        (store, event, organizer)
    }

    fn new_registration(event_id: Uuid, code: &str) -> NewRegistration {
        NewRegistration::from_placement(event_id, Uuid::new_v4(), Placement::Admitted, code.to_string(), None, Utc::now())
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let (store, event, _) = seeded().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_registration(&new_registration(event.id, "AAAAAA")).await.unwrap();
        }
        assert!(store.registrations_for(event.id).await.is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.insert_registration(&new_registration(event.id, "AAAAAA")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.registrations_for(event.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_check_in_code_is_a_conflict() {
        let (store, event, _) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        tx.insert_registration(&new_registration(event.id, "SAME01")).await.unwrap();
        let err = tx.insert_registration(&new_registration(event.id, "SAME01")).await.unwrap_err();
        assert!(matches!(err, EventGateError::CheckInCodeConflict { .. }));

        // The transaction stays usable after the conflict
        tx.insert_registration(&new_registration(event.id, "OTHER1")).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.registrations_for(event.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_close_waitlist_gap_only_moves_later_positions() {
        let (store, event, _) = seeded().await;
        let mut tx = store.begin().await.unwrap();
        for (position, code) in [(1, "WAIT01"), (2, "WAIT02"), (3, "WAIT03")] {
            let registration = NewRegistration::from_placement(
                event.id, Uuid::new_v4(), Placement::Waitlisted { position }, code.to_string(), None, Utc::now(),
            );
            tx.insert_registration(&registration).await.unwrap();
        }

        let moved = tx.close_waitlist_gap(event.id, 2).await.unwrap();
        assert_eq!(moved, 1);
        assert_eq!(tx.max_waitlist_position(event.id).await.unwrap(), Some(2));
        assert_eq!(tx.first_waitlisted(event.id).await.unwrap().unwrap().check_in_code, "WAIT01");
    }
}
