//! PostgreSQL store
//!
//! Each [`PgTransaction`] wraps one database transaction. Event rows are
//! locked with `SELECT ... FOR UPDATE`, which serializes every operation on
//! an event across all service instances sharing the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;
use crate::database::connection::DatabasePool;
use crate::database::repositories::{EventRepository, RegistrationRepository, UserRepository};
use crate::database::repositories::registration::{ACTIVE_ATTENDEE_INDEX, CHECK_IN_CODE_CONSTRAINT};
use crate::database::store::{RegistrationStore, StoreTransaction};
use crate::models::{CreateEventRequest, CreateUserRequest, Event, EventStatus, NewRegistration, Registration, User, UserRole};
use crate::utils::errors::{EventGateError, Result};

/// Domain error for a unique violation on insert, `None` for constraints the engine does not own
fn unique_conflict(constraint: Option<&str>, registration: &NewRegistration) -> Option<EventGateError> {
    match constraint? {
        ACTIVE_ATTENDEE_INDEX => Some(EventGateError::AlreadyRegistered),
        CHECK_IN_CODE_CONSTRAINT => Some(EventGateError::CheckInCodeConflict {
            event_id: registration.event_id(),
            code: registration.check_in_code().to_string(),
        }),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DatabasePool,
}

impl PgStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Create an event outside of any engine operation
    pub async fn create_event(&self, request: CreateEventRequest) -> Result<Event> {
        let mut conn = self.pool.acquire().await?;
        EventRepository::create(&mut conn, request).await
    }

    /// Create a user outside of any engine operation
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        let mut conn = self.pool.acquire().await?;
        UserRepository::create(&mut conn, request).await
    }
}

#[async_trait]
impl RegistrationStore for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction { tx })
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn lock_event(&mut self, event_id: Uuid) -> Result<Option<Event>> {
        EventRepository::lock_for_update(&mut self.tx, event_id).await
    }

    async fn find_event(&mut self, event_id: Uuid) -> Result<Option<Event>> {
        EventRepository::find_by_id(&mut self.tx, event_id).await
    }

    async fn list_upcoming_events(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        EventRepository::get_upcoming_events(&mut self.tx, now).await
    }

    async fn set_event_status(&mut self, event_id: Uuid, status: EventStatus, now: DateTime<Utc>) -> Result<Event> {
        EventRepository::update_status(&mut self.tx, event_id, status, now).await
    }

    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>> {
        UserRepository::find_by_id(&mut self.tx, user_id).await
    }

    async fn set_user_role(&mut self, user_id: Uuid, role: UserRole, now: DateTime<Utc>) -> Result<User> {
        UserRepository::update_role(&mut self.tx, user_id, role, now).await
    }

    async fn find_registration(&mut self, registration_id: Uuid) -> Result<Option<Registration>> {
        RegistrationRepository::find_by_id(&mut self.tx, registration_id).await
    }

    async fn find_active_registration(&mut self, event_id: Uuid, attendee_id: Uuid) -> Result<Option<Registration>> {
        RegistrationRepository::find_active(&mut self.tx, event_id, attendee_id).await
    }

    async fn find_by_check_in_code(&mut self, event_id: Uuid, code: &str) -> Result<Option<Registration>> {
        RegistrationRepository::find_by_check_in_code(&mut self.tx, event_id, code).await
    }

    async fn list_registrations(&mut self, event_id: Uuid) -> Result<Vec<Registration>> {
        RegistrationRepository::list_for_event(&mut self.tx, event_id).await
    }

    async fn count_occupancy(&mut self, event_id: Uuid) -> Result<i64> {
        RegistrationRepository::count_occupancy(&mut self.tx, event_id).await
    }

    async fn max_waitlist_position(&mut self, event_id: Uuid) -> Result<Option<i32>> {
        RegistrationRepository::max_waitlist_position(&mut self.tx, event_id).await
    }

    async fn first_waitlisted(&mut self, event_id: Uuid) -> Result<Option<Registration>> {
        RegistrationRepository::first_waitlisted(&mut self.tx, event_id).await
    }

    async fn insert_registration(&mut self, registration: &NewRegistration) -> Result<Registration> {
        // A failed statement aborts the whole transaction, so the insert runs
        // under a savepoint that can be rolled back on a uniqueness violation.
        let mut savepoint = Connection::begin(&mut *self.tx).await?;

        match RegistrationRepository::insert(&mut savepoint, registration).await {
            Ok(inserted) => {
                savepoint.commit().await?;
                Ok(inserted)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let constraint = db_err.constraint().map(str::to_owned);
                savepoint.rollback().await?;
                debug!(event_id = %registration.event_id(), constraint = ?constraint, "Registration insert hit a unique constraint");

                match unique_conflict(constraint.as_deref(), registration) {
                    Some(conflict) => Err(conflict),
                    None => Err(sqlx::Error::Database(db_err).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_registration(&mut self, registration: &Registration) -> Result<()> {
        RegistrationRepository::save(&mut self.tx, registration).await
    }

    async fn close_waitlist_gap(&mut self, event_id: Uuid, vacated_position: i32) -> Result<u64> {
        RegistrationRepository::close_waitlist_gap(&mut self.tx, event_id, vacated_position).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
