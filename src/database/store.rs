//! Persistence interface of the registration engine
//!
//! Every engine operation runs inside one [`StoreTransaction`]. The
//! transaction is the unit of atomicity: nothing it writes is visible until
//! [`StoreTransaction::commit`], and dropping it without committing discards
//! every write.
//!
//! ## Per-event serialization
//!
//! [`StoreTransaction::lock_event`] must hold an exclusive lock on the event
//! until the transaction ends, so that admissions, cancellations, promotions
//! and check-ins against the same event observe each other's writes in order.
//! The PostgreSQL store uses `SELECT ... FOR UPDATE`; the in-memory store
//! serializes whole transactions.
//!
//! ## Uniqueness
//!
//! [`StoreTransaction::insert_registration`] fails with
//! `EventGateError::CheckInCodeConflict` when the check-in code is already used
//! within the event, and with `EventGateError::AlreadyRegistered` when the
//! attendee already holds an active registration. A failed insert leaves the
//! transaction usable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::models::{Event, EventStatus, NewRegistration, Registration, User, UserRole};
use crate::utils::errors::Result;

/// Factory of transactions
#[async_trait]
pub trait RegistrationStore: Send + Sync + 'static {
    type Tx: StoreTransaction;

    /// Begin a new transaction
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Reads and writes inside one atomic unit
#[async_trait]
pub trait StoreTransaction: Send {
    // ── Events ──────────────────────────────────────────────────────────────

    /// Read an event and lock it for the rest of the transaction
    async fn lock_event(&mut self, event_id: Uuid) -> Result<Option<Event>>;

    /// Read an event without locking
    async fn find_event(&mut self, event_id: Uuid) -> Result<Option<Event>>;

    /// Published events that start after `now`, soonest first
    async fn list_upcoming_events(&mut self, now: DateTime<Utc>) -> Result<Vec<Event>>;

    async fn set_event_status(&mut self, event_id: Uuid, status: EventStatus, now: DateTime<Utc>) -> Result<Event>;

    // ── Users ───────────────────────────────────────────────────────────────

    async fn find_user(&mut self, user_id: Uuid) -> Result<Option<User>>;

    async fn set_user_role(&mut self, user_id: Uuid, role: UserRole, now: DateTime<Utc>) -> Result<User>;

    // ── Registrations ───────────────────────────────────────────────────────

    async fn find_registration(&mut self, registration_id: Uuid) -> Result<Option<Registration>>;

    /// The REGISTERED, WAITLISTED or ATTENDED registration of an attendee, if any
    async fn find_active_registration(&mut self, event_id: Uuid, attendee_id: Uuid) -> Result<Option<Registration>>;

    async fn find_by_check_in_code(&mut self, event_id: Uuid, code: &str) -> Result<Option<Registration>>;

    /// All registrations of an event ordered by registration date
    async fn list_registrations(&mut self, event_id: Uuid) -> Result<Vec<Registration>>;

    /// Count of REGISTERED and ATTENDED registrations
    async fn count_occupancy(&mut self, event_id: Uuid) -> Result<i64>;

    async fn max_waitlist_position(&mut self, event_id: Uuid) -> Result<Option<i32>>;

    /// WAITLISTED registration with the smallest position
    async fn first_waitlisted(&mut self, event_id: Uuid) -> Result<Option<Registration>>;

    async fn insert_registration(&mut self, registration: &NewRegistration) -> Result<Registration>;

    /// Persist status, waitlist position, check-in time and update time
    async fn save_registration(&mut self, registration: &Registration) -> Result<()>;

    /// Shift every WAITLISTED position above `vacated_position` down by one.
    ///
    /// Returns the number of registrations moved.
    async fn close_waitlist_gap(&mut self, event_id: Uuid, vacated_position: i32) -> Result<u64>;

    // ── Lifecycle ───────────────────────────────────────────────────────────

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
