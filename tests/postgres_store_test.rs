//! Engine scenarios against PostgreSQL
//!
//! Skipped unless `TEST_DATABASE_URL` or `EVENTGATE_DOCKER_TESTS` is set.

mod helpers;

use std::sync::Arc;
use assert_matches::assert_matches;
use chrono::{Duration, DurationRound, Utc};
use futures::future::join_all;
use helpers::*;
use serial_test::serial;
use eventgate::config::RegistrationConfig;
use eventgate::engine::{BatchAction, BatchRequest};
use eventgate::models::{Event, NewRegistration, Placement, Registration, RegistrationStatus, User, UserRole};
use eventgate::services::{Actor, Clock, FixedClock};
use eventgate::{CheckInOutcome, EventGateError, PgStore, RegistrationEngine, RegistrationStore, StoreTransaction};

struct PgContext {
    database: TestDatabase,
    engine: RegistrationEngine<PgStore>,
    clock: Arc<FixedClock>,
    organizer: User,
}

impl PgContext {
    async fn new() -> Option<Self> {
        let database = TestDatabase::connect().await.expect("Failed to prepare test database")?;
        let now = Utc::now().duration_trunc(Duration::seconds(1)).expect("Failed to truncate timestamp");
        let clock = Arc::new(FixedClock::new(now));
        let engine = RegistrationEngine::new(database.store.clone(), RegistrationConfig::default())
            .expect("Failed to build engine")
            .with_clock(clock.clone());
        let organizer = database
            .store
            .create_user(user_request(UserRole::Organizer))
            .await
            .expect("Failed to create organizer");

        Some(Self { database, engine, clock, organizer })
    }

    async fn event(&self, capacity: Option<i32>) -> Event {
        self.database
            .store
            .create_event(event_request(self.organizer.id, capacity, self.clock.now(), Duration::days(3)))
            .await
            .expect("Failed to create event")
    }

    async fn attendees(&self, count: usize) -> Vec<User> {
        let mut users = Vec::with_capacity(count);
        for _ in 0..count {
            users.push(
                self.database
                    .store
                    .create_user(user_request(UserRole::Attendee))
                    .await
                    .expect("Failed to create attendee"),
            );
        }
        users
    }

    async fn registration(&self, id: uuid::Uuid) -> Registration {
        let mut tx = self.database.store.begin().await.expect("Failed to begin");
        tx.find_registration(id).await.expect("Query failed").expect("Registration missing")
    }
}

macro_rules! pg_context {
    () => {
        match PgContext::new().await {
            Some(ctx) => ctx,
            None => {
                eprintln!("Skipping: set TEST_DATABASE_URL or EVENTGATE_DOCKER_TESTS to run PostgreSQL tests");
                return;
            }
        }
    };
}

#[tokio::test]
#[serial]
async fn test_pg_waitlist_promotion_scenario() {
    let ctx = pg_context!();
    let event = ctx.event(Some(2)).await;
    let users = ctx.attendees(4).await;

    let mut registrations = Vec::new();
    for user in &users {
        registrations.push(ctx.engine.admit(event.id, user.id).await.unwrap());
    }
    assert_eq!(registrations[3].waitlist_position, Some(2));

    let cancellation = ctx.engine.cancel(registrations[0].id, &Actor::attendee(users[0].id)).await.unwrap();
    assert_eq!(cancellation.promoted.map(|r| r.id), Some(registrations[2].id));

    let d = ctx.registration(registrations[3].id).await;
    assert_eq!((d.status, d.waitlist_position), (RegistrationStatus::Waitlisted, Some(1)));
    assert!(ctx.engine.audit_event(event.id).await.unwrap().is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_pg_concurrent_admissions_respect_capacity() {
    let ctx = pg_context!();
    let event = ctx.event(Some(3)).await;
    let users = ctx.attendees(12).await;

    let tasks = users.iter().map(|user| {
        let engine = ctx.engine.clone();
        let (event_id, user_id) = (event.id, user.id);
        tokio::spawn(async move { engine.admit(event_id, user_id).await })
    });
    for result in join_all(tasks).await {
        result.expect("task panicked").expect("admission failed");
    }

    let report = ctx.engine.audit_event(event.id).await.unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
    assert_eq!(report.occupancy, 3);
    assert_eq!(ctx.database.count_records("registrations").await.unwrap(), 12);
}

#[tokio::test]
#[serial]
async fn test_pg_unique_constraints_are_mapped() {
    let ctx = pg_context!();
    let event = ctx.event(None).await;
    let users = ctx.attendees(2).await;
    let now = Utc::now();

    let mut tx = ctx.database.store.begin().await.unwrap();
    let first = NewRegistration::from_placement(event.id, users[0].id, Placement::Admitted, "SAME01".to_string(), None, now);
    tx.insert_registration(&first).await.unwrap();

    let clash = NewRegistration::from_placement(event.id, users[1].id, Placement::Admitted, "SAME01".to_string(), None, now);
    assert_matches!(tx.insert_registration(&clash).await, Err(EventGateError::CheckInCodeConflict { .. }));

    let duplicate = NewRegistration::from_placement(event.id, users[0].id, Placement::Admitted, "OTHER1".to_string(), None, now);
    assert_matches!(tx.insert_registration(&duplicate).await, Err(EventGateError::AlreadyRegistered));

    // The savepoint keeps the transaction usable
    tx.insert_registration(&clash.with_check_in_code("OTHER2".to_string())).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(ctx.database.count_records("registrations").await.unwrap(), 2);
}

#[tokio::test]
#[serial]
async fn test_pg_check_in_and_batch_rollback() {
    let ctx = pg_context!();
    let event = ctx.event(Some(10)).await;
    let users = ctx.attendees(3).await;
    let organizer = Actor::organizer(ctx.organizer.id);

    let mut registrations = Vec::new();
    for user in &users {
        registrations.push(ctx.engine.admit(event.id, user.id).await.unwrap());
    }

    ctx.clock.set(event.event_date - Duration::hours(2));
    let outcome = ctx.engine.check_in(event.id, &registrations[1].check_in_code, &organizer).await.unwrap();
    assert_matches!(outcome, CheckInOutcome::Success { .. });
    let again = ctx.engine.check_in(event.id, &registrations[1].check_in_code, &organizer).await.unwrap();
    assert_matches!(again, CheckInOutcome::AlreadyCheckedIn { .. });

    let request = BatchRequest::new(BatchAction::CancelRegistrations, registrations.iter().map(|r| r.id).collect());
    assert_matches!(
        ctx.engine.apply_batch(request, &organizer).await,
        Err(EventGateError::BatchPreconditionFailed { id, .. }) if id == registrations[1].id
    );
    assert_eq!(ctx.registration(registrations[0].id).await.status, RegistrationStatus::Registered);
    assert_eq!(ctx.registration(registrations[2].id).await.status, RegistrationStatus::Registered);
}
