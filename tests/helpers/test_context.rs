//! In-memory test context

use std::sync::Arc;
use chrono::{DateTime, Duration, DurationRound, Utc};
use eventgate::config::RegistrationConfig;
use eventgate::models::{CreateEventRequest, Event, User, UserRole};
use eventgate::services::{Actor, Clock, FixedClock, RecordingNotifier};
use eventgate::{MemoryStore, RegistrationEngine};

use super::test_data::{event_request, user_request};

/// Engine over a fresh in-memory store, with an organizer and an admin seeded
pub struct TestContext {
    pub store: MemoryStore,
    pub engine: RegistrationEngine<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub organizer: User,
    pub admin: User,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(RegistrationConfig::default()).await
    }

    pub async fn with_config(config: RegistrationConfig) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let now = Utc::now()
            .duration_trunc(Duration::seconds(1))
            .expect("Failed to truncate timestamp");
        let clock = Arc::new(FixedClock::new(now));
        let notifier = Arc::new(RecordingNotifier::new());
        let store = MemoryStore::new();

        let organizer = store
            .create_user(user_request(UserRole::Organizer))
            .await
            .expect("Failed to create organizer");
        let admin = store
            .create_user(user_request(UserRole::Admin))
            .await
            .expect("Failed to create admin");

        let engine = RegistrationEngine::new(store.clone(), config)
            .expect("Failed to build engine")
            .with_clock(clock.clone())
            .with_notifier(notifier.clone());

        Self { store, engine, clock, notifier, organizer, admin }
    }

    pub fn organizer_actor(&self) -> Actor {
        Actor::organizer(self.organizer.id)
    }

    pub fn admin_actor(&self) -> Actor {
        Actor::admin(self.admin.id)
    }

    /// Published event of the seeded organizer, three days from now
    pub async fn event(&self, capacity: Option<i32>) -> Event {
        self.event_starting_in(capacity, Duration::days(3)).await
    }

    pub async fn event_starting_in(&self, capacity: Option<i32>, starts_in: Duration) -> Event {
        self.create_event(event_request(self.organizer.id, capacity, self.clock_now(), starts_in)).await
    }

    pub async fn create_event(&self, request: CreateEventRequest) -> Event {
        self.store.create_event(request).await.expect("Failed to create event")
    }

    pub async fn attendee(&self) -> User {
        self.store
            .create_user(user_request(UserRole::Attendee))
            .await
            .expect("Failed to create attendee")
    }

    pub async fn attendees(&self, count: usize) -> Vec<User> {
        let mut users = Vec::with_capacity(count);
        for _ in 0..count {
            users.push(self.attendee().await);
        }
        users
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Move the clock relative to the event start
    pub fn at_event_offset(&self, event: &Event, offset: Duration) {
        self.clock.set(event.event_date + offset);
    }
}
