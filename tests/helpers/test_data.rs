//! Seed data builders

use chrono::{DateTime, Duration, Utc};
use fake::faker::name::en::Name;
use fake::Fake;
use uuid::Uuid;
use eventgate::models::{CreateEventRequest, CreateUserRequest, EventStatus, UserRole};

/// User with a fake name and a unique address
pub fn user_request(role: UserRole) -> CreateUserRequest {
    let name: String = Name().fake();
    CreateUserRequest {
        email: format!("{}@example.com", Uuid::new_v4().simple()),
        name,
        role,
    }
}

/// Published event starting `starts_in` after `now`
pub fn event_request(organizer_id: Uuid, capacity: Option<i32>, now: DateTime<Utc>, starts_in: Duration) -> CreateEventRequest {
    CreateEventRequest {
        title: format!("Swing Social {}", &Uuid::new_v4().simple().to_string()[..6]),
        organizer_id,
        event_date: now + starts_in,
        registration_deadline: None,
        capacity,
        status: EventStatus::Published,
    }
}
