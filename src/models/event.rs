//! Event model

use std::fmt;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
    Completed,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Draft => "DRAFT",
            EventStatus::Published => "PUBLISHED",
            EventStatus::Cancelled => "CANCELLED",
            EventStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub organizer_id: Uuid,
    pub event_date: DateTime<Utc>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_published(&self) -> bool {
        self.status == EventStatus::Published
    }

    /// True once the event instant is behind `now`
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.event_date
    }

    pub fn is_organizer(&self, user_id: Uuid) -> bool {
        self.organizer_id == user_id
    }

    /// Free slots left for the given occupancy, `None` when capacity is unlimited
    pub fn remaining_capacity(&self, occupancy: i64) -> Option<i64> {
        self.capacity.map(|capacity| (i64::from(capacity) - occupancy).max(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub organizer_id: Uuid,
    pub event_date: DateTime<Utc>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub capacity: Option<i32>,
    pub status: EventStatus,
}

impl CreateEventRequest {
    /// Reject capacities that are not positive
    pub fn validate(&self) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::EventGateError::InvalidInput("Event title is required".to_string()));
        }
        if let Some(capacity) = self.capacity {
            if capacity <= 0 {
                return Err(crate::EventGateError::InvalidInput(
                    format!("Event capacity must be positive, got {}", capacity)
                ));
            }
        }
        Ok(())
    }

    /// Build the stored event for this request
    pub fn into_event(self, now: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            title: self.title,
            organizer_id: self.organizer_id,
            event_date: self.event_date,
            registration_deadline: self.registration_deadline,
            capacity: self.capacity,
            status: self.status,
            created_at: now,
            updated_at: now,
        }
    }
}
