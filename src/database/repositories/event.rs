//! Event repository implementation

use sqlx::PgConnection;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::models::event::{Event, EventStatus, CreateEventRequest};
use crate::utils::errors::EventGateError;

const EVENT_COLUMNS: &str = "id, title, organizer_id, event_date, registration_deadline, capacity, status, created_at, updated_at";

/// Queries over the `events` table, run on a caller-provided connection
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRepository;

impl EventRepository {
    /// Create a new event
    pub async fn create(conn: &mut PgConnection, request: CreateEventRequest) -> Result<Event, EventGateError> {
        request.validate()?;
        let event = request.into_event(Utc::now());

        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (id, title, organizer_id, event_date, registration_deadline, capacity, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(event.id)
        .bind(&event.title)
        .bind(event.organizer_id)
        .bind(event.event_date)
        .bind(event.registration_deadline)
        .bind(event.capacity)
        .bind(event.status)
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(conn)
        .await?;

        Ok(event)
    }

    /// Find event by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Event>, EventGateError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE id = $1",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(event)
    }

    /// Find event by ID and hold a row lock until the transaction ends
    pub async fn lock_for_update(conn: &mut PgConnection, id: Uuid) -> Result<Option<Event>, EventGateError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE id = $1 FOR UPDATE",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(event)
    }

    /// Get upcoming published events
    pub async fn get_upcoming_events(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<Vec<Event>, EventGateError> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE event_date > $1 AND status = $2 ORDER BY event_date ASC",
            EVENT_COLUMNS
        ))
        .bind(now)
        .bind(EventStatus::Published)
        .fetch_all(conn)
        .await?;

        Ok(events)
    }

    /// Update event status
    pub async fn update_status(conn: &mut PgConnection, id: Uuid, status: EventStatus, now: DateTime<Utc>) -> Result<Event, EventGateError> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "UPDATE events SET status = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            EVENT_COLUMNS
        ))
        .bind(id)
        .bind(status)
        .bind(now)
        .fetch_optional(conn)
        .await?;

        event.ok_or(EventGateError::EventNotFound { event_id: id })
    }
}
