//! Registration repository implementation

use sqlx::PgConnection;
use uuid::Uuid;
use crate::models::{NewRegistration, Registration, RegistrationStatus};
use crate::utils::errors::EventGateError;

const REGISTRATION_COLUMNS: &str = "id, event_id, attendee_id, status, waitlist_position, check_in_code, check_in_time, notes, registration_date, updated_at";

/// Name of the partial unique index over active registrations
pub const ACTIVE_ATTENDEE_INDEX: &str = "registrations_active_attendee_idx";

/// Name of the per-event check-in code constraint
pub const CHECK_IN_CODE_CONSTRAINT: &str = "registrations_event_check_in_code_key";

/// Queries over the `registrations` table, run on a caller-provided connection
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationRepository;

impl RegistrationRepository {
    /// Insert a new registration
    pub async fn insert(conn: &mut PgConnection, registration: &NewRegistration) -> Result<Registration, sqlx::Error> {
        sqlx::query_as::<_, Registration>(&format!(
            r#"
            INSERT INTO registrations (id, event_id, attendee_id, status, waitlist_position, check_in_code, notes, registration_date, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {}
            "#,
            REGISTRATION_COLUMNS
        ))
        .bind(registration.id())
        .bind(registration.event_id())
        .bind(registration.attendee_id())
        .bind(registration.status())
        .bind(registration.waitlist_position())
        .bind(registration.check_in_code())
        .bind(registration.notes())
        .bind(registration.registration_date())
        .fetch_one(conn)
        .await
    }

    /// Find registration by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Registration>, EventGateError> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations WHERE id = $1",
            REGISTRATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(registration)
    }

    /// Find the active registration of an attendee for an event
    pub async fn find_active(conn: &mut PgConnection, event_id: Uuid, attendee_id: Uuid) -> Result<Option<Registration>, EventGateError> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations WHERE event_id = $1 AND attendee_id = $2 AND status <> $3",
            REGISTRATION_COLUMNS
        ))
        .bind(event_id)
        .bind(attendee_id)
        .bind(RegistrationStatus::Cancelled)
        .fetch_optional(conn)
        .await?;

        Ok(registration)
    }

    /// Find registration by check-in code within an event
    pub async fn find_by_check_in_code(conn: &mut PgConnection, event_id: Uuid, code: &str) -> Result<Option<Registration>, EventGateError> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations WHERE event_id = $1 AND check_in_code = $2",
            REGISTRATION_COLUMNS
        ))
        .bind(event_id)
        .bind(code)
        .fetch_optional(conn)
        .await?;

        Ok(registration)
    }

    /// Get all registrations of an event
    pub async fn list_for_event(conn: &mut PgConnection, event_id: Uuid) -> Result<Vec<Registration>, EventGateError> {
        let registrations = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations WHERE event_id = $1 ORDER BY registration_date ASC, id ASC",
            REGISTRATION_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(conn)
        .await?;

        Ok(registrations)
    }

    /// Count registrations occupying a capacity slot
    pub async fn count_occupancy(conn: &mut PgConnection, event_id: Uuid) -> Result<i64, EventGateError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM registrations WHERE event_id = $1 AND status IN ($2, $3)"
        )
        .bind(event_id)
        .bind(RegistrationStatus::Registered)
        .bind(RegistrationStatus::Attended)
        .fetch_one(conn)
        .await?;

        Ok(count.0)
    }

    /// Highest waitlist position in use
    pub async fn max_waitlist_position(conn: &mut PgConnection, event_id: Uuid) -> Result<Option<i32>, EventGateError> {
        let max: (Option<i32>,) = sqlx::query_as(
            "SELECT MAX(waitlist_position) FROM registrations WHERE event_id = $1 AND status = $2"
        )
        .bind(event_id)
        .bind(RegistrationStatus::Waitlisted)
        .fetch_one(conn)
        .await?;

        Ok(max.0)
    }

    /// Head of the waitlist
    pub async fn first_waitlisted(conn: &mut PgConnection, event_id: Uuid) -> Result<Option<Registration>, EventGateError> {
        let registration = sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations WHERE event_id = $1 AND status = $2 ORDER BY waitlist_position ASC LIMIT 1",
            REGISTRATION_COLUMNS
        ))
        .bind(event_id)
        .bind(RegistrationStatus::Waitlisted)
        .fetch_optional(conn)
        .await?;

        Ok(registration)
    }

    /// Update the mutable lifecycle columns
    pub async fn save(conn: &mut PgConnection, registration: &Registration) -> Result<(), EventGateError> {
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET status = $2,
                waitlist_position = $3,
                check_in_time = $4,
                updated_at = $5
            WHERE id = $1
            "#
        )
        .bind(registration.id)
        .bind(registration.status)
        .bind(registration.waitlist_position)
        .bind(registration.check_in_time)
        .bind(registration.updated_at)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EventGateError::RegistrationNotFound { registration_id: registration.id });
        }

        Ok(())
    }

    /// Move every later waitlist entry up by one place
    pub async fn close_waitlist_gap(conn: &mut PgConnection, event_id: Uuid, vacated_position: i32) -> Result<u64, EventGateError> {
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET waitlist_position = waitlist_position - 1
            WHERE event_id = $1 AND status = $2 AND waitlist_position > $3
            "#
        )
        .bind(event_id)
        .bind(RegistrationStatus::Waitlisted)
        .bind(vacated_position)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
