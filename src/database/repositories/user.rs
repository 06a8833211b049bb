//! User repository implementation

use sqlx::PgConnection;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::models::user::{User, UserRole, CreateUserRequest};
use crate::utils::errors::EventGateError;

const USER_COLUMNS: &str = "id, name, email, role, created_at, updated_at";

/// Queries over the `users` table, run on a caller-provided connection
#[derive(Debug, Clone, Copy, Default)]
pub struct UserRepository;

impl UserRepository {
    /// Create a new user
    pub async fn create(conn: &mut PgConnection, request: CreateUserRequest) -> Result<User, EventGateError> {
        let user = request.into_user(Utc::now());

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(conn)
        .await?;

        Ok(user)
    }

    /// Find user by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<User>, EventGateError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(user)
    }

    /// Change the role of a user
    pub async fn update_role(conn: &mut PgConnection, id: Uuid, role: UserRole, now: DateTime<Utc>) -> Result<User, EventGateError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(role)
        .bind(now)
        .fetch_optional(conn)
        .await?;

        user.ok_or(EventGateError::UserNotFound { user_id: id })
    }
}
