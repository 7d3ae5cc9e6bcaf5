//! Persisted user model and its public projection

use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Role names as stored in `users.role`.
pub mod role {
    pub const USER: &str = "USER";
    pub const EDITOR: &str = "EDITOR";
    pub const ADMIN: &str = "ADMIN";
    pub const SUPERADMIN: &str = "SUPERADMIN";
    pub const PARTNER: &str = "PARTNER";
}

/// Full user row. `password_hash` is NULL for accounts created via newsletter
/// or partner sign-up; those cannot authenticate with a password.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub role: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

/// User shape returned to clients. Never includes the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub email_verified: bool,
    pub is_admin: bool,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            email_verified: user.email_verified,
            is_admin: user.is_admin,
        }
    }
}

pub const USER_COLUMNS: &str =
    "id, name, email, password_hash, email_verified, role, is_admin, is_super_admin";

/// Fetch a user by email. Lookup is case-sensitive, matching storage.
pub async fn find_user_by_email(
    pool: &sqlx::PgPool,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn find_user_by_id(
    pool: &sqlx::PgPool,
    id: Uuid,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}
