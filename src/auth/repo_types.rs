use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::roles::Role;

/// User record as the rest of the crate sees it.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,                  // lower-cased
    pub phone: Option<String>,          // canonical international format
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,          // Argon2 PHC string, not exposed in JSON
    pub role: Role,
    pub is_active: bool,
    pub provider_id: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Raw `users` row; `role` is still text here.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub provider_id: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let role = r
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Unavailable(anyhow::anyhow!("user {}: {e}", r.id)))?;
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            username: r.username,
            password_hash: r.password_hash,
            role,
            is_active: r.is_active,
            provider_id: r.provider_id,
            avatar_url: r.avatar_url,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Insert payload. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub provider_id: Option<String>,
    pub avatar_url: Option<String>,
}

/// Whether an update carries a new credential. The store writes the hash
/// only for `Replace` and never hashes anything itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PasswordUpdate {
    #[default]
    Unchanged,
    Replace(String),
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub password: PasswordUpdate,
    pub provider_id: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: Option<bool>,
}

/// Columns carrying a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Phone,
    Username,
    ProviderId,
}

impl UniqueField {
    pub fn label(self) -> &'static str {
        match self {
            UniqueField::Email => "email",
            UniqueField::Phone => "phone",
            UniqueField::Username => "username",
            UniqueField::ProviderId => "provider identity",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on {}", .0.label())]
    UniqueViolation(UniqueField),
    #[error("user not found")]
    NotFound,
    #[error("credential store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                let field = match db.constraint().unwrap_or_default() {
                    c if c.contains("phone") => Some(UniqueField::Phone),
                    c if c.contains("username") => Some(UniqueField::Username),
                    c if c.contains("provider") => Some(UniqueField::ProviderId),
                    c if c.contains("email") => Some(UniqueField::Email),
                    _ => None,
                };
                if let Some(field) = field {
                    return StoreError::UniqueViolation(field);
                }
            }
        }
        if let sqlx::Error::RowNotFound = e {
            return StoreError::NotFound;
        }
        StoreError::Unavailable(e.into())
    }
}

/// Values to test for collisions, optionally ignoring one user (self-exclusion on update).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictProbe<'a> {
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub username: Option<&'a str>,
    pub exclude: Option<Uuid>,
}
