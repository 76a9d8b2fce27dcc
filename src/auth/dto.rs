use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{repo_types::User, roles::Role};

/// Request body for user registration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub password: String,
    #[serde(alias = "confirmPassword")]
    pub confirm_password: String,
}

/// Request body for login. Username is only honoured by username deployments.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: String,
}

/// Partial profile update; absent fields stay as they are.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangePasswordRequest {
    #[serde(alias = "currentPassword")]
    pub current_password: String,
    #[serde(alias = "newPassword")]
    pub new_password: String,
    #[serde(alias = "confirmPassword")]
    pub confirm_password: String,
}

/// Account creation with an explicit role, used for seeding operators.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
    pub role: Role,
}

/// Response returned after register, login or provider sign-in.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// False for provider-created accounts that still lack a phone or username.
    pub profile_complete: bool,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            phone: u.phone.clone(),
            username: u.username.clone(),
            role: u.role,
            avatar_url: u.avatar_url.clone(),
            profile_complete: u.phone.is_some() || u.username.is_some(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn public_user_never_contains_password_hash() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: "Jane".into(),
            email: "jane@example.com".into(),
            phone: None,
            username: None,
            password_hash: "$argon2id$v=19$secret".into(),
            role: Role::User,
            is_active: true,
            provider_id: Some("google-1".into()),
            avatar_url: Some("https://img/1.png".into()),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(json.contains("jane@example.com"));
        assert!(json.contains("\"profile_complete\":false"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("google-1"));

        let raw = serde_json::to_string(&user).unwrap();
        assert!(!raw.contains("argon2"));
    }

    #[test]
    fn register_request_accepts_camel_case_confirmation() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"name":"J","email":"j@x.io","phone":"0712345678","password":"p","confirmPassword":"p"}"#,
        )
        .unwrap();
        assert_eq!(req.confirm_password, "p");
        assert_eq!(req.username, None);
    }
}
