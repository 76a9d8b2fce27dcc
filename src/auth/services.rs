use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, ProvisionRequest,
            PublicUser, RegisterRequest, UpdateProfileRequest,
        },
        identifier::{
            is_valid_email, is_valid_username, normalize_email, normalize_username, IdentifierKind,
        },
        jwt::TokenService,
        password::{self, MIN_PASSWORD_LEN},
        repo::CredentialStore,
        repo_types::{ConflictProbe, NewUser, PasswordUpdate, StoreError, UniqueField, User, UserUpdate},
        roles::Role,
    },
    config::AppConfig,
    error::{AuthError, Result},
    state::AppState,
};

/// Argon2 is CPU-bound; keep it off the async workers.
pub(crate) async fn hash_blocking(plain: String) -> Result<String> {
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(hash)
}

async fn verify_blocking(plain: String, hash: String) -> Result<bool> {
    let ok = tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(ok)
}

async fn burn_dummy_verify(plain: String) {
    let _ = tokio::task::spawn_blocking(move || password::verify_against_dummy(&plain)).await;
}

fn check_new_password(password: &str, confirm: &str) -> Result<()> {
    if password.is_empty() || confirm.is_empty() {
        return Err(AuthError::validation("All fields are required"));
    }
    if password != confirm {
        return Err(AuthError::validation("Passwords do not match"));
    }
    check_password_length(password)
}

fn check_password_length(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

/// Registration, login and the rest of an account's life.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    config: Arc<AppConfig>,
}

impl FromRef<AppState> for AccountService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.tokens.clone(), state.config.clone())
    }
}

/// Secondary identifier after canonicalization: `(phone, username)`.
type Identifier = (Option<String>, Option<String>);

impl AccountService {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenService, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            tokens,
            config,
        }
    }

    /// UI hint only; access is decided by the Authorizer.
    pub fn redirect_for(&self, role: Role) -> String {
        self.config.redirects.for_role(role).to_string()
    }

    fn email(&self, raw: &str) -> Result<String> {
        let email = normalize_email(raw);
        if !is_valid_email(&email) {
            return Err(AuthError::validation("Invalid email"));
        }
        Ok(email)
    }

    /// Canonicalizes whichever identifier this deployment uses and ignores the other.
    fn identifier(&self, phone: Option<&str>, username: Option<&str>, required: bool) -> Result<Identifier> {
        match self.config.identifier {
            IdentifierKind::Phone => match phone.filter(|p| !p.trim().is_empty()) {
                Some(raw) => {
                    let phone = self.config.phone.canonicalize(raw).ok_or_else(|| {
                        AuthError::validation(format!(
                            "Phone number must be in format: 07XXXXXXXX or +{}XXXXXXXXX",
                            self.config.phone.country_code()
                        ))
                    })?;
                    Ok((Some(phone), None))
                }
                None if required => Err(AuthError::validation("All fields are required")),
                None => Ok((None, None)),
            },
            IdentifierKind::Username => match username.filter(|u| !u.trim().is_empty()) {
                Some(raw) => {
                    let username = normalize_username(raw);
                    if !is_valid_username(&username) {
                        return Err(AuthError::validation(
                            "Username must be 3-30 characters of letters, digits, '.', '_' or '-'",
                        ));
                    }
                    Ok((None, Some(username)))
                }
                None if required => Err(AuthError::validation("All fields are required")),
                None => Ok((None, None)),
            },
        }
    }

    async fn ensure_unique(&self, probe: ConflictProbe<'_>) -> Result<()> {
        if let Some(field) = self.store.find_conflict(probe).await? {
            warn!(field = field.label(), "uniqueness pre-check failed");
            return Err(StoreError::UniqueViolation(field).into());
        }
        Ok(())
    }

    async fn active_user(&self, id: Uuid) -> Result<User> {
        match self.store.find_by_id(id).await? {
            Some(u) if u.is_active => Ok(u),
            _ => Err(AuthError::Unauthorized),
        }
    }

    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse> {
        let name = req.name.trim().to_string();
        if name.is_empty() || req.email.trim().is_empty() {
            return Err(AuthError::validation("All fields are required"));
        }
        let email = self.email(&req.email)?;
        let (phone, username) = self.identifier(req.phone.as_deref(), req.username.as_deref(), true)?;
        check_new_password(&req.password, &req.confirm_password)?;

        self.ensure_unique(ConflictProbe {
            email: Some(&email),
            phone: phone.as_deref(),
            username: username.as_deref(),
            exclude: None,
        })
        .await?;

        let password_hash = hash_blocking(req.password).await?;
        let user = self
            .store
            .insert(NewUser {
                name,
                email,
                phone,
                username,
                password_hash,
                role: self.config.roles.default_role(),
                provider_id: None,
                avatar_url: None,
            })
            .await?;

        let token = self.tokens.issue(&user).map_err(|e| {
            error!(error = %e, user_id = %user.id, "jwt sign failed");
            AuthError::Internal(e)
        })?;

        info!(user_id = %user.id, "user registered");
        Ok(AuthResponse {
            token,
            user: PublicUser::from(&user),
            redirect_to: None,
        })
    }

    #[instrument(skip(self, req))]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse> {
        let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let username = req.username.as_deref().map(str::trim).filter(|u| !u.is_empty());
        if req.password.is_empty() {
            return Err(AuthError::validation("Email and password are required"));
        }

        let found = match (email, username, self.config.identifier) {
            (Some(email), _, _) => self.store.find_by_email(&normalize_email(email)).await?,
            (None, Some(username), IdentifierKind::Username) => {
                self.store
                    .find_by_identifier(IdentifierKind::Username, &normalize_username(username))
                    .await?
            }
            _ => return Err(AuthError::validation("Email and password are required")),
        };

        let user = match found {
            Some(u) if u.is_active => u,
            _ => {
                burn_dummy_verify(req.password).await;
                warn!("login for unknown or inactive account");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_blocking(req.password, user.password_hash.clone()).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(&user).map_err(|e| {
            error!(error = %e, user_id = %user.id, "jwt sign failed");
            AuthError::Internal(e)
        })?;

        info!(user_id = %user.id, role = %user.role, "user logged in");
        Ok(AuthResponse {
            token,
            redirect_to: Some(self.redirect_for(user.role)),
            user: PublicUser::from(&user),
        })
    }

    pub async fn profile(&self, id: Uuid) -> Result<PublicUser> {
        let user = self.store.find_by_id(id).await?.ok_or(AuthError::NotFound)?;
        Ok(PublicUser::from(&user))
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(&self, id: Uuid, req: UpdateProfileRequest) -> Result<PublicUser> {
        let current = self.active_user(id).await?;

        let name = match req.name.as_deref().map(str::trim) {
            Some("") => return Err(AuthError::validation("Name must not be empty")),
            Some(n) => Some(n.to_string()),
            None => None,
        };
        let email = req.email.as_deref().map(|e| self.email(e)).transpose()?;
        let (phone, username) = self.identifier(req.phone.as_deref(), req.username.as_deref(), false)?;

        if name.is_none() && email.is_none() && phone.is_none() && username.is_none() {
            return Ok(PublicUser::from(&current));
        }

        self.ensure_unique(ConflictProbe {
            email: email.as_deref(),
            phone: phone.as_deref(),
            username: username.as_deref(),
            exclude: Some(id),
        })
        .await?;

        let updated = self
            .store
            .update(
                id,
                UserUpdate {
                    name,
                    email,
                    phone,
                    username,
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id = %id, "profile updated");
        Ok(PublicUser::from(&updated))
    }

    #[instrument(skip(self, req))]
    pub async fn change_password(&self, id: Uuid, req: ChangePasswordRequest) -> Result<()> {
        let user = self.active_user(id).await?;
        if !verify_blocking(req.current_password, user.password_hash).await? {
            warn!(user_id = %id, "password change with wrong current password");
            return Err(AuthError::InvalidCredentials);
        }
        check_new_password(&req.new_password, &req.confirm_password)?;

        let hash = hash_blocking(req.new_password).await?;
        self.store
            .update(
                id,
                UserUpdate {
                    password: PasswordUpdate::Replace(hash),
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id = %id, "password changed");
        Ok(())
    }

    /// Soft delete. Outstanding tokens stop working because the Authorizer
    /// re-checks the active flag.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: Uuid) -> Result<()> {
        self.store
            .update(
                id,
                UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %id, "account deactivated");
        Ok(())
    }

    /// Tokens are stateless; the client discards its copy.
    pub fn logout(&self) -> MessageResponse {
        MessageResponse::ok("Logout successful")
    }

    /// Creates an account with an explicit role unless the email is taken.
    /// Returns `None` when the account already existed.
    #[instrument(skip(self, req), fields(email = %req.email, role = %req.role))]
    pub async fn provision(&self, req: ProvisionRequest) -> Result<Option<PublicUser>> {
        if !self.config.roles.contains(req.role) {
            return Err(AuthError::validation(format!(
                "Role {} is not enabled for this deployment",
                req.role
            )));
        }
        let email = self.email(&req.email)?;
        if self.store.find_by_email(&email).await?.is_some() {
            info!("account already exists");
            return Ok(None);
        }
        let (phone, username) = self.identifier(req.phone.as_deref(), req.username.as_deref(), false)?;
        check_password_length(&req.password)?;

        let password_hash = hash_blocking(req.password).await?;
        let inserted = self
            .store
            .insert(NewUser {
                name: req.name.trim().to_string(),
                email,
                phone,
                username,
                password_hash,
                role: req.role,
                provider_id: None,
                avatar_url: None,
            })
            .await;

        match inserted {
            Ok(user) => {
                info!(user_id = %user.id, "account provisioned");
                Ok(Some(PublicUser::from(&user)))
            }
            Err(StoreError::UniqueViolation(UniqueField::Email)) => {
                info!("account created concurrently");
                Ok(None)
            }
            Err(StoreError::UniqueViolation(field)) => {
                warn!(field = field.label(), "provisioned account collides with another user");
                Err(StoreError::UniqueViolation(field).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
