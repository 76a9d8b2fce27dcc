use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, PublicUser},
        identifier::{is_valid_email, normalize_email},
        jwt::TokenService,
        password::throwaway_password,
        provider::ProviderProfile,
        repo::CredentialStore,
        repo_types::{NewUser, StoreError, User, UserUpdate},
        services::hash_blocking,
    },
    config::AppConfig,
    error::{AuthError, Result},
    state::AppState,
};

/// Attempts before a sign-in that keeps losing uniqueness races gives up.
const MAX_ATTEMPTS: usize = 3;

/// Maps a provider identity onto a local account:
/// provider id match, then email match (linking), then creation.
#[derive(Clone)]
pub struct IdentityLinker {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    config: Arc<AppConfig>,
}

impl FromRef<AppState> for IdentityLinker {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.tokens.clone(), state.config.clone())
    }
}

fn admit(user: User) -> Result<User> {
    if user.is_active {
        Ok(user)
    } else {
        warn!(user_id = %user.id, "provider sign-in for deactivated account");
        Err(AuthError::Unauthorized)
    }
}

impl IdentityLinker {
    pub fn new(store: Arc<dyn CredentialStore>, tokens: TokenService, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            tokens,
            config,
        }
    }

    /// Resolves the profile to a persisted user. A uniqueness violation on
    /// link or insert means a concurrent sign-in got there first, so the
    /// lookup is retried instead of surfacing an error.
    #[instrument(skip(self, profile), fields(provider_id = %profile.provider_id))]
    pub async fn resolve(&self, profile: &ProviderProfile) -> Result<User> {
        if !profile.email_verified {
            warn!("provider email not verified");
            return Err(AuthError::Unauthorized);
        }
        let email = normalize_email(&profile.email);
        if !is_valid_email(&email) {
            return Err(AuthError::validation("Provider returned an invalid email"));
        }

        let mut throwaway_hash: Option<String> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(user) = self.store.find_by_provider_id(&profile.provider_id).await? {
                debug!(user_id = %user.id, "matched by provider id");
                return admit(user);
            }

            if let Some(existing) = self.store.find_by_email(&email).await? {
                let existing = admit(existing)?;
                if existing
                    .provider_id
                    .as_deref()
                    .is_some_and(|linked| linked != profile.provider_id)
                {
                    warn!(user_id = %existing.id, "account already linked to another provider identity");
                    return Err(AuthError::Conflict(
                        "Account is already linked to a different external identity".into(),
                    ));
                }

                let linked = self
                    .store
                    .update(
                        existing.id,
                        UserUpdate {
                            provider_id: Some(profile.provider_id.clone()),
                            avatar_url: profile.avatar_url.clone(),
                            ..Default::default()
                        },
                    )
                    .await;
                match linked {
                    Ok(user) => {
                        info!(user_id = %user.id, "provider identity linked to existing account");
                        return Ok(user);
                    }
                    Err(StoreError::UniqueViolation(field)) => {
                        debug!(attempt, field = field.label(), "link raced; retrying");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let password_hash = match &throwaway_hash {
                Some(h) => h.clone(),
                None => {
                    let h = hash_blocking(throwaway_password()).await?;
                    throwaway_hash = Some(h.clone());
                    h
                }
            };
            let name = match profile.name.trim() {
                "" => email.split('@').next().unwrap_or_default().to_string(),
                n => n.to_string(),
            };

            let inserted = self
                .store
                .insert(NewUser {
                    name,
                    email: email.clone(),
                    phone: None,
                    username: None,
                    password_hash,
                    role: self.config.roles.default_role(),
                    provider_id: Some(profile.provider_id.clone()),
                    avatar_url: profile.avatar_url.clone(),
                })
                .await;
            match inserted {
                Ok(user) => {
                    info!(user_id = %user.id, "account created from provider identity");
                    return Ok(user);
                }
                Err(StoreError::UniqueViolation(field)) => {
                    debug!(attempt, field = field.label(), "first sign-in raced; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AuthError::Internal(anyhow::anyhow!(
            "provider identity unresolved after {MAX_ATTEMPTS} attempts"
        )))
    }

    /// Resolves the profile, then issues a session. Nothing is returned
    /// unless the user is persisted and the token signed.
    pub async fn sign_in(&self, profile: &ProviderProfile) -> Result<AuthResponse> {
        let user = self.resolve(profile).await?;
        let token = self.tokens.issue(&user)?;
        Ok(AuthResponse {
            token,
            redirect_to: Some(self.config.redirects.for_role(user.role).to_string()),
            user: PublicUser::from(&user),
        })
    }
}
