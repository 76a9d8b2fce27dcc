use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::{jwt::TokenService, repo::CredentialStore, roles::Role},
    error::{AuthError, Result},
    state::AppState,
};

/// The authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub email: String,
}

/// Turns a bearer token into a [`Principal`] and gates on roles.
#[derive(Clone)]
pub struct Authorizer {
    tokens: TokenService,
    store: Arc<dyn CredentialStore>,
}

impl FromRef<AppState> for Authorizer {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.tokens.clone(), state.store.clone())
    }
}

impl Authorizer {
    pub fn new(tokens: TokenService, store: Arc<dyn CredentialStore>) -> Self {
        Self { tokens, store }
    }

    /// Verifies the token, then reloads the account so that tokens of
    /// deactivated or deleted users stop working before they expire.
    /// The role comes from the stored record, not the token.
    pub async fn authenticate(&self, token: &str) -> Result<Principal> {
        let claims = self.tokens.verify(token)?;

        let user = match self.store.find_by_id(claims.sub).await? {
            Some(u) if u.is_active => u,
            Some(_) => {
                warn!(user_id = %claims.sub, "token for deactivated account");
                return Err(AuthError::Unauthorized);
            }
            None => {
                warn!(user_id = %claims.sub, "token for unknown account");
                return Err(AuthError::Unauthorized);
            }
        };

        debug!(user_id = %user.id, role = %user.role, "request authenticated");
        Ok(Principal {
            user_id: user.id,
            role: user.role,
            email: user.email,
        })
    }

    pub fn require_role(principal: &Principal, allowed: &[Role]) -> Result<()> {
        if allowed.contains(&principal.role) {
            Ok(())
        } else {
            warn!(user_id = %principal.user_id, role = %principal.role, "role not allowed");
            Err(AuthError::Forbidden)
        }
    }
}
