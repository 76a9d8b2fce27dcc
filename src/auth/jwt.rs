use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::{claims::Claims, identifier::IdentifierKind, repo_types::User, roles::RoleSet},
    config::JwtConfig,
    error::AuthError,
    state::AppState,
};

/// Signs and verifies session tokens. Built once at startup; rotating the
/// secret invalidates every outstanding token.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
    roles: RoleSet,
    identifier: IdentifierKind,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl TokenService {
    pub fn new(cfg: &JwtConfig, roles: RoleSet, identifier: IdentifierKind) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
            roles,
            identifier,
        }
    }

    pub fn issue(&self, user: &User) -> anyhow::Result<String> {
        self.issue_at(user, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user: &User, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let username = match self.identifier {
            IdentifierKind::Username => user.username.clone(),
            IdentifierKind::Phone => None,
        };
        let claims = Claims {
            sub: user.id,
            role: user.role,
            email: Some(user.email.clone()),
            username,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user.id, role = %user.role, "jwt signed");
        Ok(token)
    }

    /// Every failure collapses into `InvalidToken`; the cause is only logged.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            AuthError::InvalidToken
        })?;
        if !self.roles.contains(data.claims.role) {
            debug!(role = %data.claims.role, "jwt carries a disabled role");
            return Err(AuthError::InvalidToken);
        }
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::Role;
    use uuid::Uuid;

    fn make_keys(secret: &str) -> TokenService {
        let cfg = JwtConfig {
            secret: secret.into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
        };
        TokenService::new(&cfg, RoleSet::default(), IdentifierKind::Phone)
    }

    fn user(role: Role) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            name: "Jane".into(),
            email: "jane@example.com".into(),
            phone: Some("+254712345678".into()),
            username: Some("jane".into()),
            password_hash: "$argon2id$fake".into(),
            role,
            is_active: true,
            provider_id: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issue_and_verify() {
        let keys = make_keys("dev-secret");
        let u = user(Role::Admin);
        let token = keys.issue(&u).expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.email.as_deref(), Some("jane@example.com"));
        assert_eq!(claims.username, None);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn username_deployments_embed_username() {
        let cfg = JwtConfig {
            secret: "dev-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 5,
        };
        let keys = TokenService::new(&cfg, RoleSet::default(), IdentifierKind::Username);
        let token = keys.issue(&user(Role::User)).unwrap();
        assert_eq!(keys.verify(&token).unwrap().username.as_deref(), Some("jane"));
    }

    #[test]
    fn expired_token_is_invalid() {
        let keys = make_keys("dev-secret");
        let issued = OffsetDateTime::now_utc() - TimeDuration::minutes(10);
        let token = keys.issue_at(&user(Role::User), issued).unwrap();
        assert!(matches!(keys.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let keys = make_keys("dev-secret");
        let token = keys.issue(&user(Role::User)).unwrap();
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        let admin = keys.issue(&user(Role::SuperAdmin)).unwrap();
        parts[1] = admin.split('.').nth(1).unwrap().to_string();
        let forged = parts.join(".");
        assert!(matches!(keys.verify(&forged), Err(AuthError::InvalidToken)));
        assert!(matches!(keys.verify("not.a.jwt"), Err(AuthError::InvalidToken)));
        assert!(matches!(keys.verify(""), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn verify_rejects_other_secret() {
        let good = make_keys("same-secret");
        let bad = make_keys("other-secret");
        let token = good.issue(&user(Role::User)).unwrap();
        assert!(matches!(bad.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn verify_rejects_roles_outside_the_deployment() {
        let cfg = JwtConfig {
            secret: "dev-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 5,
        };
        let everything = TokenService::new(&cfg, RoleSet::default(), IdentifierKind::Phone);
        let narrow = TokenService::new(
            &cfg,
            RoleSet::parse("user,admin").unwrap(),
            IdentifierKind::Phone,
        );
        let token = everything.issue(&user(Role::SuperAdmin)).unwrap();
        assert!(matches!(narrow.verify(&token), Err(AuthError::InvalidToken)));
    }
}
