use anyhow::Context;
use serde::Deserialize;

use crate::auth::{
    identifier::{IdentifierKind, PhoneRule},
    provider::ProviderConfig,
    roles::{Role, RoleSet},
};

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Where a client should land after signing in, keyed by role privilege.
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectConfig {
    pub admin: String,
    pub user: String,
}

impl RedirectConfig {
    pub fn for_role(&self, role: Role) -> &str {
        if role.is_privileged() {
            &self.admin
        } else {
            &self.user
        }
    }
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            admin: "/admin/dashboard".into(),
            user: "/user/dashboard".into(),
        }
    }
}

/// Token lifetime in minutes; 24 hours when unset.
fn ttl_minutes(raw: Option<String>) -> anyhow::Result<i64> {
    let ttl = match raw {
        Some(v) => v.trim().parse::<i64>().context("parse JWT_TTL_MINUTES")?,
        None => 60 * 24,
    };
    if ttl <= 0 {
        anyhow::bail!("JWT_TTL_MINUTES must be positive");
    }
    Ok(ttl)
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub roles: RoleSet,
    pub identifier: IdentifierKind,
    pub phone: PhoneRule,
    pub redirects: RedirectConfig,
    pub google: Option<ProviderConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "homehaven".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "homehaven-users".into()),
            ttl_minutes: ttl_minutes(std::env::var("JWT_TTL_MINUTES").ok())?,
        };
        if jwt.secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let roles = match std::env::var("AUTH_ROLES") {
            Ok(v) => RoleSet::parse(&v).context("parse AUTH_ROLES")?,
            Err(_) => RoleSet::default(),
        };
        let identifier = match std::env::var("AUTH_IDENTIFIER") {
            Ok(v) => v.parse::<IdentifierKind>().context("parse AUTH_IDENTIFIER")?,
            Err(_) => IdentifierKind::Phone,
        };
        let phone = match std::env::var("PHONE_COUNTRY_CODE") {
            Ok(code) => PhoneRule::new(&code).context("parse PHONE_COUNTRY_CODE")?,
            Err(_) => PhoneRule::default(),
        };

        let defaults = RedirectConfig::default();
        let redirects = RedirectConfig {
            admin: std::env::var("AUTH_ADMIN_REDIRECT").unwrap_or(defaults.admin),
            user: std::env::var("AUTH_USER_REDIRECT").unwrap_or(defaults.user),
        };

        let google = match (
            std::env::var("GOOGLE_CLIENT_ID"),
            std::env::var("GOOGLE_CLIENT_SECRET"),
            std::env::var("GOOGLE_CALLBACK_URL"),
        ) {
            (Ok(client_id), Ok(client_secret), Ok(callback_url)) => {
                Some(ProviderConfig::google(client_id, client_secret, callback_url))
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt,
            roles,
            identifier,
            phone,
            redirects,
            google,
        })
    }

    /// Configuration with fixed values, used by tests and local tooling.
    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60,
            },
            roles: RoleSet::default(),
            identifier: IdentifierKind::Phone,
            phone: PhoneRule::default(),
            redirects: RedirectConfig::default(),
            google: None,
        }
    }
}
