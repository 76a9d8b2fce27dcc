//! External identity provider (OAuth 2.0 authorization-code flow).
//!
//! Provider settings are passed in at construction; nothing here is global.

use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub callback_url: String,
    pub scopes: Vec<String>,
}

impl ProviderConfig {
    pub fn google(client_id: String, client_secret: String, callback_url: String) -> Self {
        Self {
            name: "google".into(),
            client_id,
            client_secret,
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".into(),
            callback_url,
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
        }
    }
}

/// Identity asserted by the provider after a successful sign-in.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub email: String,
    pub email_verified: bool,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    fn authorization_url(&self, csrf_state: &str) -> anyhow::Result<String>;

    /// Trades the callback `code` for the signed-in user's profile.
    async fn exchange_code(&self, code: &str) -> anyhow::Result<ProviderProfile>;
}

/// Random value bound to the browser via cookie and echoed back by the provider.
pub fn generate_csrf_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OpenID Connect userinfo document.
#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl UserInfo {
    fn into_profile(self) -> anyhow::Result<ProviderProfile> {
        let email = self
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("provider returned no email for {}", self.sub))?;
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        Ok(ProviderProfile {
            provider_id: self.sub,
            email,
            email_verified: self.email_verified,
            name,
            avatar_url: self.picture,
        })
    }
}

pub struct OAuthProvider {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OAuthProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for OAuthProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn authorization_url(&self, csrf_state: &str) -> anyhow::Result<String> {
        let mut url = Url::parse(&self.config.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.callback_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", csrf_state);
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> anyhow::Result<ProviderProfile> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(provider = %self.config.name, status = %resp.status(), "token exchange rejected");
            anyhow::bail!("token exchange failed with {}", resp.status());
        }
        let token: TokenResponse = resp.json().await?;

        let info: UserInfo = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(provider = %self.config.name, subject = %info.sub, "provider profile fetched");
        info.into_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OAuthProvider {
        OAuthProvider::new(ProviderConfig::google(
            "client-123".into(),
            "secret".into(),
            "http://localhost:8080/auth/google/callback".into(),
        ))
    }

    #[test]
    fn authorization_url_carries_client_and_state() {
        let url = provider().authorization_url("xyz").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(url.starts_with("https://accounts.google.com/"));
        assert!(pairs.contains(&("client_id".into(), "client-123".into())));
        assert!(pairs.contains(&("state".into(), "xyz".into())));
        assert!(pairs.contains(&("scope".into(), "openid profile email".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://localhost:8080/auth/google/callback".into()
        )));
        assert!(!url.contains("secret"));
    }

    #[test]
    fn userinfo_maps_to_profile() {
        let info: UserInfo = serde_json::from_str(
            r#"{"sub":"1089","email":"jane@gmail.com","email_verified":true,"picture":"https://p/1"}"#,
        )
        .unwrap();
        let profile = info.into_profile().unwrap();
        assert_eq!(profile.provider_id, "1089");
        assert_eq!(profile.name, "jane");
        assert!(profile.email_verified);
        assert_eq!(profile.avatar_url.as_deref(), Some("https://p/1"));
    }

    #[test]
    fn userinfo_without_email_is_rejected() {
        let info: UserInfo = serde_json::from_str(r#"{"sub":"1089"}"#).unwrap();
        assert!(info.into_profile().is_err());
    }

    #[test]
    fn csrf_states_differ() {
        assert_ne!(generate_csrf_state(), generate_csrf_state());
    }
}
