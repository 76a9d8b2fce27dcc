use std::sync::Arc;

use tracing::warn;

use crate::{
    auth::{
        jwt::TokenService,
        memory::MemoryCredentialStore,
        provider::{IdentityProvider, OAuthProvider},
        repo::{CredentialStore, PgCredentialStore},
    },
    config::AppConfig,
    db,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub tokens: TokenService,
    pub provider: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store: Arc<dyn CredentialStore> = match config.database_url.as_deref() {
            Some(url) => {
                let pool = db::connect(url).await?;
                db::migrate(&pool).await?;
                Arc::new(PgCredentialStore::new(pool))
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory credential store, data is lost on restart");
                Arc::new(MemoryCredentialStore::new())
            }
        };

        let provider = config
            .google
            .clone()
            .map(|c| Arc::new(OAuthProvider::new(c)) as Arc<dyn IdentityProvider>);
        if provider.is_none() {
            warn!("GOOGLE_* not set; provider sign-in disabled");
        }

        Ok(Self::from_parts(Arc::new(config), store, provider))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn CredentialStore>,
        provider: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let tokens = TokenService::new(&config.jwt, config.roles.clone(), config.identifier);
        Self {
            config,
            store,
            tokens,
            provider,
        }
    }

    /// In-memory state with fixed test configuration and no provider.
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryCredentialStore::new()),
            None,
        )
    }
}
