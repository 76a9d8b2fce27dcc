//! Provisions operator accounts from a JSON file (`SEED_FILE`, default
//! `seed.json`) holding an array of `{name, email, phone?, username?,
//! password, role}` objects. Existing emails are skipped.

use anyhow::Context;
use axum::extract::FromRef;
use homehaven_auth::{
    auth::{dto::ProvisionRequest, services::AccountService},
    init_tracing,
    state::AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let path = std::env::var("SEED_FILE").unwrap_or_else(|_| "seed.json".into());
    let raw = std::fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
    let accounts: Vec<ProvisionRequest> =
        serde_json::from_str(&raw).with_context(|| format!("parse {path}"))?;

    let state = AppState::init().await?;
    let service = AccountService::from_ref(&state);

    let (mut created, mut skipped) = (0usize, 0usize);
    for req in accounts {
        let email = req.email.clone();
        match service
            .provision(req)
            .await
            .with_context(|| format!("provision {email}"))?
        {
            Some(user) => {
                info!(user_id = %user.id, email = %user.email, role = %user.role, "account created");
                created += 1;
            }
            None => {
                info!(email = %email, "account exists, skipped");
                skipped += 1;
            }
        }
    }

    info!(created, skipped, "seeding finished");
    Ok(())
}
