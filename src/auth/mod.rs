use crate::state::AppState;
use axum::Router;

pub mod authorizer;
pub mod claims;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod identifier;
pub mod jwt;
pub mod linker;
pub mod memory;
pub mod password;
pub mod provider;
pub mod repo;
pub mod repo_types;
pub mod roles;
pub mod services;

/// Auth and admin routes. Provider routes are mounted only when a
/// provider is configured.
pub fn router(with_provider: bool) -> Router<AppState> {
    let router = Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::admin_routes());
    if with_provider {
        router.merge(handlers::provider_routes())
    } else {
        router
    }
}
