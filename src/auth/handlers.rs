use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{delete, get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        authorizer::Principal,
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, PublicUser,
            RegisterRequest, UpdateProfileRequest,
        },
        extractors::{AdminOnly, Authorized},
        linker::IdentityLinker,
        provider::generate_csrf_state,
        services::AccountService,
    },
    error::{AuthError, Result},
    state::AppState,
};

const OAUTH_STATE_COOKIE: &str = "oauth_state";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/profile", get(get_profile).put(update_profile))
        .route("/auth/password", put(change_password))
        .route("/auth/account", delete(delete_account))
        .route("/auth/logout", post(logout))
}

pub fn provider_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/google", get(google_redirect))
        .route("/auth/google/callback", get(google_callback))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/users/:id", get(admin_get_user))
}

#[instrument(skip(accounts, payload))]
pub async fn register(
    State(accounts): State<AccountService>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let resp = accounts.register(payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[instrument(skip(accounts, payload))]
pub async fn login(
    State(accounts): State<AccountService>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    Ok(Json(accounts.login(payload).await?))
}

#[instrument(skip(accounts, principal), fields(user_id = %principal.user_id))]
pub async fn get_profile(
    State(accounts): State<AccountService>,
    principal: Principal,
) -> Result<Json<PublicUser>> {
    Ok(Json(accounts.profile(principal.user_id).await?))
}

#[instrument(skip(accounts, principal, payload), fields(user_id = %principal.user_id))]
pub async fn update_profile(
    State(accounts): State<AccountService>,
    principal: Principal,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>> {
    Ok(Json(accounts.update_profile(principal.user_id, payload).await?))
}

#[instrument(skip(accounts, principal, payload), fields(user_id = %principal.user_id))]
pub async fn change_password(
    State(accounts): State<AccountService>,
    principal: Principal,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>> {
    accounts.change_password(principal.user_id, payload).await?;
    Ok(Json(MessageResponse::ok("Password updated")))
}

#[instrument(skip(accounts, principal), fields(user_id = %principal.user_id))]
pub async fn delete_account(
    State(accounts): State<AccountService>,
    principal: Principal,
) -> Result<Json<MessageResponse>> {
    accounts.deactivate(principal.user_id).await?;
    Ok(Json(MessageResponse::ok("Account deactivated successfully")))
}

pub async fn logout(
    State(accounts): State<AccountService>,
    _principal: Principal,
) -> Json<MessageResponse> {
    Json(accounts.logout())
}

#[instrument(skip(accounts, admin), fields(admin_id = %admin.principal.user_id))]
pub async fn admin_get_user(
    State(accounts): State<AccountService>,
    admin: Authorized<AdminOnly>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>> {
    Ok(Json(accounts.profile(id).await?))
}

#[instrument(skip(state, jar))]
pub async fn google_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let provider = state.provider.as_ref().ok_or(AuthError::NotFound)?;
    let csrf = generate_csrf_state();
    let url = provider.authorization_url(&csrf)?;

    let cookie = Cookie::build((OAUTH_STATE_COOKIE, csrf))
        .path("/auth")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(10));
    Ok((jar.add(cookie), Redirect::to(&url)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[instrument(skip(state, jar, params))]
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let provider = state.provider.as_ref().ok_or(AuthError::NotFound)?;

    if let Some(error) = params.error.as_deref() {
        warn!(provider = provider.name(), error, "provider returned an error");
        return Err(AuthError::Unauthorized);
    }
    let expected = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let csrf_ok = matches!(
        (expected.as_deref(), params.state.as_deref()),
        (Some(expected), Some(got)) if expected == got
    );
    if !csrf_ok {
        warn!(provider = provider.name(), "oauth state mismatch");
        return Err(AuthError::Unauthorized);
    }
    let code = params.code.as_deref().ok_or(AuthError::Unauthorized)?;

    let profile = provider.exchange_code(code).await.map_err(|e| {
        warn!(provider = provider.name(), error = %e, "code exchange failed");
        AuthError::Unauthorized
    })?;

    let resp = IdentityLinker::from_ref(&state).sign_in(&profile).await?;
    info!(user_id = %resp.user.id, provider = provider.name(), "provider sign-in");

    let jar = jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path("/auth"));
    Ok((jar, Json(resp)))
}
