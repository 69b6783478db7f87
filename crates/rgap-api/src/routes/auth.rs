//! Account and session endpoints.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use rgap_db::{UserPublic, UserRepo};
use serde::Deserialize;

use crate::AppState;
use crate::auth::{
    CurrentUser, authenticate, check_signup, end_session, hash_password, removal_cookie,
    start_session,
};
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Create an account and sign it in.
pub(crate) async fn register(
    state: &AppState,
    request: &SignupRequest,
) -> Result<UserPublic, ApiError> {
    let email = check_signup(&request.email, &request.password).map_err(ApiError::Validation)?;
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let password_hash = hash_password(&request.password)?;

    let user = state
        .user_repo
        .create_user(&email, name, &password_hash)
        .await?;
    tracing::info!(user = %user.id, "Account created");
    Ok(user.into())
}

async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, CookieJar, Json<UserPublic>), ApiError> {
    let Json(request) = payload?;
    let user = register(&state, &request).await?;
    let cookie = start_session(&state, &user, &headers).await?;
    Ok((StatusCode::CREATED, jar.add(cookie), Json(user)))
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<UserPublic>), ApiError> {
    let Json(request) = payload?;
    let user = authenticate(&state, &request.email, &request.password).await?;
    let cookie = start_session(&state, &user, &headers).await?;
    Ok((jar.add(cookie), Json(user)))
}

async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    end_session(&state, &jar).await?;
    Ok((jar.remove(removal_cookie()), StatusCode::NO_CONTENT))
}

async fn me(user: CurrentUser) -> Json<UserPublic> {
    Json(user.0)
}
