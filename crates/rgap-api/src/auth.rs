//! Cookie session authentication.
//!
//! Passwords are hashed with argon2. A session is a random 32-byte token
//! handed to the browser in the `rgap_session` cookie; only its SHA-256 is
//! stored.

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use rand::RngCore;
use rgap_config::AuthConfig;
use rgap_core::{FieldError, UserId};
use rgap_db::{DbError, UserPublic, UserRepo};
use sha2::{Digest, Sha256};

use crate::AppState;
use crate::error::ApiError;

/// Cookie name for the session token.
pub const SESSION_COOKIE: &str = "rgap_session";

pub const MIN_PASSWORD_LEN: usize = 8;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

// ============================================================================
// Credentials
// ============================================================================

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            false
        }
    }
}

/// Lowercased, trimmed email if it looks like `local@domain.tld`.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let valid = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    valid.then_some(email)
}

/// Validate sign-up input, returning the normalized email.
pub fn check_signup(email: &str, password: &str) -> Result<String, Vec<FieldError>> {
    let mut errors = Vec::new();
    let normalized = normalize_email(email);
    if normalized.is_none() {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    match normalized {
        Some(email) if errors.is_empty() => Ok(email),
        _ => Err(errors),
    }
}

/// Look up the account and check its password.
pub async fn authenticate(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<UserPublic, ApiError> {
    let Some(email) = normalize_email(email) else {
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    };

    let user = match state.user_repo.get_user_by_email(&email).await {
        Ok(user) => user,
        Err(DbError::NotFound(_)) => {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    if !verify_password(password, &user.password_hash) {
        tracing::info!(user = %user.id, "Rejected login");
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    state
        .user_repo
        .update_last_login(UserId::from(user.id))
        .await?;
    Ok(user.into())
}

// ============================================================================
// Sessions
// ============================================================================

/// Random session token, hex encoded.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn session_cookie(token: String, config: &AuthConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(config.secure_cookies)
        .max_age(time::Duration::days(config.ttl_days()))
        .same_site(SameSite::Lax)
        .build()
}

/// When a session opened at `now` stops being accepted.
pub fn session_expiry(config: &AuthConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    now + chrono::Duration::days(config.ttl_days())
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// Open a session for `user` and return the cookie carrying it.
pub async fn start_session(
    state: &AppState,
    user: &UserPublic,
    headers: &HeaderMap,
) -> Result<Cookie<'static>, ApiError> {
    let auth = &state.config.auth;
    let token = generate_session_token();
    let expires_at = session_expiry(auth, Utc::now());

    state
        .user_repo
        .create_session(
            user.user_id(),
            &hash_token(&token),
            expires_at,
            client_ip(headers).as_deref(),
            header_str(headers, "user-agent"),
        )
        .await?;

    tracing::info!(user = %user.id, "Session started");
    Ok(session_cookie(token, auth))
}

/// Delete the session named by the cookie, if any.
pub async fn end_session(state: &AppState, jar: &CookieJar) -> Result<(), ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.user_repo.delete_session(&hash_token(cookie.value())).await?;
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

// ============================================================================
// Extractors
// ============================================================================

/// The signed-in user, if the request carries a live session.
pub struct MaybeUser(pub Option<UserPublic>);

impl MaybeUser {
    pub fn id(&self) -> Option<UserId> {
        self.0.as_ref().map(UserPublic::user_id)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(MaybeUser(None));
        };
        let user = state
            .user_repo
            .get_session_user(&hash_token(cookie.value()))
            .await?;
        Ok(MaybeUser(user))
    }
}

/// The signed-in user; rejects with 401 otherwise.
pub struct CurrentUser(pub UserPublic);

impl CurrentUser {
    pub fn id(&self) -> UserId {
        self.0.user_id()
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        user.map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn test_session_tokens_are_random_and_hashed() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);

        let hashed = hash_token(&a);
        assert_eq!(hashed.len(), 64);
        assert_ne!(hashed, a);
        assert_eq!(hashed, hash_token(&a));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Ada@Example.ORG "),
            Some("ada@example.org".to_string())
        );
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("@example.org"), None);
        assert_eq!(normalize_email("a@localhost"), None);
        assert_eq!(normalize_email("a@b@c.org"), None);
    }

    #[test]
    fn test_check_signup_collects_errors() {
        let errors = check_signup("bad", "short").unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password"]);

        assert_eq!(
            check_signup("Ada@Example.org", "long enough").unwrap(),
            "ada@example.org"
        );
    }

    #[test]
    fn test_session_cookie_attributes() {
        let config = AuthConfig {
            session_ttl_days: 7,
            secure_cookies: true,
        };
        let cookie = session_cookie("tok".to_string(), &config);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
    }

    #[test]
    fn test_oversized_session_ttl_is_clamped() {
        let config = AuthConfig {
            session_ttl_days: 36_500_000,
            secure_cookies: false,
        };
        let now = Utc::now();
        assert_eq!(
            session_expiry(&config, now) - now,
            chrono::Duration::days(rgap_config::MAX_SESSION_TTL_DAYS)
        );
        let cookie = session_cookie("tok".to_string(), &config);
        assert_eq!(
            cookie.max_age(),
            Some(time::Duration::days(rgap_config::MAX_SESSION_TTL_DAYS))
        );
    }

    #[test]
    fn test_client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.9"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
