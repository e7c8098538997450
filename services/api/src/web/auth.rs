//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderName, StatusCode},
    Json,
};
use book_catalog_core::PortError;
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::web::extract::JsonBody;
use crate::web::middleware::TOKEN_COOKIE;
use crate::web::state::AppState;
use crate::web::validation::{
    check_email, check_new_password, check_username, normalize_email, Validator,
};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub user_id: Uuid,
    pub token: String,
}

/// Status, `Set-Cookie` header and body of an auth response.
pub type AuthReply = (StatusCode, [(HeaderName, String); 1], Json<AuthResponse>);

//=========================================================================================
// Password and Cookie Helpers
//=========================================================================================

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })
}

pub fn verify_password(password: &str, hashed_password: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// The `token` cookie, living as long as the token itself.
pub fn token_cookie(token: &str, config: &Config) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token.to_string()))
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(cookie::time::Duration::hours(config.token_expire_hours))
        .build()
}

fn cleared_token_cookie(config: &Config) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, ""))
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(cookie::time::Duration::ZERO)
        .build()
}

fn issue_reply(
    state: &AppState,
    status: StatusCode,
    user_id: Uuid,
    message: &str,
) -> Result<AuthReply, ApiError> {
    let token = state.tokens.issue(user_id)?;
    let cookie = token_cookie(&token, &state.config);
    Ok((
        status,
        [(header::SET_COOKIE, cookie.to_string())],
        Json(AuthResponse {
            success: true,
            message: message.to_string(),
            user_id,
            token,
        }),
    ))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid input, or username/email already in use"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> Result<AuthReply, ApiError> {
    // 1. Validate and normalize the input
    let username = req.username.trim().to_string();
    let email = normalize_email(&req.email);
    let mut validator = Validator::new();
    check_username(&mut validator, &username);
    check_email(&mut validator, &email);
    check_new_password(&mut validator, &req.password);
    validator.finish()?;

    // 2. Hash the password
    let password_hash = hash_password(&req.password)?;

    // 3. Create user; the store enforces unique usernames and emails
    let user = state
        .db
        .create_user(&username, &email, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Conflict(field) if field == "username" => {
                ApiError::validation("username", "Username already in use")
            }
            PortError::Conflict(_) => ApiError::validation("email", "Email already in use"),
            other => ApiError::Port(other),
        })?;
    info!(user_id = %user.id, "User signed up");

    // 4. Issue the session token and cookie
    issue_reply(&state, StatusCode::CREATED, user.id, "Account created successfully")
}

/// POST /api/auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<AuthReply, ApiError> {
    let email = normalize_email(&req.email);
    let mut validator = Validator::new();
    check_email(&mut validator, &email);
    validator.check(!req.password.is_empty(), "password", "Password is required");
    validator.finish()?;

    // 1. Get user by email
    let user_creds = state.db.get_user_by_email(&email).await.map_err(|e| match e {
        PortError::NotFound(_) => ApiError::InvalidCredentials,
        other => ApiError::Port(other),
    })?;

    // 2. Verify password
    if !verify_password(&req.password, &user_creds.hashed_password)? {
        return Err(ApiError::InvalidCredentials);
    }
    info!(user_id = %user_creds.user_id, "User logged in");

    // 3. Issue the session token and cookie
    issue_reply(&state, StatusCode::OK, user_creds.user_id, "Logged in successfully")
}

/// POST /api/auth/logout - Clear the session cookie
///
/// Tokens are stateless, so a copy of the token held elsewhere stays valid
/// until it expires.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logout successful")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, [(HeaderName, String); 1], Json<serde_json::Value>) {
    let cookie = cleared_token_cookie(&state.config);
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie.to_string())],
        Json(serde_json::json!({ "success": true, "message": "Logged out successfully" })),
    )
}
