//! services/api/src/web/middleware.rs
//!
//! Authentication and ownership guards for protecting routes.
//!
//! Each guard is a plain stage function that takes the request's
//! `RequestContext` and either returns it enriched or fails with an
//! `ApiError`. The axum middleware below wrap those stages so routes can
//! compose them in order with `route_layer`.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use book_catalog_core::{Book, CatalogStore, Identity, PortError, TokenService};
use cookie::Cookie;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::PathParam;
use crate::web::state::AppState;

/// Name of the cookie that carries the session token.
pub const TOKEN_COOKIE: &str = "token";

/// The prefix used for bearer tokens in authorization headers.
pub const BEARER_PREFIX: &str = "Bearer ";

//=========================================================================================
// Request Context
//=========================================================================================

/// Per-request values attached by the guards for downstream handlers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<Identity>,
    pub book: Option<Book>,
}

impl RequestContext {
    fn of(req: &Request) -> Self {
        req.extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default()
    }
}

//=========================================================================================
// Token Extraction
//=========================================================================================

/// Finds the session token in the `token` cookie, else in an
/// `Authorization: Bearer` header.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    token_from_cookies(headers).or_else(|| token_from_authorization(headers))
}

fn token_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == TOKEN_COOKIE)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|token| !token.is_empty())
}

fn token_from_authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

//=========================================================================================
// Pipeline Stages
//=========================================================================================

/// Verifies the presented token and attaches the identity it was issued to.
///
/// Never reads the store: a still-valid token keeps authorizing its user.
pub fn authenticate(
    mut ctx: RequestContext,
    headers: &HeaderMap,
    tokens: &TokenService,
) -> Result<RequestContext, ApiError> {
    let token = extract_token(headers).ok_or(ApiError::AuthenticationRequired)?;
    let user_id = tokens
        .verify(&token)
        .map_err(ApiError::InvalidOrExpiredToken)?;
    ctx.identity = Some(Identity { user_id });
    Ok(ctx)
}

/// Loads `book_id` and checks that the authenticated identity created it.
/// Must run after `authenticate`.
pub async fn authorize_book_owner(
    mut ctx: RequestContext,
    book_id: Uuid,
    store: &dyn CatalogStore,
) -> Result<RequestContext, ApiError> {
    let identity = ctx.identity.ok_or(ApiError::AuthenticationRequired)?;
    let book = store.get_book(book_id).await.map_err(|e| match e {
        PortError::NotFound(_) => ApiError::NotFound("Book not found".to_string()),
        other => ApiError::Port(other),
    })?;
    if !book.is_owned_by(&identity) {
        warn!(%book_id, user_id = %identity.user_id, "Rejected modification of another user's book");
        return Err(ApiError::Forbidden(
            "Unauthorized. You can only modify your own books.".to_string(),
        ));
    }
    ctx.book = Some(book);
    Ok(ctx)
}

//=========================================================================================
// Axum Middleware
//=========================================================================================

/// Middleware that validates the session token and attaches the identity.
///
/// If valid, inserts the `RequestContext` into request extensions for handlers to use.
/// If missing, invalid or expired, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = authenticate(RequestContext::of(&req), req.headers(), &state.tokens)?;
    debug!(user_id = ?ctx.identity.map(|i| i.user_id), "Request authenticated");
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Middleware that only lets the creator of the book in the path through.
/// The loaded book is attached so the handler does not look it up again.
pub async fn require_book_owner(
    State(state): State<Arc<AppState>>,
    PathParam(book_id): PathParam<Uuid>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = authorize_book_owner(RequestContext::of(&req), book_id, state.db.as_ref()).await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

//=========================================================================================
// Extractors
//=========================================================================================

/// The identity attached by `require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Identity);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.identity)
            .map(Authenticated)
            .ok_or(ApiError::AuthenticationRequired)
    }
}

/// The book attached by `require_book_owner`.
#[derive(Debug, Clone)]
pub struct OwnedBook(pub Book);

impl<S> FromRequestParts<S> for OwnedBook
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(|ctx| ctx.book.clone())
            .map(OwnedBook)
            .ok_or_else(|| ApiError::Internal("ownership guard did not run".to_string()))
    }
}
